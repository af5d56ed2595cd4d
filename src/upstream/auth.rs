//! Ambient credential acquisition for upstream calls.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::UpstreamError;

/// Tokens are refreshed this long before the metadata server says they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, UpstreamError>;
}

/// Fixed token, typically from `GOOGLE_OAUTH_ACCESS_TOKEN` during local development.
pub struct StaticToken(pub String);

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, UpstreamError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Service-account token from the GCE / Cloud Run metadata server, cached
/// until shortly before expiry.
pub struct MetadataTokenSource {
    client: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenSource {
    /// `host` is either a bare host (`metadata.google.internal`) or a full
    /// base URL such as `http://127.0.0.1:9000`.
    pub fn new(client: reqwest::Client, host: &str) -> Self {
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        Self {
            client,
            url: format!("{}{}", base, TOKEN_PATH),
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<CachedToken, UpstreamError> {
        let resp = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| UpstreamError::Credentials(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Credentials(format!(
                "metadata server returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        let parsed: MetadataTokenResponse = resp
            .json()
            .await
            .map_err(|e| UpstreamError::Credentials(e.to_string()))?;
        let lifetime = (parsed.expires_in - REFRESH_MARGIN_SECS).max(0);
        tracing::debug!(expires_in = parsed.expires_in, "fetched metadata access token");
        Ok(CachedToken {
            token: parsed.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
        })
    }
}

#[async_trait::async_trait]
impl TokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<String, UpstreamError> {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.token.clone());
            }
        }
        let fresh = self.fetch().await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }
}
