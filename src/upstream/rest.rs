use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use super::{
    CxQueryResult, EsQueryResult, IntentClient, TokenSource, UpstreamError, UpstreamResult,
};
use crate::normalize::UpstreamQuery;
use crate::policy::Edition;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EsDetectIntentResponse {
    query_result: Option<EsQueryResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CxDetectIntentResponse {
    #[serde(default)]
    query_result: CxQueryResult,
}

/// `detectIntent` over the Dialogflow REST API.  A single instance is built
/// at startup and shared by every request; `reqwest::Client` pools the
/// underlying connections.
pub struct RestIntentClient {
    client: reqwest::Client,
    endpoint: String,
    edition: Edition,
    tokens: Arc<dyn TokenSource>,
}

impl RestIntentClient {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        edition: Edition,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            edition,
            tokens,
        }
    }

    fn url(&self, query: &UpstreamQuery) -> String {
        format!(
            "{}/{}/{}:detectIntent",
            self.endpoint,
            self.edition.api_version(),
            query.session_path
        )
    }

    fn body(&self, query: &UpstreamQuery) -> serde_json::Value {
        match self.edition {
            Edition::Es => json!({
                "queryInput": {
                    "text": { "text": query.text, "languageCode": query.language_code }
                }
            }),
            Edition::Cx => json!({
                "queryInput": {
                    "text": { "text": query.text },
                    "languageCode": query.language_code
                }
            }),
        }
    }

    fn decode(&self, raw: &str) -> Result<UpstreamResult, UpstreamError> {
        match self.edition {
            Edition::Es => {
                let parsed: EsDetectIntentResponse =
                    serde_json::from_str(raw).map_err(|e| UpstreamError::Decode(e.to_string()))?;
                parsed
                    .query_result
                    .map(UpstreamResult::Es)
                    .ok_or(UpstreamError::EmptyResult)
            }
            Edition::Cx => {
                let parsed: CxDetectIntentResponse =
                    serde_json::from_str(raw).map_err(|e| UpstreamError::Decode(e.to_string()))?;
                Ok(UpstreamResult::Cx(parsed.query_result))
            }
        }
    }
}

#[async_trait::async_trait]
impl IntentClient for RestIntentClient {
    async fn detect_intent(
        &self,
        query: &UpstreamQuery,
        bearer: Option<&str>,
    ) -> Result<UpstreamResult, UpstreamError> {
        let token = match bearer {
            Some(tok) => tok.to_string(),
            None => self.tokens.access_token().await?,
        };
        let resp = self
            .client
            .post(self.url(query))
            .bearer_auth(token)
            .json(&self.body(query))
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        self.decode(&text)
    }
}
