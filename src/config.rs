use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use crate::policy::{Edition, SessionIdPolicy, TextSelection};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub project_id: String,
    pub location_id: String,
    pub allowed_origin: String,
    pub port: u16,
    pub default_agent_id: Option<String>,
    pub cors_debug: bool,
    pub edition: Edition,
    pub session_policy: SessionIdPolicy,
    pub default_language_code: String,
    pub text_selection: TextSelection,
    pub endpoint: String,
    pub upstream_timeout: Duration,
    pub static_access_token: Option<String>,
    pub metadata_host: String,
    pub max_request_bytes: Option<usize>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let project_id = non_empty_env("DIALOGFLOW_PROJECT_ID");
        let location_id = non_empty_env("DIALOGFLOW_LOCATION_ID");
        let (project_id, location_id) = match (project_id, location_id) {
            (Some(p), Some(l)) => (p, l),
            _ => bail!(
                "DIALOGFLOW_PROJECT_ID and DIALOGFLOW_LOCATION_ID environment variables must be set"
            ),
        };

        let allowed_origin = non_empty_env("ALLOWED_ORIGIN").unwrap_or_else(|| "*".to_string());
        let port = match parse_optional_u64("PORT")? {
            Some(p) => u16::try_from(p).map_err(|_| anyhow!("PORT must be a valid port number"))?,
            None => 8080,
        };
        let default_agent_id = non_empty_env("DIALOGFLOW_AGENT_ID");
        let cors_debug = parse_bool_env("CORS_DEBUG")?.unwrap_or(false);

        let edition = parse_enum_env::<Edition>("DIALOGFLOW_EDITION", "es or cx")?
            .unwrap_or(Edition::Es);
        let session_policy =
            parse_enum_env::<SessionIdPolicy>("SESSION_ID_POLICY", "generate or require")?
                .unwrap_or_else(|| edition.default_session_policy());
        let default_language_code = non_empty_env("DEFAULT_LANGUAGE_CODE")
            .unwrap_or_else(|| edition.default_language_code().to_string());
        let text_selection =
            parse_enum_env::<TextSelection>("CX_TEXT_SELECTION", "first or concat")?
                .unwrap_or_default();

        let endpoint = non_empty_env("DIALOGFLOW_ENDPOINT")
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| regional_endpoint(&location_id));
        let upstream_timeout = match parse_optional_u64("UPSTREAM_TIMEOUT_SECS")? {
            Some(0) => bail!("UPSTREAM_TIMEOUT_SECS must be a positive integer"),
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_secs(30),
        };
        let static_access_token = non_empty_env("GOOGLE_OAUTH_ACCESS_TOKEN");
        let metadata_host = non_empty_env("GCE_METADATA_HOST")
            .unwrap_or_else(|| "metadata.google.internal".to_string());
        let max_request_bytes = parse_optional_u64("MAX_REQUEST_BYTES")?.map(|v| v as usize);

        Ok(Self {
            project_id,
            location_id,
            allowed_origin,
            port,
            default_agent_id,
            cors_debug,
            edition,
            session_policy,
            default_language_code,
            text_selection,
            endpoint,
            upstream_timeout,
            static_access_token,
            metadata_host,
            max_request_bytes,
        })
    }
}

/// Regional REST endpoint for a Dialogflow location.  The `global` location
/// is served from the non-prefixed host.
pub fn regional_endpoint(location_id: &str) -> String {
    if location_id == "global" {
        "https://dialogflow.googleapis.com".to_string()
    } else {
        format!("https://{}-dialogflow.googleapis.com", location_id)
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_enum_env<T: FromStr>(var: &str, expected: &str) -> Result<Option<T>> {
    match non_empty_env(var) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be one of: {}", var, expected)),
        None => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
