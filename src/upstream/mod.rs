//! Upstream intent-detection collaborator.
//!
//! The proxy only ever issues one call, `detectIntent`, against a session
//! resource.  [`IntentClient`] is the seam between the HTTP handler and the
//! transport so that the handler can be driven by a fake in tests, while
//! [`rest::RestIntentClient`] talks to the Dialogflow REST surface.

use std::time::Duration;

use serde::Deserialize;

use crate::normalize::UpstreamQuery;

pub mod auth;
pub mod rest;

pub use self::auth::{MetadataTokenSource, StaticToken, TokenSource};
pub use self::rest::RestIntentClient;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
    #[error("Dialogflow returned empty result")]
    EmptyResult,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

/// Parts of an ES `QueryResult` the proxy reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsQueryResult {
    #[serde(default)]
    pub fulfillment_text: String,
    #[serde(default)]
    pub fulfillment_messages: Vec<serde_json::Value>,
    pub intent: Option<EsIntent>,
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsIntent {
    #[serde(default)]
    pub display_name: String,
}

/// Parts of a CX `QueryResult` the proxy reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CxQueryResult {
    #[serde(default)]
    pub response_messages: Vec<CxResponseMessage>,
}

/// One CX response message.  The wire form is a oneof; only the `text`
/// variant is modelled, any other variant leaves `text` unset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CxResponseMessage {
    pub text: Option<CxText>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CxText {
    #[serde(default)]
    pub text: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum UpstreamResult {
    Es(EsQueryResult),
    Cx(CxQueryResult),
}

/// A conversational intent-detection backend.  Implementations must be safe
/// to share across concurrently running requests.
#[async_trait::async_trait]
pub trait IntentClient: Send + Sync {
    /// Issue one `detectIntent` call.  `bearer` is a caller-supplied access
    /// token that takes precedence over ambient credentials.
    async fn detect_intent(
        &self,
        query: &UpstreamQuery,
        bearer: Option<&str>,
    ) -> Result<UpstreamResult, UpstreamError>;
}
