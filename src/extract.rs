//! Response extraction: upstream result to the narrowed outbound body.
//!
//! Extraction never fails.  Missing fields degrade to empty strings.

use serde::Serialize;

use crate::policy::TextSelection;
use crate::upstream::{CxQueryResult, EsQueryResult, UpstreamResult};

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EsResponse {
    pub fulfillment_text: String,
    pub fulfillment_messages: Vec<serde_json::Value>,
    pub intent: String,
    pub parameters: Option<serde_json::Value>,
    pub session_id: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CxResponse {
    pub text: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum OutboundResponse {
    Es(EsResponse),
    Cx(CxResponse),
}

/// Repackage an upstream result with the session id actually used.
pub fn extract(
    result: UpstreamResult,
    session_id: &str,
    selection: TextSelection,
) -> OutboundResponse {
    match result {
        UpstreamResult::Es(es) => OutboundResponse::Es(extract_es(es, session_id)),
        UpstreamResult::Cx(cx) => OutboundResponse::Cx(CxResponse {
            text: select_text(&cx, selection),
            session_id: session_id.to_string(),
        }),
    }
}

fn extract_es(result: EsQueryResult, session_id: &str) -> EsResponse {
    EsResponse {
        fulfillment_text: result.fulfillment_text,
        fulfillment_messages: result.fulfillment_messages,
        intent: result.intent.map(|i| i.display_name).unwrap_or_default(),
        parameters: result.parameters,
        session_id: session_id.to_string(),
    }
}

fn select_text(result: &CxQueryResult, selection: TextSelection) -> String {
    match selection {
        TextSelection::FirstMessage => result
            .response_messages
            .first()
            .and_then(|m| m.text.as_ref())
            .and_then(|t| t.text.first())
            .cloned()
            .unwrap_or_default(),
        TextSelection::ConcatenateAll => result
            .response_messages
            .iter()
            .filter_map(|m| m.text.as_ref())
            .filter_map(|t| t.text.first())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
