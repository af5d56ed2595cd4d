//! Request normalization: inbound JSON payload to canonical upstream query.

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::ProxyError;
use crate::policy::{Edition, SessionIdPolicy};

/// Body accepted by `POST /api/dialogflow/detectIntent`.  Every field is
/// optional at the wire level so that absence and `null` are reported as a
/// missing field rather than a decoding failure.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InboundQuery {
    pub message: Option<String>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub language_code: Option<String>,
}

/// Canonical query ready to hand to an [`IntentClient`](crate::upstream::IntentClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamQuery {
    pub session_path: String,
    pub session_id: String,
    pub agent_id: String,
    pub text: String,
    pub language_code: String,
}

/// Stateless normalizer holding the process-wide defaults it applies.
#[derive(Debug, Clone)]
pub struct Normalizer {
    pub edition: Edition,
    pub project_id: String,
    pub location_id: String,
    pub default_agent_id: Option<String>,
    pub session_policy: SessionIdPolicy,
    pub default_language_code: String,
}

impl Normalizer {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            edition: cfg.edition,
            project_id: cfg.project_id.clone(),
            location_id: cfg.location_id.clone(),
            default_agent_id: cfg.default_agent_id.clone(),
            session_policy: cfg.session_policy,
            default_language_code: cfg.default_language_code.clone(),
        }
    }

    pub fn normalize(&self, query: &InboundQuery) -> Result<UpstreamQuery, ProxyError> {
        let mut missing = Vec::new();

        let message = non_empty(query.message.as_deref());
        if message.is_none() {
            missing.push("message");
        }

        let agent_id =
            non_empty(query.agent_id.as_deref()).or(non_empty(self.default_agent_id.as_deref()));
        if agent_id.is_none() {
            missing.push("agentId");
        }

        let session_id = match non_empty(query.session_id.as_deref()) {
            Some(id) => Some(id.to_string()),
            None => match self.session_policy {
                SessionIdPolicy::GenerateIfAbsent => Some(uuid::Uuid::new_v4().to_string()),
                SessionIdPolicy::RequireClient => {
                    missing.push("sessionId");
                    None
                }
            },
        };

        let (Some(message), Some(agent_id), Some(session_id)) = (message, agent_id, session_id)
        else {
            return Err(ProxyError::MissingField(missing));
        };

        let language_code = non_empty(query.language_code.as_deref())
            .unwrap_or(self.default_language_code.as_str())
            .to_string();

        Ok(UpstreamQuery {
            session_path: self.session_path(agent_id, &session_id),
            session_id,
            agent_id: agent_id.to_string(),
            text: message.to_string(),
            language_code,
        })
    }

    /// Hierarchical session resource name for the configured edition.  ES
    /// agents are addressed implicitly by project, so the agent id only
    /// appears in CX paths.
    pub fn session_path(&self, agent_id: &str, session_id: &str) -> String {
        match self.edition {
            Edition::Es => format!(
                "projects/{}/locations/{}/agent/sessions/{}",
                self.project_id, self.location_id, session_id
            ),
            Edition::Cx => format!(
                "projects/{}/locations/{}/agents/{}/sessions/{}",
                self.project_id, self.location_id, agent_id, session_id
            ),
        }
    }
}

/// Whitespace-only values count as absent; present values are kept verbatim.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}
