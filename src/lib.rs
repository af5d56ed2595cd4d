//! Core library for the Dialogflow proxy.  This module wires together the
//! request normalizer, the upstream intent client and the response
//! extractor behind a small axum router.

mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod policy;
pub mod upstream;

pub use config::{regional_endpoint, AppConfig};
pub use error::ProxyError;
pub use extract::{extract, CxResponse, EsResponse, OutboundResponse};
pub use normalize::{InboundQuery, Normalizer, UpstreamQuery};
pub use policy::{Edition, SessionIdPolicy, TextSelection};

use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody},
    DefaultBodyLimit, Request, State,
};
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::upstream::{
    IntentClient, MetadataTokenSource, RestIntentClient, StaticToken, TokenSource, UpstreamError,
};

/// Route serving intent detection.
pub const DETECT_INTENT_PATH: &str = "/api/dialogflow/detectIntent";

#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub allowed_origin: String,
    pub debug: bool,
}

/// Request-handling context.  Built once at startup and cloned into every
/// handler invocation; nothing in it is mutated after construction.
#[derive(Clone)]
pub struct AppState {
    pub normalizer: Normalizer,
    pub client: Arc<dyn IntentClient>,
    pub text_selection: TextSelection,
    pub upstream_timeout: Duration,
    pub cors: CorsSettings,
    /// Maximum accepted raw request body size in bytes (None => axum default)
    pub max_request_bytes: Option<usize>,
}

impl AppState {
    /// Assemble state around an already constructed upstream client.
    pub fn new(config: &AppConfig, client: Arc<dyn IntentClient>) -> Self {
        Self {
            normalizer: Normalizer::from_config(config),
            client,
            text_selection: config.text_selection,
            upstream_timeout: config.upstream_timeout,
            cors: CorsSettings {
                allowed_origin: config.allowed_origin.clone(),
                debug: config.cors_debug,
            },
            max_request_bytes: config.max_request_bytes,
        }
    }
}

/// Build state with the REST client bound to the configured endpoint.
pub fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let http = reqwest::Client::builder().build()?;
    let tokens: Arc<dyn TokenSource> = match &config.static_access_token {
        Some(token) => Arc::new(StaticToken(token.clone())),
        None => Arc::new(MetadataTokenSource::new(http.clone(), &config.metadata_host)),
    };
    tracing::info!(
        endpoint = %config.endpoint,
        edition = %config.edition,
        "using Dialogflow endpoint"
    );
    let client = RestIntentClient::new(http, config.endpoint.clone(), config.edition, tokens);
    tracing::info!(
        project = %config.project_id,
        location = %config.location_id,
        "Dialogflow client initialized"
    );
    Ok(AppState::new(config, Arc::new(client)))
}

/// Build state from environment variables.  See [`AppConfig::from_env`].
pub fn build_state_from_env() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;
    build_state(&config)
}

/// Build the axum router and attach handlers and CORS.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;
    let cors = cors_layer(&state.cors.allowed_origin);
    let cors_debug = state.cors.debug;

    let router = Router::new()
        .route(
            DETECT_INTENT_PATH,
            post(detect_intent_handler).fallback(method_not_allowed),
        )
        .route("/healthz", get(healthz_handler));

    let router = if let Some(limit) = max_request_bytes {
        router.layer(DefaultBodyLimit::max(limit))
    } else {
        router
    };

    let router = router.layer(cors);
    let router = if cors_debug {
        router.layer(middleware::from_fn(log_cors))
    } else {
        router
    };

    router.with_state(state)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    if allowed_origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(allowed_origin) {
        Ok(origin) => layer.allow_origin(AllowOrigin::list([origin])),
        Err(e) => {
            tracing::warn!(origin = %allowed_origin, error = %e, "invalid ALLOWED_ORIGIN; cross-origin requests will be refused");
            layer.allow_origin(AllowOrigin::list(Vec::<HeaderValue>::new()))
        }
    }
}

async fn log_cors(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let origin = header_str(req.headers(), header::ORIGIN.as_str());
    let requested_method = header_str(req.headers(), "access-control-request-method");
    let response = next.run(req).await;
    let allowed = header_str(
        response.headers(),
        header::ACCESS_CONTROL_ALLOW_ORIGIN.as_str(),
    );
    tracing::info!(
        target: "cors",
        %method,
        %path,
        origin = ?origin,
        requested_method = ?requested_method,
        allow_origin = ?allowed,
        status = response.status().as_u16(),
        "cors"
    );
    response
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Caller-supplied bearer token, forwarded to the upstream call in place of
/// ambient credentials.  Malformed headers are ignored.
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("authorization").and_then(|v| v.to_str().ok())?;
    if raw.len() < 7 || !raw[..6].eq_ignore_ascii_case("bearer") || raw.as_bytes()[6] != b' '
    {
        return None;
    }
    let token = raw[6..].trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Handler for `POST /api/dialogflow/detectIntent`.
async fn detect_intent_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match detect_intent(&state, &headers, body).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn detect_intent(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ProxyError> {
    let inbound = decode_body(body)?;

    let query = state.normalizer.normalize(&inbound).map_err(|err| {
        tracing::warn!(
            error = %err,
            agent_id = ?inbound.agent_id,
            session_id = ?inbound.session_id,
            "detectIntent validation failed"
        );
        err
    })?;

    tracing::info!(
        edition = %state.normalizer.edition,
        project = %state.normalizer.project_id,
        location = %state.normalizer.location_id,
        session = %query.session_id,
        agent = %query.agent_id,
        lang = %query.language_code,
        message = ?query.text,
        "sending request to Dialogflow"
    );

    let bearer = extract_bearer_token(headers);
    let call = state.client.detect_intent(&query, bearer.as_deref());
    let result = match tokio::time::timeout(state.upstream_timeout, call).await {
        Ok(res) => res,
        Err(_) => Err(UpstreamError::Timeout(state.upstream_timeout)),
    }
    .map_err(|err| {
        tracing::error!(
            error = %err,
            session = %query.session_id,
            agent = %query.agent_id,
            "Dialogflow detectIntent failed"
        );
        ProxyError::from(err)
    })?;

    let outbound = extract(result, &query.session_id, state.text_selection);
    match &outbound {
        OutboundResponse::Es(es) => tracing::info!(
            session = %query.session_id,
            intent = %es.intent,
            fulfillment = ?es.fulfillment_text,
            "received response from Dialogflow"
        ),
        OutboundResponse::Cx(cx) => tracing::info!(
            session = %query.session_id,
            text = ?cx.text,
            "received response from Dialogflow"
        ),
    }

    let body = serde_json::to_vec(&outbound).map_err(|err| {
        tracing::error!(error = %err, session = %query.session_id, "failed to encode response");
        ProxyError::EncodingFailure(err)
    })?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// The body is decoded as JSON whatever `Content-Type` the caller sent.
fn decode_body(body: Result<Bytes, BytesRejection>) -> Result<InboundQuery, ProxyError> {
    let bytes = body.map_err(|rejection| match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            tracing::warn!("request body exceeded configured limit");
            ProxyError::PayloadTooLarge
        }
        other => {
            tracing::warn!(error = %other.body_text(), "error reading request body");
            ProxyError::MalformedInput
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|err| {
        tracing::warn!(error = %err, "error decoding request body");
        ProxyError::MalformedInput
    })
}

async fn method_not_allowed(method: Method) -> ProxyError {
    tracing::warn!(%method, path = DETECT_INTENT_PATH, "method not allowed");
    ProxyError::MethodNotAllowed
}

/// Liveness probe for container orchestration.
async fn healthz_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_is_extracted_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("bEaReR abc123"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn malformed_bearer_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer_token(&headers).is_none());
        assert!(extract_bearer_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn bearer_scheme_requires_separator() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearerabc"));
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert("authorization", HeaderValue::from_static("Bearer\tabc"));
        assert!(extract_bearer_token(&headers).is_none());
    }
}
