#[path = "common/mod.rs"]
mod common;

use common::EnvGuard;
use dialogflow_proxy::{build_state_from_env, AppConfig, Edition, SessionIdPolicy};
use once_cell::sync::Lazy;
use std::sync::Mutex;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[test]
fn rejects_invalid_boolean_env_values() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let mut env = EnvGuard::new();
    env.set_many(&[
        ("DIALOGFLOW_PROJECT_ID", "demo-project"),
        ("DIALOGFLOW_LOCATION_ID", "us-central1"),
        ("CORS_DEBUG", "maybe"),
    ]);
    let err = AppConfig::from_env().expect_err("expected invalid boolean to error");
    assert!(format!("{}", err).contains("CORS_DEBUG"));
}

#[test]
fn startup_fails_without_project() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let mut env = EnvGuard::new();
    env.remove("DIALOGFLOW_PROJECT_ID");
    env.set("DIALOGFLOW_LOCATION_ID", "us-central1");
    assert!(build_state_from_env().is_err());
}

#[test]
fn session_policy_overrides_edition_default() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let mut env = EnvGuard::new();
    env.remove("CORS_DEBUG");
    env.set_many(&[
        ("DIALOGFLOW_PROJECT_ID", "demo-project"),
        ("DIALOGFLOW_LOCATION_ID", "us-central1"),
        ("DIALOGFLOW_EDITION", "es"),
        ("SESSION_ID_POLICY", "require"),
        ("DIALOGFLOW_ENDPOINT", "http://localhost:9999/"),
        ("GOOGLE_OAUTH_ACCESS_TOKEN", "local-token"),
    ]);
    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.edition, Edition::Es);
    assert_eq!(cfg.session_policy, SessionIdPolicy::RequireClient);
    assert_eq!(cfg.endpoint, "http://localhost:9999");
    assert_eq!(cfg.static_access_token.as_deref(), Some("local-token"));
    assert!(build_state_from_env().is_ok());
}
