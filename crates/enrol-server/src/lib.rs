//! HTTP server wiring for the enrolment API.
//!
//! Mounts [`enrol_api::api_router`] under `/api` behind HTTP Basic
//! authentication of the upstream facade, plus an open `/health` check.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::{Json, Router, middleware, routing::get};
use enrol_core::{
  service::{AccountService, NominationPolicy},
  store::AccountStore,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use auth::AuthConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `ENROL_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                   String,
  pub port:                   u16,
  pub store_path:             PathBuf,
  pub auth_username:          String,
  pub auth_password_hash:     String,
  /// Days a nomination stays acceptable; `0` disables expiry.
  #[serde(default = "default_expiry_days")]
  pub nomination_expiry_days: u32,
}

fn default_expiry_days() -> u32 { NominationPolicy::DEFAULT_EXPIRY_DAYS }

impl ServerConfig {
  /// Read `path`, if it exists, with `ENROL_*` environment variables layered
  /// on top.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ENROL"))
      .build()?
      .try_deserialize()
  }

  /// `store_path` with a leading `~/` resolved against `$HOME`.
  pub fn resolved_store_path(&self) -> PathBuf {
    match (self.store_path.strip_prefix("~"), std::env::var_os("HOME")) {
      (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
      _ => self.store_path.clone(),
    }
  }

  pub fn policy(&self) -> NominationPolicy {
    NominationPolicy::from_days(self.nomination_expiry_days)
  }

  pub fn auth(&self) -> Result<AuthConfig, argon2::password_hash::Error> {
    AuthConfig::new(&self.auth_username, &self.auth_password_hash)
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Everything the router needs.
#[derive(Clone)]
pub struct AppState<S> {
  pub service: AccountService<S>,
  pub auth:    Arc<AuthConfig>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the server's axum [`Router`].
pub fn router<S>(state: AppState<S>) -> Router
where
  S: AccountStore + 'static,
{
  let api = enrol_api::api_router(state.service)
    .layer(middleware::from_fn_with_state(state.auth, auth::require_basic));

  Router::new()
    .route("/health", get(health))
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use enrol_api::USER_HEADER;
  use enrol_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  async fn make_state(password: &str) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let hash = auth::hash_password(password).unwrap();

    AppState {
      service: AccountService::new(Arc::new(store)),
      auth:    Arc::new(AuthConfig::new("facade", hash).unwrap()),
    }
  }

  fn auth_header(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  fn notifications_uri() -> String {
    format!("/api/organisations/{}/services/Packaging/notifications", Uuid::new_v4())
  }

  #[tokio::test]
  async fn health_needs_no_credentials() {
    let state = make_state("secret").await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn api_requires_credentials() {
    let state = make_state("secret").await;
    let req = Request::builder()
      .uri(notifications_uri())
      .header(USER_HEADER, Uuid::new_v4().to_string())
      .body(Body::empty())
      .unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  #[tokio::test]
  async fn wrong_password_is_rejected() {
    let state = make_state("secret").await;
    let req = Request::builder()
      .uri(notifications_uri())
      .header(header::AUTHORIZATION, auth_header("facade", "wrong"))
      .header(USER_HEADER, Uuid::new_v4().to_string())
      .body(Body::empty())
      .unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn authenticated_request_reaches_the_api() {
    let state = make_state("secret").await;
    let req = Request::builder()
      .uri(notifications_uri())
      .header(header::AUTHORIZATION, auth_header("facade", "secret"))
      .header(USER_HEADER, Uuid::new_v4().to_string())
      .body(Body::empty())
      .unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    assert_eq!(bytes.as_ref(), b"[]");
  }

  fn parsed(store_path: &str) -> ServerConfig {
    serde_json::from_value(json!({
      "host": "127.0.0.1",
      "port": 8080,
      "store_path": store_path,
      "auth_username": "facade",
      "auth_password_hash": "x",
    }))
    .unwrap()
  }

  #[test]
  fn expiry_defaults_when_not_configured() {
    let cfg = parsed(":memory:");
    assert_eq!(cfg.nomination_expiry_days, 28);
    assert_eq!(cfg.policy(), NominationPolicy::default());
  }

  #[test]
  fn plain_store_paths_are_used_as_given() {
    let cfg = parsed("/var/lib/enrol/enrol.db");
    assert_eq!(cfg.resolved_store_path(), PathBuf::from("/var/lib/enrol/enrol.db"));
  }

  #[test]
  fn unparseable_password_hash_fails_early() {
    assert!(parsed(":memory:").auth().is_err());
  }
}
