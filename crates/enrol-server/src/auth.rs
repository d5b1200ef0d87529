//! HTTP Basic authentication of the upstream facade.
//!
//! The facade is the only client; it presents one fixed username and a
//! password checked against an argon2 PHC string from configuration.

use std::sync::Arc;

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::{self, SaltString},
};
use axum::{
  extract::{Request, State},
  http::{HeaderMap, header::AUTHORIZATION},
  middleware::Next,
  response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use rand_core::OsRng;

use crate::error::Error;

/// Hash `password` into a PHC string suitable for `auth_password_hash`.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// The one set of credentials this server accepts.
#[derive(Clone)]
pub struct AuthConfig {
  username:      String,
  password_hash: String,
}

impl AuthConfig {
  /// Fails when `password_hash` is not a PHC string, so a bad configuration
  /// is caught at startup rather than on the first request.
  pub fn new(
    username: impl Into<String>,
    password_hash: impl Into<String>,
  ) -> Result<Self, password_hash::Error> {
    let password_hash = password_hash.into();
    PasswordHash::new(&password_hash)?;
    Ok(Self { username: username.into(), password_hash })
  }

  fn accepts(&self, credentials: &Credentials) -> bool {
    credentials.username == self.username
      && PasswordHash::new(&self.password_hash).is_ok_and(|hash| {
        Argon2::default()
          .verify_password(credentials.password.as_bytes(), &hash)
          .is_ok()
      })
  }
}

/// Username and password carried by a `Basic` authorization header.
struct Credentials {
  username: String,
  password: String,
}

impl Credentials {
  fn from_headers(headers: &HeaderMap) -> Option<Self> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
      return None;
    }
    let decoded = String::from_utf8(B64.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Self { username: username.to_owned(), password: password.to_owned() })
  }
}

/// Middleware rejecting requests without valid Basic credentials.
pub async fn require_basic(
  State(config): State<Arc<AuthConfig>>,
  req: Request,
  next: Next,
) -> Result<Response, Error> {
  let Some(credentials) = Credentials::from_headers(req.headers()) else {
    tracing::warn!(path = %req.uri().path(), "request without basic credentials");
    return Err(Error::Unauthorized);
  };
  if !config.accepts(&credentials) {
    tracing::warn!(
      path = %req.uri().path(),
      username = %credentials.username,
      "rejected basic credentials"
    );
    return Err(Error::Unauthorized);
  }
  Ok(next.run(req).await)
}
