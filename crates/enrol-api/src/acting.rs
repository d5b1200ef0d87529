//! The acting user, as asserted by the upstream facade.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the external id of the user the request acts for.
pub const USER_HEADER: &str = "x-user-id";

/// External id of the user a request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for ActingUser {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    parts
      .headers
      .get(USER_HEADER)
      .and_then(|v| v.to_str().ok())
      .and_then(|s| Uuid::parse_str(s.trim()).ok())
      .map(ActingUser)
      .ok_or(ApiError::MissingUser)
  }
}
