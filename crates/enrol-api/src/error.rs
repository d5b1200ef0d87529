//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use enrol_core::outcome::{Outcome, Rejection, RoleManagementError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The request carried no usable acting-user id.
  #[error("missing or malformed x-user-id header")]
  MissingUser,

  #[error(transparent)]
  Rejected(#[from] Rejection),

  #[error(transparent)]
  Fatal(#[from] RoleManagementError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::MissingUser => StatusCode::UNAUTHORIZED,
      ApiError::Rejected(r) => match r {
        Rejection::Validation(_) | Rejection::DomainRule(_) => {
          StatusCode::BAD_REQUEST
        }
        Rejection::Unauthorised(_) => StatusCode::FORBIDDEN,
        Rejection::NotFound(_) => StatusCode::NOT_FOUND,
        Rejection::Conflict(_) => StatusCode::CONFLICT,
      },
      ApiError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      ApiError::MissingUser => "missing-user",
      ApiError::Rejected(r) => r.kind(),
      ApiError::Fatal(_) => "internal",
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    // Fatal details are logged by the workflow and stay server-side.
    let message = match &self {
      ApiError::Fatal(_) => "internal error".to_string(),
      other => {
        tracing::debug!(status = status.as_u16(), kind = self.kind(), "{other}");
        other.to_string()
      }
    };
    (status, Json(json!({ "error": message, "kind": self.kind() })))
      .into_response()
  }
}

/// Flatten a workflow result into a handler result.
pub fn respond<T>(
  result: Result<Outcome<T>, RoleManagementError>,
) -> Result<T, ApiError> {
  Ok(result??)
}
