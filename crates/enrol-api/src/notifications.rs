//! `GET /organisations/{org}/services/{service}/notifications`

use axum::{
  Json,
  extract::{Path, State},
};
use enrol_core::{
  service::{AccountService, notification::Notification},
  store::AccountStore,
};
use uuid::Uuid;

use crate::{
  acting::ActingUser,
  error::{ApiError, respond},
};

/// Pending actions for the acting user in one organisation and service.
pub async fn handler<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, key)): Path<(Uuid, String)>,
) -> Result<Json<Vec<Notification>>, ApiError> {
  respond(service.get_notifications(user, org, &key).await).map(Json)
}
