//! Handlers for invitations, person roles and enrolment removal.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST`   | `/organisations/{org}/services/{service}/invitations` | Body: [`Invitation`]; 201 |
//! | `PUT`    | `/invitations/{enrolment}/acceptance` | No body |
//! | `PUT`    | `/organisations/{org}/services/{service}/connections/{connection}/person-role` | Body: `{"person_role":"admin"}` |
//! | `DELETE` | `/organisations/{org}/persons/{person}/enrolments` | `?service_role_id` required |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use enrol_core::{
  connection::Connection,
  enrolment::Enrolment,
  role::PersonRole,
  service::{
    AccountService,
    membership::{Invitation, Removal},
  },
  store::AccountStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  acting::ActingUser,
  error::{ApiError, respond},
};

// ─── Invitations ─────────────────────────────────────────────────────────────

/// `POST /organisations/{org}/services/{service}/invitations`
pub async fn invite<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, key)): Path<(Uuid, String)>,
  Json(body): Json<Invitation>,
) -> Result<impl IntoResponse, ApiError> {
  let enrolment = respond(service.invite_person(user, org, &key, body).await)?;
  Ok((StatusCode::CREATED, Json(enrolment)))
}

/// `PUT /invitations/{enrolment}/acceptance`
pub async fn accept_invitation<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path(enrolment): Path<Uuid>,
) -> Result<Json<Enrolment>, ApiError> {
  respond(service.accept_invitation(user, enrolment).await).map(Json)
}

// ─── Person role ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PersonRoleBody {
  pub person_role: PersonRole,
}

/// `PUT .../connections/{connection}/person-role`
pub async fn person_role<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, key, connection)): Path<(Uuid, String, Uuid)>,
  Json(body): Json<PersonRoleBody>,
) -> Result<Json<Connection>, ApiError> {
  respond(
    service
      .update_person_role(user, org, &key, connection, body.person_role)
      .await,
  )
  .map(Json)
}

// ─── Removal ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RemovalParams {
  pub service_role_id: i64,
}

/// `DELETE /organisations/{org}/persons/{person}/enrolments?service_role_id=N`
pub async fn remove<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, person)): Path<(Uuid, Uuid)>,
  Query(params): Query<RemovalParams>,
) -> Result<Json<Removal>, ApiError> {
  respond(
    service
      .remove_enrolment(user, person, org, params.service_role_id)
      .await,
  )
  .map(Json)
}
