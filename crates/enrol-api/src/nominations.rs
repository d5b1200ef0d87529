//! Handlers for Approved and Delegated Person nominations.
//!
//! All paths are below `/organisations/{org}/services/{service}`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/connections/{connection}/delegated-person-nomination` | Body: [`DelegatedPersonNominationRequest`]; 201 |
//! | `PUT`  | `/enrolments/{enrolment}/delegated-person-acceptance` | Body: [`NominationAcceptance`] |
//! | `GET`  | `/enrolments/{enrolment}/delegated-person-nominator` | Nominee only |
//! | `POST` | `/connections/{connection}/approved-person-nomination` | No body; 201 |
//! | `PUT`  | `/enrolments/{enrolment}/approved-person-acceptance` | Body: [`NominationAcceptance`] |
//! | `PUT`  | `/enrolments/{enrolment}/nomination-decline` | No body |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use enrol_core::{
  enrolment::Enrolment,
  service::{
    AccountService,
    nomination::{
      DelegatedPersonNominationRequest, NominationAcceptance, NominatorDetails,
    },
  },
  store::AccountStore,
};
use uuid::Uuid;

use crate::{
  acting::ActingUser,
  error::{ApiError, respond},
};

// ─── Delegated person ────────────────────────────────────────────────────────

/// `POST .../connections/{connection}/delegated-person-nomination`
pub async fn nominate_delegated<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, key, connection)): Path<(Uuid, String, Uuid)>,
  Json(body): Json<DelegatedPersonNominationRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let enrolment = respond(
    service
      .nominate_delegated_person(connection, user, org, &key, body)
      .await,
  )?;
  Ok((StatusCode::CREATED, Json(enrolment)))
}

/// `PUT .../enrolments/{enrolment}/delegated-person-acceptance`
pub async fn accept_delegated<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, key, enrolment)): Path<(Uuid, String, Uuid)>,
  Json(body): Json<NominationAcceptance>,
) -> Result<Json<Enrolment>, ApiError> {
  respond(
    service
      .accept_nomination_to_delegated_person(enrolment, user, org, &key, body)
      .await,
  )
  .map(Json)
}

/// `GET .../enrolments/{enrolment}/delegated-person-nominator`
pub async fn nominator<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, key, enrolment)): Path<(Uuid, String, Uuid)>,
) -> Result<Json<NominatorDetails>, ApiError> {
  respond(
    service
      .get_delegated_person_nominator(enrolment, user, org, &key)
      .await,
  )
  .map(Json)
}

// ─── Approved person ─────────────────────────────────────────────────────────

/// `POST .../connections/{connection}/approved-person-nomination`
pub async fn nominate_approved<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, key, connection)): Path<(Uuid, String, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
  let enrolment = respond(
    service
      .nominate_approved_person(connection, user, org, &key)
      .await,
  )?;
  Ok((StatusCode::CREATED, Json(enrolment)))
}

/// `PUT .../enrolments/{enrolment}/approved-person-acceptance`
pub async fn accept_approved<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, key, enrolment)): Path<(Uuid, String, Uuid)>,
  Json(body): Json<NominationAcceptance>,
) -> Result<Json<Enrolment>, ApiError> {
  respond(
    service
      .accept_nomination_to_approved_person(enrolment, user, org, &key, body)
      .await,
  )
  .map(Json)
}

// ─── Decline ─────────────────────────────────────────────────────────────────

/// `PUT .../enrolments/{enrolment}/nomination-decline`
pub async fn decline<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, key, enrolment)): Path<(Uuid, String, Uuid)>,
) -> Result<Json<Enrolment>, ApiError> {
  respond(service.decline_nomination(enrolment, user, org, &key).await)
    .map(Json)
}
