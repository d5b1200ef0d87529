//! Handlers for regulator decisions and nation transfers.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `PUT` | `/regulators/organisations/{org}/enrolments/{enrolment}/status` | Body: [`RegulatorDecision`] |
//! | `PUT` | `/regulators/organisations/{org}/nation-transfer` | Body: [`NationTransfer`] |

use axum::{
  Json,
  extract::{Path, State},
};
use enrol_core::{
  enrolment::Enrolment,
  organisation::Organisation,
  service::{
    AccountService,
    regulator::{NationTransfer, RegulatorDecision},
  },
  store::AccountStore,
};
use uuid::Uuid;

use crate::{
  acting::ActingUser,
  error::{ApiError, respond},
};

/// `PUT /regulators/organisations/{org}/enrolments/{enrolment}/status`
pub async fn decide<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path((org, enrolment)): Path<(Uuid, Uuid)>,
  Json(body): Json<RegulatorDecision>,
) -> Result<Json<Enrolment>, ApiError> {
  respond(
    service
      .update_enrolment_status(user, org, enrolment, body)
      .await,
  )
  .map(Json)
}

/// `PUT /regulators/organisations/{org}/nation-transfer`
pub async fn transfer<S: AccountStore + 'static>(
  State(service): State<AccountService<S>>,
  ActingUser(user): ActingUser,
  Path(org): Path<Uuid>,
  Json(body): Json<NationTransfer>,
) -> Result<Json<Organisation>, ApiError> {
  respond(service.transfer_organisation_nation(user, org, body).await)
    .map(Json)
}
