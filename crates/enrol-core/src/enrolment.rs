//! Enrolment: a connection's participation in one service role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  connection::Connection,
  organisation::Organisation,
  person::Person,
  role::{Service, ServiceRole},
  status::EnrolmentStatus,
};

/// One row of the enrolment table.
///
/// A connection has at most one active (non-deleted) enrolment per service
/// role; the store enforces this with a unique index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrolment {
  #[serde(skip)]
  pub id:              i64,
  pub external_id:     Uuid,
  #[serde(skip)]
  pub connection_id:   i64,
  pub service_role:    ServiceRole,
  pub status:          EnrolmentStatus,
  pub valid_from:      Option<DateTime<Utc>>,
  pub valid_to:        Option<DateTime<Utc>>,
  pub created_on:      DateTime<Utc>,
  pub last_updated_on: DateTime<Utc>,
}

impl Enrolment {
  pub fn service(&self) -> Service { self.service_role.service() }
}

/// Input to [`crate::store::AccountStore::create_enrolment`].
#[derive(Debug, Clone, Copy)]
pub struct NewEnrolment {
  pub connection_id: i64,
  pub service_role:  ServiceRole,
  pub status:        EnrolmentStatus,
}

impl NewEnrolment {
  pub fn new(
    connection_id: i64,
    service_role: ServiceRole,
    status: EnrolmentStatus,
  ) -> Self {
    Self { connection_id, service_role, status }
  }
}

/// An enrolment joined with the connection, person and organisation it
/// belongs to. Never stored; assembled on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolmentDetail {
  pub enrolment:    Enrolment,
  pub connection:   Connection,
  pub person:       Person,
  pub organisation: Organisation,
}

impl EnrolmentDetail {
  /// Whether the enrolment belongs to `user_id` acting in `organisation_id`
  /// under `service`. All three must hold; the enrolment id alone carries no
  /// authority.
  pub fn is_addressed_to(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service: Service,
  ) -> bool {
    self.person.user_id == Some(user_id)
      && self.organisation.external_id == organisation_id
      && self.enrolment.service() == service
  }
}
