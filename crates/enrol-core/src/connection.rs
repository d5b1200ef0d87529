//! Connection: a person's membership of an organisation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::{OrganisationRole, PersonRole};

/// "This person participates in this organisation."
///
/// Connections are soft-deleted, never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
  #[serde(skip)]
  pub id:                i64,
  pub external_id:       Uuid,
  #[serde(skip)]
  pub person_id:         i64,
  #[serde(skip)]
  pub organisation_id:   i64,
  pub person_role:       PersonRole,
  pub organisation_role: OrganisationRole,
  pub job_title:         Option<String>,
  pub created_on:        DateTime<Utc>,
}

/// Input to [`crate::store::AccountStore::add_connection`].
#[derive(Debug, Clone)]
pub struct NewConnection {
  pub person_id:         i64,
  pub organisation_id:   i64,
  pub person_role:       PersonRole,
  pub organisation_role: OrganisationRole,
  pub job_title:         Option<String>,
}

impl NewConnection {
  pub fn new(person_id: i64, organisation_id: i64, person_role: PersonRole) -> Self {
    Self {
      person_id,
      organisation_id,
      person_role,
      organisation_role: OrganisationRole::default(),
      job_title: None,
    }
  }
}
