//! Person: identity attributes, optionally linked to an external login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A person known to the platform.
///
/// `user_id` is the external login identity. A person is linked to at most
/// one user and a user to at most one non-deleted person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
  #[serde(skip)]
  pub id:          i64,
  pub external_id: Uuid,
  pub first_name:  String,
  pub last_name:   String,
  pub email:       String,
  pub telephone:   Option<String>,
  pub user_id:     Option<Uuid>,
  pub created_on:  DateTime<Utc>,
}

impl Person {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }
}

/// Input to [`crate::store::AccountStore::add_person`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPerson {
  pub first_name: String,
  pub last_name:  String,
  pub email:      String,
  pub telephone:  Option<String>,
  pub user_id:    Option<Uuid>,
}
