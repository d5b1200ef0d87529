//! Organisation: the party that enrols in services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::Nation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
  #[serde(skip)]
  pub id:              i64,
  pub external_id:     Uuid,
  pub name:            String,
  /// The nation whose regulator oversees this organisation.
  pub nation:          Option<Nation>,
  /// Set while the organisation is being moved to another nation's
  /// regulator; cleared once the transfer settles.
  pub transfer_nation: Option<Nation>,
  pub created_on:      DateTime<Utc>,
}

impl Organisation {
  /// Whether a regulator of `nation` may act on this organisation.
  pub fn is_regulated_by(&self, nation: Nation) -> bool {
    self.nation == Some(nation) || self.transfer_nation == Some(nation)
  }
}

/// Input to [`crate::store::AccountStore::add_organisation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrganisation {
  pub name:   String,
  pub nation: Option<Nation>,
}
