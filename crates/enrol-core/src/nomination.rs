//! Nomination records attached 1:1 to elevated-role enrolments.
//!
//! The enrolment row carries the status; these rows carry the declarations
//! made by each party and, for delegated persons, who nominated them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Declarations ────────────────────────────────────────────────────────────

/// A signed statement: the declarant's typed name and when it was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
  pub text: String,
  pub at:   DateTime<Utc>,
}

impl Declaration {
  pub fn new(text: impl Into<String>) -> Self {
    Self { text: text.into(), at: Utc::now() }
  }
}

// ─── Relationship to the organisation ────────────────────────────────────────

/// How a delegated person relates to the organisation that nominates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Relationship {
  Employment,
  Consultancy { consultancy_name: String },
  ComplianceScheme { compliance_scheme_name: String },
  Other { organisation_name: String, description: String },
}

impl Relationship {
  /// The integer stored in the `relationship_type` column.
  pub fn type_id(&self) -> i64 {
    match self {
      Self::Employment => 1,
      Self::Consultancy { .. } => 2,
      Self::ComplianceScheme { .. } => 3,
      Self::Other { .. } => 4,
    }
  }

  /// Rebuild from the stored type id and its detail columns.
  pub fn from_parts(
    type_id: i64,
    consultancy_name: Option<String>,
    compliance_scheme_name: Option<String>,
    other_organisation_name: Option<String>,
    other_description: Option<String>,
  ) -> Result<Self> {
    match type_id {
      1 => Ok(Self::Employment),
      2 => Ok(Self::Consultancy {
        consultancy_name: consultancy_name.unwrap_or_default(),
      }),
      3 => Ok(Self::ComplianceScheme {
        compliance_scheme_name: compliance_scheme_name.unwrap_or_default(),
      }),
      4 => Ok(Self::Other {
        organisation_name: other_organisation_name.unwrap_or_default(),
        description:       other_description.unwrap_or_default(),
      }),
      other => Err(Error::UnknownRelationshipType(other)),
    }
  }

  /// Name of the first required detail that is blank, if any.
  pub fn missing_detail(&self) -> Option<&'static str> {
    let blank = |s: &str| s.trim().is_empty();
    match self {
      Self::Employment => None,
      Self::Consultancy { consultancy_name } if blank(consultancy_name) => {
        Some("consultancy_name")
      }
      Self::ComplianceScheme { compliance_scheme_name }
        if blank(compliance_scheme_name) =>
      {
        Some("compliance_scheme_name")
      }
      Self::Other { organisation_name, .. } if blank(organisation_name) => {
        Some("organisation_name")
      }
      Self::Other { description, .. } if blank(description) => {
        Some("description")
      }
      _ => None,
    }
  }
}

// ─── Delegated person ────────────────────────────────────────────────────────

/// The nomination behind a Delegated Person enrolment.
///
/// `nominator_enrolment_id` is unique across non-deleted nominations: one
/// Approved Person enrolment backs at most one delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedPersonNomination {
  #[serde(skip)]
  pub id:                     i64,
  #[serde(skip)]
  pub enrolment_id:           i64,
  #[serde(skip)]
  pub nominator_enrolment_id: i64,
  pub relationship:           Relationship,
  pub nominator_declaration:  Declaration,
  /// `None` until the nominee accepts.
  pub nominee_declaration:    Option<Declaration>,
}

/// Input to [`crate::store::AccountStore::create_delegated_nomination`].
#[derive(Debug, Clone)]
pub struct NewDelegatedNomination {
  pub nominator_enrolment_id: i64,
  pub relationship:           Relationship,
  pub nominator_declaration:  Declaration,
}

// ─── Approved person ─────────────────────────────────────────────────────────

/// The nomination behind an Approved Person enrolment. The nominating act is
/// the organisation's own, so only the nominee's declaration is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedPersonNomination {
  #[serde(skip)]
  pub id:                  i64,
  #[serde(skip)]
  pub enrolment_id:        i64,
  pub nominee_declaration: Option<Declaration>,
}
