//! Regulator comments recorded against an enrolment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which decision a comment explains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
  Rejection,
  Transfer,
  OnHold,
}

impl CommentKind {
  pub fn id(self) -> i64 {
    match self {
      Self::Rejection => 1,
      Self::Transfer => 2,
      Self::OnHold => 3,
    }
  }

  pub fn from_id(id: i64) -> Result<Self> {
    match id {
      1 => Ok(Self::Rejection),
      2 => Ok(Self::Transfer),
      3 => Ok(Self::OnHold),
      other => Err(Error::UnknownCommentKind(other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulatorComment {
  #[serde(skip)]
  pub id:                  i64,
  #[serde(skip)]
  pub enrolment_id:        i64,
  #[serde(skip)]
  pub regulator_person_id: i64,
  pub kind:                CommentKind,
  pub text:                String,
  pub created_on:          DateTime<Utc>,
}

/// Input for comment-writing store operations.
#[derive(Debug, Clone)]
pub struct NewRegulatorComment {
  pub regulator_person_id: i64,
  pub kind:                CommentKind,
  pub text:                String,
}
