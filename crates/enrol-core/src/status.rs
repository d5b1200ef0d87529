//! Enrolment status: the state of one connection's participation in one
//! service role.
//!
//! The integer codes are the persisted representation and must never be
//! renumbered.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Every status an enrolment can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrolmentStatus {
  NotSet,
  Enrolled,
  Pending,
  Approved,
  Rejected,
  Invited,
  OnHold,
  Nominated,
}

impl EnrolmentStatus {
  /// The integer stored in the `status` column.
  pub fn code(self) -> i64 {
    match self {
      Self::NotSet => 0,
      Self::Enrolled => 1,
      Self::Pending => 2,
      Self::Approved => 3,
      Self::Rejected => 4,
      Self::Invited => 5,
      Self::OnHold => 6,
      Self::Nominated => 7,
    }
  }

  pub fn from_code(code: i64) -> Result<Self> {
    match code {
      0 => Ok(Self::NotSet),
      1 => Ok(Self::Enrolled),
      2 => Ok(Self::Pending),
      3 => Ok(Self::Approved),
      4 => Ok(Self::Rejected),
      5 => Ok(Self::Invited),
      6 => Ok(Self::OnHold),
      7 => Ok(Self::Nominated),
      other => Err(Error::UnknownEnrolmentStatus(other)),
    }
  }

  /// Statuses that let the holder act with the authority of their role.
  pub fn is_active_authority(self) -> bool {
    matches!(self, Self::Enrolled | Self::Approved)
  }

  /// Statuses that wait on a regulator.
  pub fn awaits_regulator(self) -> bool {
    matches!(self, Self::Pending | Self::OnHold)
  }

  /// A regulator decision into this status settles a pending nation
  /// transfer.
  pub fn settles_transfer(self) -> bool {
    matches!(self, Self::Approved | Self::Rejected)
  }

  /// Entering this status starts the enrolment's validity window.
  pub fn opens_validity(self) -> bool { self.is_active_authority() }

  /// Entering this status ends the enrolment's validity window.
  pub fn closes_validity(self) -> bool { matches!(self, Self::Rejected) }

  /// The decisions a regulator may make on an enrolment in this status.
  pub fn regulator_targets(self) -> &'static [EnrolmentStatus] {
    match self {
      Self::Pending => &[Self::Approved, Self::Rejected, Self::OnHold],
      _ => &[],
    }
  }
}

impl fmt::Display for EnrolmentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::NotSet => "NotSet",
      Self::Enrolled => "Enrolled",
      Self::Pending => "Pending",
      Self::Approved => "Approved",
      Self::Rejected => "Rejected",
      Self::Invited => "Invited",
      Self::OnHold => "OnHold",
      Self::Nominated => "Nominated",
    };
    f.write_str(name)
  }
}

/// A compare-and-swap request against an enrolment's status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
  pub expected: EnrolmentStatus,
  pub to:       EnrolmentStatus,
}

impl StatusChange {
  pub fn new(expected: EnrolmentStatus, to: EnrolmentStatus) -> Self {
    Self { expected, to }
  }
}
