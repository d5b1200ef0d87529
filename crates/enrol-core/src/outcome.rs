//! Result types returned by the authorization gate and the workflows.
//!
//! Expected business failures are values: every workflow returns
//! `Result<Outcome<T>, RoleManagementError>`, where the inner [`Outcome`]
//! carries a [`Rejection`] for anything a caller can cause and the outer
//! [`RoleManagementError`] is reserved for backend failures and integrity
//! bugs.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
  role::ServiceRole,
  status::EnrolmentStatus,
  store::WriteConflict,
};

/// A business rule that refused the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainRule {
  #[error("service {0:?} is not supported for this operation")]
  ServiceNotSupported(String),

  #[error("the enrolment does not belong to this user, organisation and service")]
  IdMismatch,

  #[error("enrolment is {actual}, expected {expected}")]
  WrongCurrentStatus {
    expected: EnrolmentStatus,
    actual:   EnrolmentStatus,
  },

  #[error("enrolment is a {actual} enrolment, expected {expected}")]
  WrongServiceRole {
    expected: ServiceRole,
    actual:   ServiceRole,
  },

  #[error("cannot move an enrolment from {from} to {to}")]
  InvalidTransition {
    from: EnrolmentStatus,
    to:   EnrolmentStatus,
  },

  #[error("a comment is required when setting status to {0}")]
  MissingComment(EnrolmentStatus),

  #[error("nation is missing or invalid")]
  InvalidNation,

  #[error("the nomination expired at {0}")]
  NominationExpired(DateTime<Utc>),

  #[error("the nominee must be enrolled in the service")]
  NomineeNotEnrolled,

  #[error("users cannot nominate themselves")]
  SelfNomination,

  #[error("users cannot change their own role")]
  SelfRoleChange,

  #[error("an Approved Person's role cannot be changed")]
  ApprovedPersonRoleLocked,
}

/// Why a request was refused. Each variant maps to one class of
/// user-visible response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
  /// Malformed or missing input, detected before any state was read.
  #[error("invalid request: {0}")]
  Validation(String),

  /// A gate predicate did not hold.
  #[error("not authorised: {0}")]
  Unauthorised(String),

  #[error("{0} not found")]
  NotFound(String),

  /// A uniqueness constraint or status compare-and-swap was lost.
  #[error("conflict: {0}")]
  Conflict(#[from] WriteConflict),

  #[error("{0}")]
  DomainRule(#[from] DomainRule),
}

impl Rejection {
  pub fn not_found(what: impl Into<String>) -> Self { Self::NotFound(what.into()) }

  pub fn validation(reason: impl Into<String>) -> Self {
    Self::Validation(reason.into())
  }

  /// Stable machine-readable name for the failure.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Validation(_) => "validation",
      Self::Unauthorised(_) => "not-authorised",
      Self::NotFound(_) => "not-found",
      Self::Conflict(WriteConflict::DuplicateEnrolment { .. }) => {
        "duplicate-enrolment"
      }
      Self::Conflict(WriteConflict::DuplicateNomination { .. }) => {
        "duplicate-nomination"
      }
      Self::Conflict(WriteConflict::StatusConflict { .. }) => "status-conflict",
      Self::Conflict(WriteConflict::EnrolmentNotFound(_)) => "not-found",
      Self::Conflict(WriteConflict::UserAlreadyLinked(_)) => {
        "user-already-linked"
      }
      Self::Conflict(WriteConflict::AuthorityRevoked { .. }) => {
        "authority-revoked"
      }
      Self::DomainRule(rule) => match rule {
        DomainRule::ServiceNotSupported(_) => "service-not-supported",
        DomainRule::IdMismatch => "id-mismatch",
        DomainRule::WrongCurrentStatus { .. } => "wrong-current-status",
        DomainRule::WrongServiceRole { .. } => "wrong-service-role",
        DomainRule::InvalidTransition { .. } => "invalid-source-status",
        DomainRule::MissingComment(_) => "missing-comment",
        DomainRule::InvalidNation => "invalid-nation",
        DomainRule::NominationExpired(_) => "nomination-expired",
        DomainRule::NomineeNotEnrolled => "nominee-not-enrolled",
        DomainRule::SelfNomination => "self-nomination",
        DomainRule::SelfRoleChange => "self-role-change",
        DomainRule::ApprovedPersonRoleLocked => "approved-person-role-locked",
      },
    }
  }
}

/// The result of a workflow step that completed without a fatal error.
pub type Outcome<T> = Result<T, Rejection>;

/// Unexpected failures: the store is unreachable, or its contents contradict
/// an invariant the workflow relies on.
#[derive(Debug, Error)]
pub enum RoleManagementError {
  #[error("store error during {operation}: {source}")]
  Store {
    operation: &'static str,
    #[source]
    source:    Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("inconsistent state during {operation}: {detail}")]
  Inconsistent {
    operation: &'static str,
    detail:    String,
  },
}
