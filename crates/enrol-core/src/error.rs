//! Error types for `enrol-core`.

use thiserror::Error;

/// Failures decoding the integer codes stored alongside domain enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error("unknown enrolment status code: {0}")]
  UnknownEnrolmentStatus(i64),

  #[error("unknown service role id: {0}")]
  UnknownServiceRole(i64),

  #[error("unknown person role id: {0}")]
  UnknownPersonRole(i64),

  #[error("unknown organisation role id: {0}")]
  UnknownOrganisationRole(i64),

  #[error("unknown nation id: {0}")]
  UnknownNation(i64),

  #[error("unknown relationship type: {0}")]
  UnknownRelationshipType(i64),

  #[error("unknown regulator comment kind: {0}")]
  UnknownCommentKind(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
