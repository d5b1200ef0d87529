//! Error type for `enrol-store-sqlite`.

use enrol_core::store::{StoreError, WriteConflict};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] enrol_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A row the caller addressed by internal id does not exist.
  #[error("{table} row {id} not found")]
  RowNotFound { table: &'static str, id: i64 },

  #[error(transparent)]
  Conflict(#[from] WriteConflict),
}

impl StoreError for Error {
  fn as_conflict(&self) -> Option<&WriteConflict> {
    match self {
      Self::Conflict(conflict) => Some(conflict),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
