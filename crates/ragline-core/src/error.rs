//! Error types for `ragline-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown query mode: {0:?}")]
  UnknownMode(String),

  #[error("{field} must be within {min}..={max}, got {value}")]
  OutOfRange {
    field: &'static str,
    value: u32,
    min:   u32,
    max:   u32,
  },

  #[error("a submission is already in flight")]
  SubmitInFlight,

  #[error("no submission is in flight")]
  NothingPending,

  #[error("query must not be empty")]
  EmptyQuery,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
