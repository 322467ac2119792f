//! Error type for `ragline-stream`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
  /// The underlying connection failed mid-stream.
  #[error("stream read failed: {0}")]
  Read(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// A line was not valid UTF-8. Recovered locally by skipping the line.
  #[error("line is not valid UTF-8: {0}")]
  Utf8(#[from] std::str::Utf8Error),

  /// A line was not a JSON event. Recovered locally by skipping the line.
  #[error("malformed event line: {0}")]
  Malformed(#[from] serde_json::Error),
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;
