//! Error types for `ragline-client`.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
  /// The backend answered with a non-success status.
  #[error("{endpoint} → {status}")]
  Status {
    endpoint: String,
    status:   StatusCode,
  },

  /// The backend rejected the identity headers (401/403).
  #[error("{endpoint} → {status}: check the configured user id and API key")]
  Unauthorized {
    endpoint: String,
    status:   StatusCode,
  },

  /// The query endpoint answered without a body to stream.
  #[error("{endpoint} returned no response body")]
  NoBody { endpoint: String },

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("invalid {name} header value")]
  InvalidHeader { name: &'static str },

  #[error("reading attachment {}: {source}", path.display())]
  Attachment {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// An error from a [`ChatSurface`](crate::ChatSurface) operation.
#[derive(Debug, Error)]
pub enum ChatError {
  #[error(transparent)]
  Core(#[from] ragline_core::Error),

  #[error("backend error: {0}")]
  Api(#[source] Box<dyn std::error::Error + Send + Sync>),
}
