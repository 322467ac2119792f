//! Client configuration.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::{ClientError, Result, session::SessionTimeouts};

/// Header carrying the caller's user identifier.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the deployment's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Connection settings for the RAG backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
  pub base_url:             String,
  #[serde(default)]
  pub user_id:              String,
  #[serde(default)]
  pub api_key:              String,
  /// Applies to the CRUD endpoints, not to streaming queries.
  #[serde(default = "default_request_timeout")]
  pub request_timeout_secs: u64,
  /// Longest gap between stream events; `0` disables the check.
  #[serde(default = "default_idle_timeout")]
  pub idle_timeout_secs:    u64,
  /// Longest a whole query may take; `0` disables the check.
  #[serde(default = "default_total_timeout")]
  pub total_timeout_secs:   u64,
}

fn default_request_timeout() -> u64 { 30 }
fn default_idle_timeout() -> u64 { 120 }
fn default_total_timeout() -> u64 { 600 }

impl ClientConfig {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url:             base_url.into(),
      user_id:              String::new(),
      api_key:              String::new(),
      request_timeout_secs: default_request_timeout(),
      idle_timeout_secs:    default_idle_timeout(),
      total_timeout_secs:   default_total_timeout(),
    }
  }

  pub fn with_identity(
    mut self,
    user_id: impl Into<String>,
    api_key: impl Into<String>,
  ) -> Self {
    self.user_id = user_id.into();
    self.api_key = api_key.into();
    self
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  pub fn session_timeouts(&self) -> SessionTimeouts {
    SessionTimeouts {
      idle:  non_zero_secs(self.idle_timeout_secs),
      total: non_zero_secs(self.total_timeout_secs),
    }
  }

  /// The identity headers sent with every request. Empty values are left
  /// out; the backend will reject such requests, which is a configuration
  /// problem rather than a protocol one.
  pub fn identity_headers(&self) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in [(USER_ID_HEADER, &self.user_id), (API_KEY_HEADER, &self.api_key)] {
      if value.is_empty() {
        tracing::warn!("{name} is not configured; requests will likely be rejected");
        continue;
      }
      let mut value =
        HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader { name })?;
      value.set_sensitive(name == API_KEY_HEADER);
      headers.insert(HeaderName::from_static(name), value);
    }
    Ok(headers)
  }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
  (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identity_headers_skip_empty_values() {
    let headers = ClientConfig::new("http://x").identity_headers().unwrap();
    assert!(headers.is_empty());

    let headers = ClientConfig::new("http://x")
      .with_identity("u-1", "secret")
      .identity_headers()
      .unwrap();
    assert_eq!(headers[USER_ID_HEADER], "u-1");
    assert_eq!(headers[API_KEY_HEADER], "secret");
    assert!(headers[API_KEY_HEADER].is_sensitive());
  }

  #[test]
  fn control_characters_are_rejected() {
    let err = ClientConfig::new("http://x")
      .with_identity("bad\nid", "k")
      .identity_headers()
      .unwrap_err();
    assert!(matches!(err, ClientError::InvalidHeader { name: USER_ID_HEADER }));
  }

  #[test]
  fn zero_disables_session_timeouts() {
    let mut config = ClientConfig::new("http://x");
    assert_eq!(config.session_timeouts().idle, Some(Duration::from_secs(120)));
    config.idle_timeout_secs = 0;
    config.total_timeout_secs = 0;
    assert_eq!(config.session_timeouts(), SessionTimeouts::default());
  }

  #[test]
  fn deserialises_with_defaults() {
    let config: ClientConfig =
      serde_json::from_str(r#"{"base_url":"http://rag:8012","user_id":"7"}"#).unwrap();
    assert_eq!(config.user_id, "7");
    assert!(config.api_key.is_empty());
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.session_timeouts().total, Some(Duration::from_secs(600)));
  }
}
