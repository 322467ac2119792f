//! Decoding one framed line into events.

use ragline_core::event::{StreamEvent, WireChunk};

use crate::Result;

/// Decode a framed line.
///
/// Returns `Ok(None)` for blank lines. A line that decodes to an object with
/// no known fields yields `Ok(Some(vec![]))`.
pub fn decode_line(line: &[u8]) -> Result<Option<Vec<StreamEvent>>> {
  let text = std::str::from_utf8(line)?;
  let text = text.trim();
  if text.is_empty() {
    return Ok(None);
  }
  let chunk: WireChunk = serde_json::from_str(text)?;
  if chunk.is_anomalous() {
    tracing::warn!("stream line carries an error alongside payload: {text}");
  }
  Ok(Some(chunk.into_events()))
}
