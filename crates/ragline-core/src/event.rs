//! Events carried by the query stream.
//!
//! On the wire each line is a JSON object with optional fields:
//!
//! ```json
//! {"response"?: "...", "conversation_id"?: 42, "references"?: [...],
//!  "inferred_filters"?: ["..."], "error"?: "..."}
//! ```
//!
//! In practice a line carries one of them. [`WireChunk`] is the raw shape;
//! [`StreamEvent`] is the tagged union the rest of the client works with.

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationId;

/// A document the backend cited while answering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
  pub reference_id: String,
  pub file_path:    String,
}

/// One decoded line of the stream, exactly as sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireChunk {
  #[serde(default)]
  pub response:         Option<String>,
  #[serde(default)]
  pub conversation_id:  Option<ConversationId>,
  #[serde(default)]
  pub references:       Option<Vec<Reference>>,
  #[serde(default)]
  pub inferred_filters: Option<Vec<String>>,
  #[serde(default)]
  pub error:            Option<String>,
}

impl WireChunk {
  fn field_count(&self) -> usize {
    [
      self.response.is_some(),
      self.conversation_id.is_some(),
      self.references.is_some(),
      self.inferred_filters.is_some(),
      self.error.is_some(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count()
  }

  /// Whether this line mixes an error with payload fields. Such lines are
  /// still honoured (payload first, then the error) but are worth flagging.
  pub fn is_anomalous(&self) -> bool {
    self.error.is_some() && self.field_count() > 1
  }

  /// Split the chunk into events, in the order the session folds them:
  /// conversation id, references, inferred filters, content delta, error.
  pub fn into_events(self) -> Vec<StreamEvent> {
    let mut events = Vec::with_capacity(self.field_count());
    if let Some(id) = self.conversation_id {
      events.push(StreamEvent::ConversationAssigned(id));
    }
    if let Some(refs) = self.references {
      events.push(StreamEvent::References(refs));
    }
    if let Some(filters) = self.inferred_filters {
      events.push(StreamEvent::InferredFilters(filters));
    }
    if let Some(delta) = self.response {
      events.push(StreamEvent::Delta(delta));
    }
    if let Some(message) = self.error {
      events.push(StreamEvent::Error(message));
    }
    events
  }
}

/// A single event from the query stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
  /// A fragment of the answer, to append to what came before.
  Delta(String),
  /// The backend created (or confirmed) the conversation for this query.
  ConversationAssigned(ConversationId),
  References(Vec<Reference>),
  InferredFilters(Vec<String>),
  /// The backend gave up. Always the last event of a stream.
  Error(String),
}

impl StreamEvent {
  pub fn is_error(&self) -> bool { matches!(self, Self::Error(_)) }
}
