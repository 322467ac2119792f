//! The request payload for `POST /query/stream`.

use serde::{Deserialize, Serialize};

use crate::{
  conversation::{ConversationId, Message, Role},
  settings::{QueryMode, QuerySettings},
};

/// Number of prior messages sent as conversation history.
pub const HISTORY_WINDOW: usize = 3;

/// One prior turn sent to the backend for context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub role:    Role,
  pub content: String,
}

impl From<&Message> for HistoryEntry {
  fn from(m: &Message) -> Self {
    Self { role: m.role, content: m.content.clone() }
  }
}

/// Keep the last [`HISTORY_WINDOW`] messages, oldest first.
pub fn history_window(messages: &[Message]) -> Vec<HistoryEntry> {
  let start = messages.len().saturating_sub(HISTORY_WINDOW);
  messages[start..].iter().map(HistoryEntry::from).collect()
}

/// JSON body of a streaming query. With attachments it travels as the
/// `query_params` multipart field instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
  pub query:                String,
  pub mode:                 QueryMode,
  pub stream:               bool,
  pub include_references:   bool,
  pub local_k:              u32,
  pub global_k:             u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub conversation_id:      Option<ConversationId>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub division_filter:      Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub access_filter:        Vec<String>,
  #[serde(default)]
  pub conversation_history: Vec<HistoryEntry>,
}

impl QueryRequest {
  /// Build the payload for one submission.
  ///
  /// `history` is truncated to its last [`HISTORY_WINDOW`] entries. Empty
  /// filters are omitted from the serialised body, and any attachment forces
  /// the mode to [`QueryMode::Bypass`].
  pub fn build(
    query: impl Into<String>,
    settings: &QuerySettings,
    conversation_id: Option<ConversationId>,
    mut history: Vec<HistoryEntry>,
    has_attachments: bool,
  ) -> Self {
    if history.len() > HISTORY_WINDOW {
      history.drain(..history.len() - HISTORY_WINDOW);
    }
    Self {
      query: query.into(),
      mode: settings.mode.effective(has_attachments),
      stream: true,
      include_references: settings.include_references,
      local_k: settings.local_k,
      global_k: settings.global_k,
      conversation_id,
      division_filter: settings.division_filter.clone(),
      access_filter: settings.access_filter.clone(),
      conversation_history: history,
    }
  }
}
