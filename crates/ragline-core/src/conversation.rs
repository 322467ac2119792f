//! Conversations and messages as the RAG backend stores them.
//!
//! Identity is assigned by the backend. Messages created locally before the
//! backend confirms them carry a *provisional* id: a negative integer that
//! can never collide with a persisted (positive) id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend-assigned conversation identifier.
pub type ConversationId = i64;

/// Message identifier. Negative values are provisional.
pub type MessageId = i64;

/// Free-form metadata attached to conversations and messages.
pub type Metadata = Map<String, Value>;

/// Title shown for a conversation the backend has not named yet.
pub const UNTITLED: &str = "Untitled Chat";

// ─── Conversation ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
  pub id:            ConversationId,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id:       Option<i64>,
  pub title:         Option<String>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
  #[serde(default)]
  pub metadata:      Metadata,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message_count: Option<u64>,
}

impl Conversation {
  /// The title to display, falling back to [`UNTITLED`].
  pub fn display_title(&self) -> &str {
    self
      .title
      .as_deref()
      .filter(|t| !t.trim().is_empty())
      .unwrap_or(UNTITLED)
  }
}

/// Body of `POST /conversations/`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewConversation {
  pub title:    Option<String>,
  pub metadata: Metadata,
}

/// Body of `PATCH /conversations/{id}`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title:    Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata: Option<Metadata>,
}

// ─── Message ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
  System,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::User => "user",
      Self::Assistant => "assistant",
      Self::System => "system",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub id:              MessageId,
  /// `None` while the conversation has not been created by the backend yet.
  pub conversation_id: Option<ConversationId>,
  pub role:            Role,
  pub content:         String,
  pub created_at:      DateTime<Utc>,
  #[serde(default)]
  pub metadata:        Metadata,
}

impl Message {
  /// Whether this message's id was generated locally.
  pub fn is_provisional(&self) -> bool { self.id < 0 }

  /// File descriptors recorded under `metadata.files`, if any.
  pub fn files(&self) -> Vec<FileMetadata> {
    self
      .metadata
      .get(FILES_KEY)
      .cloned()
      .and_then(|v| serde_json::from_value(v).ok())
      .unwrap_or_default()
  }
}

/// Body of `POST /conversations/{id}/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
  pub role:     Role,
  pub content:  String,
  pub metadata: Metadata,
}

// ─── Attachments ─────────────────────────────────────────────────────────────

/// Metadata key under which a message lists the files sent with it.
pub const FILES_KEY: &str = "files";

/// Descriptor of a file sent alongside a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
  pub name: String,
  #[serde(rename = "type")]
  pub content_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub size: Option<u64>,
}
