//! The `ConversationApi` trait: conversation persistence as a capability.
//!
//! The backend owns conversations and messages. The HTTP client implements
//! this trait against the REST endpoints; the chat surface and its tests
//! depend only on the abstraction.

use std::future::Future;

use crate::conversation::{
  Conversation, ConversationId, ConversationPatch, Message, MessageId,
  NewConversation, NewMessage,
};

/// Offset/limit window for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
  pub skip:  u32,
  pub limit: u32,
}

impl Page {
  /// Default window for `list_conversations`.
  pub const CONVERSATIONS: Self = Self { skip: 0, limit: 50 };
  /// Default window for `list_messages`.
  pub const MESSAGES: Self = Self { skip: 0, limit: 100 };
}

/// Abstraction over the backend's conversation CRUD endpoints.
///
/// All methods return `Send` futures so the trait can be used from tasks
/// spawned on a multi-threaded runtime.
pub trait ConversationApi: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Conversations ─────────────────────────────────────────────────────

  /// List the caller's conversations, most recently updated first.
  fn list_conversations(
    &self,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Conversation>, Self::Error>> + Send + '_;

  fn create_conversation(
    &self,
    input: NewConversation,
  ) -> impl Future<Output = Result<Conversation, Self::Error>> + Send + '_;

  fn get_conversation(
    &self,
    id: ConversationId,
  ) -> impl Future<Output = Result<Conversation, Self::Error>> + Send + '_;

  /// Update title and/or metadata. `metadata`, when present, replaces the
  /// stored map wholesale; callers merge before sending.
  fn update_conversation(
    &self,
    id: ConversationId,
    patch: ConversationPatch,
  ) -> impl Future<Output = Result<Conversation, Self::Error>> + Send + '_;

  fn delete_conversation(
    &self,
    id: ConversationId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Messages ──────────────────────────────────────────────────────────

  /// List a conversation's messages, oldest first.
  fn list_messages(
    &self,
    conversation_id: ConversationId,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + '_;

  fn create_message(
    &self,
    conversation_id: ConversationId,
    input: NewMessage,
  ) -> impl Future<Output = Result<Message, Self::Error>> + Send + '_;

  fn delete_message(
    &self,
    conversation_id: ConversationId,
    message_id: MessageId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
