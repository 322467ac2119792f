//! `ChatState`: the caller-owned store for one chat surface.
//!
//! Holds the conversation list, the open conversation's messages and the
//! current query settings, and folds session callbacks into them:
//!
//! - [`ChatState::begin_submit`] inserts the optimistic user message and an
//!   empty assistant placeholder before any network activity.
//! - [`ChatState::apply_content`] replaces the placeholder's content with the
//!   running total.
//! - [`ChatState::adopt_conversation`] binds a new chat to the conversation
//!   the backend created for it (first id wins).
//! - [`ChatState::complete`], [`ChatState::fail`] and [`ChatState::cancel`]
//!   end the exchange. Only completion keeps the assistant message; the user
//!   message always stays.
//!
//! One surface runs one exchange at a time. `begin_submit` refuses a second
//! submission while one is pending; the session controller itself does not
//! check.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
  Error, Result,
  conversation::{
    Conversation, ConversationId, FILES_KEY, FileMetadata, Message, MessageId,
    Metadata, Role,
  },
  event::Reference,
  query::{QueryRequest, history_window},
  settings::QuerySettings,
};

pub const REFERENCES_KEY: &str = "references";
pub const INFERRED_FILTERS_KEY: &str = "inferred_filters";

// ─── Notices ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoticeLevel {
  Info,
  /// Something after the exchange went wrong; the answer itself is fine.
  Warning,
  /// The exchange failed.
  Error,
}

/// A user-visible message queued for the UI to show once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub level: NoticeLevel,
  pub text:  String,
}

// ─── Exchange bookkeeping ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Pending {
  placeholder:     Message,
  had_attachments: bool,
  adopted:         bool,
  settings:        QuerySettings,
}

/// What the caller needs to finish reconciling a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
  /// The conversation the exchange belongs to, if the backend named one.
  pub conversation_id: Option<ConversationId>,
  /// Whether the conversation was created during this exchange.
  pub adopted:         bool,
  /// Settings to persist into the conversation's metadata.
  pub settings:        QuerySettings,
  /// The provisional id of the finalized assistant message.
  pub message_id:      MessageId,
}

// ─── ChatState ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChatState {
  conversations:    Vec<Conversation>,
  current:          Option<ConversationId>,
  messages:         Vec<Message>,
  pending:          Option<Pending>,
  settings:         QuerySettings,
  default_settings: QuerySettings,
  notices:          Vec<Notice>,
  next_provisional: MessageId,
}

impl Default for ChatState {
  fn default() -> Self { Self::new(QuerySettings::default()) }
}

impl ChatState {
  pub fn new(default_settings: QuerySettings) -> Self {
    Self {
      conversations: Vec::new(),
      current: None,
      messages: Vec::new(),
      pending: None,
      settings: default_settings.clone(),
      default_settings,
      notices: Vec::new(),
      next_provisional: -1,
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub fn conversations(&self) -> &[Conversation] { &self.conversations }

  pub fn current_conversation_id(&self) -> Option<ConversationId> { self.current }

  pub fn current_conversation(&self) -> Option<&Conversation> {
    let id = self.current?;
    self.conversations.iter().find(|c| c.id == id)
  }

  /// Settled messages of the open conversation, oldest first.
  pub fn messages(&self) -> &[Message] { &self.messages }

  /// The assistant placeholder while an exchange is in flight.
  pub fn streaming_message(&self) -> Option<&Message> {
    self.pending.as_ref().map(|p| &p.placeholder)
  }

  /// True between `begin_submit` and the end of the exchange. Callers must
  /// not start another session while this holds.
  pub fn is_busy(&self) -> bool { self.pending.is_some() }

  pub fn settings(&self) -> &QuerySettings { &self.settings }

  pub fn set_settings(&mut self, settings: QuerySettings) -> Result<()> {
    settings.validate()?;
    self.settings = settings;
    Ok(())
  }

  pub fn reset_settings(&mut self) { self.settings = self.default_settings.clone(); }

  /// Take all queued notices, oldest first.
  pub fn drain_notices(&mut self) -> Vec<Notice> { std::mem::take(&mut self.notices) }

  pub fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
    self.notices.push(Notice { level, text: text.into() });
  }

  // ── Conversation list ─────────────────────────────────────────────────

  pub fn set_conversations(&mut self, conversations: Vec<Conversation>) {
    self.conversations = conversations;
  }

  /// Replace the conversation with the same id, or insert it at the top.
  pub fn upsert_conversation(&mut self, conversation: Conversation) {
    match self.conversations.iter_mut().find(|c| c.id == conversation.id) {
      Some(existing) => *existing = conversation,
      None => self.conversations.insert(0, conversation),
    }
  }

  /// Bump `updated_at` and move the conversation to the top of the list.
  pub fn touch_conversation(&mut self, id: ConversationId, at: DateTime<Utc>) {
    if let Some(pos) = self.conversations.iter().position(|c| c.id == id) {
      let mut conversation = self.conversations.remove(pos);
      conversation.updated_at = at;
      self.conversations.insert(0, conversation);
    }
  }

  /// Drop a conversation from the list. If it was open, the first remaining
  /// conversation becomes the selection (or none); that choice is returned
  /// so the caller can load its messages.
  pub fn remove_conversation(
    &mut self,
    id: ConversationId,
  ) -> Option<Option<ConversationId>> {
    self.conversations.retain(|c| c.id != id);
    if self.current != Some(id) {
      return None;
    }
    self.current = None;
    self.messages.clear();
    Some(self.conversations.first().map(|c| c.id))
  }

  // ── Selection ─────────────────────────────────────────────────────────

  /// Start a fresh chat with default settings.
  pub fn new_chat(&mut self) -> Result<()> {
    self.ensure_idle()?;
    self.current = None;
    self.messages.clear();
    self.reset_settings();
    Ok(())
  }

  /// Show `conversation_id` with the given messages, restoring the settings
  /// stored in its metadata when there are any.
  pub fn open_conversation(
    &mut self,
    conversation_id: ConversationId,
    messages: Vec<Message>,
  ) -> Result<()> {
    self.ensure_idle()?;
    self.current = Some(conversation_id);
    self.messages = messages;
    let restored = self
      .current_conversation()
      .and_then(|c| QuerySettings::from_metadata(&c.metadata));
    if let Some(settings) = restored {
      self.settings = settings;
    }
    Ok(())
  }

  /// Swap provisional messages for the persisted ones fetched after an
  /// exchange.
  ///
  /// Only the trailing provisional messages that line up (same role and
  /// content) with the end of `messages` are replaced; a page that does not
  /// reach the newest messages leaves everything as it is. Metadata recorded
  /// locally, such as references, is kept when the persisted copy lacks it.
  /// Ignored if the user has moved on or another exchange started. Returns
  /// how many messages were replaced.
  pub fn replace_messages(
    &mut self,
    conversation_id: ConversationId,
    messages: Vec<Message>,
  ) -> usize {
    if self.is_busy() || self.current != Some(conversation_id) {
      return 0;
    }
    let matched = self
      .messages
      .iter()
      .rev()
      .zip(messages.iter().rev())
      .take_while(|(local, persisted)| {
        local.is_provisional()
          && local.role == persisted.role
          && local.content == persisted.content
      })
      .count();
    if matched == 0 {
      tracing::debug!(
        conversation_id,
        fetched = messages.len(),
        "fetched messages do not end with this exchange; keeping provisional ids"
      );
      return 0;
    }

    let start = self.messages.len() - matched;
    let skip = messages.len() - matched;
    let persisted = messages.into_iter().skip(skip);
    for (local, mut persisted) in self.messages[start..].iter_mut().zip(persisted) {
      for (key, value) in &local.metadata {
        persisted.metadata.entry(key.clone()).or_insert_with(|| value.clone());
      }
      *local = persisted;
    }
    matched
  }

  // ── Exchange lifecycle ────────────────────────────────────────────────

  /// Record the user's message and an empty assistant placeholder, and build
  /// the request for the session.
  pub fn begin_submit(
    &mut self,
    query: &str,
    files: Vec<FileMetadata>,
  ) -> Result<QueryRequest> {
    self.ensure_idle()?;
    let query = query.trim();
    if query.is_empty() {
      return Err(Error::EmptyQuery);
    }

    // History is what came before this submission.
    let history = history_window(&self.messages);
    let had_attachments = !files.is_empty();

    let mut metadata = Metadata::new();
    if had_attachments {
      metadata.insert(FILES_KEY.into(), serde_json::to_value(&files)?);
    }
    let user_message = self.provisional(Role::User, query.to_string(), metadata);
    self.messages.push(user_message);

    let placeholder = self.provisional(Role::Assistant, String::new(), Metadata::new());
    self.pending = Some(Pending {
      placeholder,
      had_attachments,
      adopted: false,
      settings: self.settings.clone(),
    });

    Ok(QueryRequest::build(
      query,
      &self.settings,
      self.current,
      history,
      had_attachments,
    ))
  }

  /// Replace the placeholder's content with the accumulated answer.
  pub fn apply_content(&mut self, accumulated: &str) {
    if let Some(pending) = &mut self.pending {
      pending.placeholder.content.clear();
      pending.placeholder.content.push_str(accumulated);
    }
  }

  /// Bind a new chat to the conversation the backend created. Returns `true`
  /// only the first time, when the caller should fetch the conversation's
  /// metadata; an already-bound chat keeps its id.
  pub fn adopt_conversation(&mut self, id: ConversationId) -> bool {
    if self.current.is_some() {
      return false;
    }
    self.current = Some(id);
    for message in self.messages.iter_mut().filter(|m| m.conversation_id.is_none()) {
      message.conversation_id = Some(id);
    }
    if let Some(pending) = &mut self.pending {
      pending.placeholder.conversation_id = Some(id);
      pending.adopted = true;
    }
    true
  }

  pub fn apply_references(&mut self, references: &[Reference]) {
    self.annotate(REFERENCES_KEY, serde_json::to_value(references));
  }

  pub fn apply_inferred_filters(&mut self, filters: &[String]) {
    self.annotate(INFERRED_FILTERS_KEY, serde_json::to_value(filters));
  }

  /// Turn the placeholder into a settled assistant message.
  pub fn complete(&mut self) -> Result<Completion> {
    let pending = self.pending.take().ok_or(Error::NothingPending)?;
    let now = Utc::now();
    let mut message = pending.placeholder;
    message.created_at = now;
    let completion = Completion {
      conversation_id: message.conversation_id,
      adopted: pending.adopted,
      settings: pending.settings.snapshot(pending.had_attachments),
      message_id: message.id,
    };
    self.messages.push(message);
    if let Some(id) = completion.conversation_id {
      self.touch_conversation(id, now);
    }
    Ok(completion)
  }

  /// Drop the placeholder after a failed exchange. The user's message stays
  /// so their input is not lost.
  pub fn fail(&mut self, reason: &str) -> Result<()> {
    self.pending.take().ok_or(Error::NothingPending)?;
    self.notify(NoticeLevel::Error, format!("Failed to get response: {reason}"));
    Ok(())
  }

  /// Drop the placeholder after the caller abandoned the exchange.
  pub fn cancel(&mut self) -> Result<()> {
    self.pending.take().ok_or(Error::NothingPending)?;
    self.notify(NoticeLevel::Info, "Response cancelled");
    Ok(())
  }

  // ── Helpers ───────────────────────────────────────────────────────────

  fn ensure_idle(&self) -> Result<()> {
    if self.is_busy() { Err(Error::SubmitInFlight) } else { Ok(()) }
  }

  fn provisional(&mut self, role: Role, content: String, metadata: Metadata) -> Message {
    let id = self.next_provisional;
    self.next_provisional -= 1;
    Message {
      id,
      conversation_id: self.current,
      role,
      content,
      created_at: Utc::now(),
      metadata,
    }
  }

  fn annotate(&mut self, key: &str, value: serde_json::Result<Value>) {
    let Some(pending) = &mut self.pending else { return };
    match value {
      Ok(value) => {
        pending.placeholder.metadata.insert(key.to_string(), value);
      }
      Err(e) => tracing::warn!("could not record {key} on placeholder: {e}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use serde_json::json;

  use super::*;
  use crate::settings::{QueryMode, SETTINGS_KEY};

  fn ts(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn conversation(id: ConversationId, updated: i64) -> Conversation {
    Conversation {
      id,
      user_id: None,
      title: Some(format!("chat {id}")),
      created_at: ts(0),
      updated_at: ts(updated),
      metadata: Metadata::new(),
      message_count: None,
    }
  }

  fn persisted(id: MessageId, role: Role, content: &str) -> Message {
    Message {
      id,
      conversation_id: Some(9),
      role,
      content: content.into(),
      created_at: ts(10),
      metadata: Metadata::new(),
    }
  }

  fn pdf() -> FileMetadata {
    FileMetadata {
      name:         "report.pdf".into(),
      content_type: "application/pdf".into(),
      size:         Some(2048),
    }
  }

  // ─── Submission ──────────────────────────────────────────────────────────

  #[test]
  fn submit_inserts_user_message_and_placeholder_synchronously() {
    let mut state = ChatState::default();
    let request = state.begin_submit("  hello  ", vec![]).unwrap();

    assert_eq!(request.query, "hello");
    assert_eq!(request.conversation_id, None);
    assert!(state.is_busy());

    let [user] = state.messages() else { panic!("expected one message") };
    assert_eq!(user.role, Role::User);
    assert_eq!(user.content, "hello");
    assert!(user.is_provisional());

    let placeholder = state.streaming_message().unwrap();
    assert_eq!(placeholder.role, Role::Assistant);
    assert!(placeholder.content.is_empty());
    assert_ne!(placeholder.id, user.id);
  }

  #[test]
  fn empty_query_is_rejected_without_side_effects() {
    let mut state = ChatState::default();
    assert!(matches!(state.begin_submit("   ", vec![]), Err(Error::EmptyQuery)));
    assert!(state.messages().is_empty());
    assert!(!state.is_busy());
  }

  #[test]
  fn second_submit_while_pending_is_refused() {
    let mut state = ChatState::default();
    state.begin_submit("first", vec![]).unwrap();
    assert!(matches!(
      state.begin_submit("second", vec![]),
      Err(Error::SubmitInFlight)
    ));
    assert_eq!(state.messages().len(), 1);
    assert!(matches!(state.new_chat(), Err(Error::SubmitInFlight)));
  }

  #[test]
  fn history_excludes_the_new_query_and_keeps_three_turns() {
    let mut state = ChatState::default();
    state.set_conversations(vec![conversation(9, 0)]);
    state
      .open_conversation(9, vec![
        persisted(1, Role::User, "a"),
        persisted(2, Role::Assistant, "b"),
        persisted(3, Role::User, "c"),
        persisted(4, Role::Assistant, "d"),
      ])
      .unwrap();

    let request = state.begin_submit("e", vec![]).unwrap();
    let history: Vec<_> = request
      .conversation_history
      .iter()
      .map(|h| h.content.as_str())
      .collect();
    assert_eq!(history, ["b", "c", "d"]);
    assert_eq!(request.conversation_id, Some(9));
  }

  #[test]
  fn attachments_are_recorded_and_force_bypass() {
    let mut state = ChatState::default();
    state
      .set_settings(QuerySettings { mode: QueryMode::Mix, ..Default::default() })
      .unwrap();
    let request = state.begin_submit("what is this", vec![pdf()]).unwrap();

    assert_eq!(request.mode, QueryMode::Bypass);
    assert_eq!(state.messages()[0].files(), vec![pdf()]);
    // The configured mode itself is untouched.
    assert_eq!(state.settings().mode, QueryMode::Mix);
  }

  // ─── Progress ────────────────────────────────────────────────────────────

  #[test]
  fn content_is_replaced_not_appended() {
    let mut state = ChatState::default();
    state.begin_submit("q", vec![]).unwrap();
    state.apply_content("Hi");
    state.apply_content("Hi there");
    assert_eq!(state.streaming_message().unwrap().content, "Hi there");
  }

  #[test]
  fn adoption_is_first_write_wins() {
    let mut state = ChatState::default();
    state.begin_submit("q", vec![]).unwrap();

    assert!(state.adopt_conversation(42));
    assert!(!state.adopt_conversation(99));

    assert_eq!(state.current_conversation_id(), Some(42));
    assert_eq!(state.messages()[0].conversation_id, Some(42));
    assert_eq!(state.streaming_message().unwrap().conversation_id, Some(42));
  }

  #[test]
  fn open_conversation_never_adopts_another_id() {
    let mut state = ChatState::default();
    state.set_conversations(vec![conversation(9, 0)]);
    state.open_conversation(9, vec![]).unwrap();
    state.begin_submit("q", vec![]).unwrap();

    assert!(!state.adopt_conversation(10));
    assert_eq!(state.current_conversation_id(), Some(9));
  }

  #[test]
  fn references_and_filters_land_on_the_placeholder() {
    let mut state = ChatState::default();
    state.begin_submit("q", vec![]).unwrap();
    state.apply_references(&[Reference {
      reference_id: "r1".into(),
      file_path:    "sop/leave.pdf".into(),
    }]);
    state.apply_inferred_filters(&["KEPEGAWAIAN".to_string()]);

    let metadata = &state.streaming_message().unwrap().metadata;
    assert_eq!(
      metadata[REFERENCES_KEY],
      json!([{ "reference_id": "r1", "file_path": "sop/leave.pdf" }])
    );
    assert_eq!(metadata[INFERRED_FILTERS_KEY], json!(["KEPEGAWAIAN"]));
  }

  // ─── Completion ──────────────────────────────────────────────────────────

  #[test]
  fn completion_finalizes_the_placeholder() {
    let mut state = ChatState::default();
    state.begin_submit("hello", vec![]).unwrap();
    state.adopt_conversation(42);
    state.apply_content("Hi there");

    let completion = state.complete().unwrap();
    assert_eq!(completion.conversation_id, Some(42));
    assert!(completion.adopted);
    assert!(!state.is_busy());
    assert!(state.streaming_message().is_none());

    let [user, assistant] = state.messages() else { panic!("expected two messages") };
    assert_eq!(user.content, "hello");
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.content, "Hi there");
    assert_eq!(assistant.conversation_id, Some(42));
    assert_eq!(assistant.id, completion.message_id);
  }

  #[test]
  fn completion_snapshot_forces_bypass_for_attachments() {
    let mut state = ChatState::default();
    state
      .set_settings(QuerySettings { mode: QueryMode::Local, ..Default::default() })
      .unwrap();
    state.begin_submit("describe", vec![pdf()]).unwrap();
    let completion = state.complete().unwrap();
    assert_eq!(completion.settings.mode, QueryMode::Bypass);
  }

  #[test]
  fn completion_moves_conversation_to_top() {
    let mut state = ChatState::default();
    state.set_conversations(vec![conversation(1, 500), conversation(9, 100)]);
    state.open_conversation(9, vec![]).unwrap();
    state.begin_submit("q", vec![]).unwrap();
    state.complete().unwrap();

    assert_eq!(state.conversations()[0].id, 9);
    assert!(state.conversations()[0].updated_at > ts(500));
  }

  #[test]
  fn completing_without_pending_exchange_errors() {
    let mut state = ChatState::default();
    assert!(matches!(state.complete(), Err(Error::NothingPending)));
    assert!(matches!(state.fail("x"), Err(Error::NothingPending)));
  }

  #[test]
  fn empty_answer_is_a_valid_completion() {
    let mut state = ChatState::default();
    state.begin_submit("q", vec![]).unwrap();
    let completion = state.complete().unwrap();
    assert_eq!(completion.conversation_id, None);
    assert_eq!(state.messages()[1].content, "");
  }

  // ─── Failure and cancellation ────────────────────────────────────────────

  #[test]
  fn failure_keeps_user_message_and_raises_error_notice() {
    let mut state = ChatState::default();
    state.begin_submit("hello", vec![]).unwrap();
    state.apply_content("partial");
    state.fail("boom").unwrap();

    assert!(!state.is_busy());
    let [user] = state.messages() else { panic!("expected only the user message") };
    assert_eq!(user.content, "hello");

    let notices = state.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert!(notices[0].text.contains("boom"));
    assert!(state.drain_notices().is_empty());
  }

  #[test]
  fn cancel_discards_placeholder_quietly() {
    let mut state = ChatState::default();
    state.begin_submit("hello", vec![]).unwrap();
    state.cancel().unwrap();
    assert_eq!(state.messages().len(), 1);
    assert_eq!(state.drain_notices()[0].level, NoticeLevel::Info);
    // The surface is free again.
    assert!(state.begin_submit("again", vec![]).is_ok());
  }

  // ─── Conversation list ───────────────────────────────────────────────────

  #[test]
  fn upsert_replaces_existing_or_prepends() {
    let mut state = ChatState::default();
    state.set_conversations(vec![conversation(1, 0), conversation(2, 0)]);

    let mut renamed = conversation(2, 5);
    renamed.title = Some("renamed".into());
    state.upsert_conversation(renamed);
    assert_eq!(state.conversations().len(), 2);
    assert_eq!(state.conversations()[1].title.as_deref(), Some("renamed"));

    state.upsert_conversation(conversation(3, 0));
    let ids: Vec<_> = state.conversations().iter().map(|c| c.id).collect();
    assert_eq!(ids, [3, 1, 2]);
  }

  #[test]
  fn removing_open_conversation_selects_next() {
    let mut state = ChatState::default();
    state.set_conversations(vec![conversation(1, 0), conversation(2, 0)]);
    state.open_conversation(1, vec![persisted(1, Role::User, "x")]).unwrap();

    assert_eq!(state.remove_conversation(1), Some(Some(2)));
    assert_eq!(state.current_conversation_id(), None);
    assert!(state.messages().is_empty());

    assert_eq!(state.remove_conversation(2), None);
    assert!(state.conversations().is_empty());
  }

  #[test]
  fn removing_last_open_conversation_selects_nothing() {
    let mut state = ChatState::default();
    state.set_conversations(vec![conversation(1, 0)]);
    state.open_conversation(1, vec![]).unwrap();
    assert_eq!(state.remove_conversation(1), Some(None));
  }

  #[test]
  fn opening_restores_stored_settings() {
    let mut stored = conversation(5, 0);
    stored
      .metadata
      .insert(SETTINGS_KEY.into(), json!({ "mode": "naive", "global_k": 20 }));

    let mut state = ChatState::default();
    state.set_conversations(vec![stored, conversation(6, 0)]);
    state.open_conversation(5, vec![]).unwrap();
    assert_eq!(state.settings().mode, QueryMode::Naive);
    assert_eq!(state.settings().global_k, 20);

    // A conversation without stored settings keeps the current ones.
    state.open_conversation(6, vec![]).unwrap();
    assert_eq!(state.settings().mode, QueryMode::Naive);

    state.new_chat().unwrap();
    assert_eq!(state.settings(), &QuerySettings::default());
  }

  #[test]
  fn replace_messages_only_applies_to_the_open_idle_conversation() {
    let mut state = ChatState::default();
    state.begin_submit("q", vec![]).unwrap();
    state.adopt_conversation(42);
    state.apply_content("a");
    assert_eq!(state.replace_messages(42, vec![]), 0);

    state.complete().unwrap();
    assert_eq!(state.replace_messages(7, vec![]), 0);

    let authoritative = vec![persisted(100, Role::User, "q"), persisted(101, Role::Assistant, "a")];
    assert_eq!(state.replace_messages(42, authoritative), 2);
    let ids: Vec<_> = state.messages().iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![100, 101]);
  }

  #[test]
  fn replace_messages_keeps_the_exchange_when_the_page_stops_short() {
    let mut state = ChatState::default();
    let old: Vec<_> = (1..=3)
      .map(|i| persisted(i, Role::User, &format!("old {i}")))
      .collect();
    state.open_conversation(9, old.clone()).unwrap();
    state.begin_submit("new", vec![]).unwrap();
    state.apply_content("answer");
    state.complete().unwrap();

    // A first page that ends before the new exchange.
    assert_eq!(state.replace_messages(9, old[..2].to_vec()), 0);

    let contents: Vec<_> = state.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["old 1", "old 2", "old 3", "new", "answer"]);
    assert!(state.messages()[3..].iter().all(Message::is_provisional));
  }

  #[test]
  fn replace_messages_keeps_local_references() {
    let mut state = ChatState::default();
    state.open_conversation(9, vec![]).unwrap();
    state.begin_submit("q", vec![]).unwrap();
    state.apply_content("a");
    state.apply_references(&[]);
    state.complete().unwrap();

    let fetched = vec![persisted(100, Role::User, "q"), persisted(101, Role::Assistant, "a")];
    assert_eq!(state.replace_messages(9, fetched), 2);

    let answer = &state.messages()[1];
    assert_eq!(answer.id, 101);
    assert_eq!(answer.metadata[REFERENCES_KEY], json!([]));
  }

  #[test]
  fn invalid_settings_are_rejected() {
    let mut state = ChatState::default();
    let bad = QuerySettings { local_k: 0, ..Default::default() };
    assert!(state.set_settings(bad).is_err());
    assert_eq!(state.settings(), &QuerySettings::default());
  }

  #[test]
  fn touch_ignores_unknown_conversations() {
    let mut state = ChatState::default();
    state.set_conversations(vec![conversation(1, 0)]);
    state.touch_conversation(2, ts(0) + Duration::seconds(5));
    assert_eq!(state.conversations()[0].updated_at, ts(0));
  }
}
