//! Test doubles shared by the session, chat and HTTP suites.


use std::{
  collections::HashMap,
  io,
  sync::{Arc, Mutex},
  time::Duration,
};

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use futures::{StreamExt, stream};
use ragline_core::{
  api::{ConversationApi, Page},
  conversation::{
    Conversation, ConversationId, ConversationPatch, Message, MessageId,
    Metadata, NewConversation, NewMessage, Role,
  },
  event::Reference,
  query::QueryRequest,
};
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
  Attachment, ByteStream, ClientError, QueryTransport, Result,
  session::{Progress, SessionError, SessionObserver, SessionState},
};

pub(crate) fn ts(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

pub(crate) fn lines(lines: &[&str]) -> Vec<Vec<u8>> {
  lines.iter().map(|l| format!("{l}\n").into_bytes()).collect()
}

// ─── Scripted transport ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) enum Reply {
  /// Send these chunks, then end the body.
  Body(Vec<Vec<u8>>),
  /// Send these chunks, then keep the connection open forever.
  BodyThenHang(Vec<Vec<u8>>),
  /// Send these chunks, then drop the connection with an error.
  BodyThenReset(Vec<Vec<u8>>),
  /// Send each chunk after waiting the given interval, then end the body.
  Paced(Duration, Vec<Vec<u8>>),
  /// Answer with a non-success status.
  Status(StatusCode),
}

/// Replays the same [`Reply`] for every request and records what was sent.
pub(crate) struct ScriptedTransport {
  reply: Reply,
  seen:  Mutex<Vec<(QueryRequest, Vec<Attachment>)>>,
}

impl ScriptedTransport {
  pub(crate) fn new(reply: Reply) -> Arc<Self> {
    Arc::new(Self { reply, seen: Mutex::new(Vec::new()) })
  }

  pub(crate) fn seen(&self) -> Vec<(QueryRequest, Vec<Attachment>)> {
    self.seen.lock().unwrap().clone()
  }
}

fn chunk_stream(chunks: Vec<Vec<u8>>) -> stream::Iter<std::vec::IntoIter<io::Result<Bytes>>> {
  let items: Vec<io::Result<Bytes>> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
  stream::iter(items)
}

impl QueryTransport for ScriptedTransport {
  async fn send(&self, request: &QueryRequest, attachments: &[Attachment]) -> Result<ByteStream> {
    self
      .seen
      .lock()
      .unwrap()
      .push((request.clone(), attachments.to_vec()));

    match self.reply.clone() {
      Reply::Body(chunks) => Ok(chunk_stream(chunks).boxed()),
      Reply::BodyThenHang(chunks) => Ok(chunk_stream(chunks).chain(stream::pending()).boxed()),
      Reply::BodyThenReset(chunks) => {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        Ok(chunk_stream(chunks).chain(stream::iter([Err(reset)])).boxed())
      }
      Reply::Paced(interval, chunks) => Ok(
        chunk_stream(chunks)
          .then(move |chunk| async move {
            tokio::time::sleep(interval).await;
            chunk
          })
          .boxed(),
      ),
      Reply::Status(status) => Err(ClientError::Status {
        endpoint: "POST /query/stream".into(),
        status,
      }),
    }
  }
}

// ─── Recording observer ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct Recorder {
  pub ids:         Vec<ConversationId>,
  pub deltas:      Vec<String>,
  pub contents:    Vec<String>,
  pub references:  Vec<Reference>,
  pub filters:     Vec<String>,
  pub errors:      Vec<String>,
  pub completions: usize,
  pub transitions: Vec<(SessionState, SessionState)>,
  /// Fired on the first content update, to cancel mid-stream.
  pub cancel_on_content: Option<CancellationToken>,
}

impl SessionObserver for Recorder {
  fn on_progress(&mut self, progress: Progress<'_>) {
    match progress {
      Progress::ConversationAssigned(id) => self.ids.push(id),
      Progress::Content { delta, accumulated } => {
        self.deltas.push(delta.to_string());
        self.contents.push(accumulated.to_string());
        if let Some(token) = &self.cancel_on_content {
          token.cancel();
        }
      }
      Progress::References(refs) => self.references.extend_from_slice(refs),
      Progress::InferredFilters(filters) => self.filters.extend_from_slice(filters),
    }
  }

  fn on_error(&mut self, error: &SessionError) { self.errors.push(error.to_string()); }

  fn on_complete(&mut self) { self.completions += 1; }

  fn on_state(&mut self, from: SessionState, to: SessionState) {
    self.transitions.push((from, to));
  }
}

// ─── In-memory conversation API ──────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("mock api: {0}")]
pub(crate) struct MockError(String);

#[derive(Debug, Default)]
pub(crate) struct MockState {
  pub conversations: Vec<Conversation>,
  pub messages:      HashMap<ConversationId, Vec<Message>>,
  pub updates:       Vec<(ConversationId, ConversationPatch)>,
  pub deleted:       Vec<ConversationId>,
  pub calls:         Vec<String>,
  pub fail_get:      bool,
  pub fail_update:   bool,
  pub fail_list:     bool,
}

#[derive(Debug, Default)]
pub(crate) struct MockApi {
  pub state: Mutex<MockState>,
}

pub(crate) fn conversation(id: ConversationId, title: &str) -> Conversation {
  Conversation {
    id,
    user_id: Some(1),
    title: Some(title.into()),
    created_at: ts(1_000),
    updated_at: ts(1_000),
    metadata: Metadata::new(),
    message_count: None,
  }
}

pub(crate) fn message(id: MessageId, conversation_id: ConversationId, role: Role, content: &str) -> Message {
  Message {
    id,
    conversation_id: Some(conversation_id),
    role,
    content: content.into(),
    created_at: ts(2_000),
    metadata: Metadata::new(),
  }
}

impl MockApi {
  pub(crate) fn with(conversations: Vec<Conversation>) -> Arc<Self> {
    let api = Self::default();
    api.state.lock().unwrap().conversations = conversations;
    Arc::new(api)
  }

  pub(crate) fn calls(&self) -> Vec<String> { self.state.lock().unwrap().calls.clone() }

  fn record(&self, call: String) -> std::sync::MutexGuard<'_, MockState> {
    let mut state = self.state.lock().unwrap();
    state.calls.push(call);
    state
  }
}

impl ConversationApi for MockApi {
  type Error = MockError;

  async fn list_conversations(&self, page: Page) -> Result<Vec<Conversation>, MockError> {
    let state = self.record(format!("list_conversations {} {}", page.skip, page.limit));
    if state.fail_list {
      return Err(MockError("list unavailable".into()));
    }
    Ok(state.conversations.clone())
  }

  async fn create_conversation(&self, input: NewConversation) -> Result<Conversation, MockError> {
    let mut state = self.record("create_conversation".into());
    let id = state.conversations.iter().map(|c| c.id).max().unwrap_or(0) + 1;
    let mut created = conversation(id, input.title.as_deref().unwrap_or_default());
    created.title = input.title;
    created.metadata = input.metadata;
    state.conversations.insert(0, created.clone());
    Ok(created)
  }

  async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, MockError> {
    let state = self.record(format!("get_conversation {id}"));
    if state.fail_get {
      return Err(MockError("get unavailable".into()));
    }
    state
      .conversations
      .iter()
      .find(|c| c.id == id)
      .cloned()
      .ok_or_else(|| MockError(format!("conversation {id} not found")))
  }

  async fn update_conversation(
    &self,
    id: ConversationId,
    patch: ConversationPatch,
  ) -> Result<Conversation, MockError> {
    let mut state = self.record(format!("update_conversation {id}"));
    if state.fail_update {
      return Err(MockError("update unavailable".into()));
    }
    state.updates.push((id, patch.clone()));
    let conv = state
      .conversations
      .iter_mut()
      .find(|c| c.id == id)
      .ok_or_else(|| MockError(format!("conversation {id} not found")))?;
    if let Some(title) = patch.title {
      conv.title = Some(title);
    }
    if let Some(metadata) = patch.metadata {
      conv.metadata = metadata;
    }
    Ok(conv.clone())
  }

  async fn delete_conversation(&self, id: ConversationId) -> Result<(), MockError> {
    let mut state = self.record(format!("delete_conversation {id}"));
    state.conversations.retain(|c| c.id != id);
    state.deleted.push(id);
    Ok(())
  }

  async fn list_messages(
    &self,
    conversation_id: ConversationId,
    page: Page,
  ) -> Result<Vec<Message>, MockError> {
    let state = self.record(format!("list_messages {conversation_id}"));
    let stored = state.messages.get(&conversation_id).map(Vec::as_slice).unwrap_or_default();
    Ok(
      stored
        .iter()
        .skip(page.skip as usize)
        .take(page.limit as usize)
        .cloned()
        .collect(),
    )
  }

  async fn create_message(
    &self,
    conversation_id: ConversationId,
    input: NewMessage,
  ) -> Result<Message, MockError> {
    let mut state = self.record(format!("create_message {conversation_id}"));
    let list = state.messages.entry(conversation_id).or_default();
    let created = message(list.len() as i64 + 1, conversation_id, input.role, &input.content);
    list.push(created.clone());
    Ok(created)
  }

  async fn delete_message(
    &self,
    conversation_id: ConversationId,
    message_id: MessageId,
  ) -> Result<(), MockError> {
    let mut state = self.record(format!("delete_message {conversation_id} {message_id}"));
    if let Some(list) = state.messages.get_mut(&conversation_id) {
      list.retain(|m| m.id != message_id);
    }
    Ok(())
  }
}
