//! `ChatSurface`: one chat window's worth of state and behaviour.
//!
//! Owns a [`ChatState`] and drives sessions into it. The surface is the
//! caller-side half of the session contract: it holds `&mut self` for the
//! whole of [`ChatSurface::submit`], so a surface never runs two sessions
//! at once, and it performs the follow-up calls after an answer arrives.
//!
//! Follow-up failures (fetching a new conversation, saving settings,
//! re-reading messages) do not fail the exchange. They are logged and
//! queued as warning notices.

use std::{fmt::Display, sync::Arc};

use ragline_core::{
  api::{ConversationApi, Page},
  conversation::{ConversationId, ConversationPatch},
  reconcile::{ChatState, Completion, NoticeLevel},
  settings::QuerySettings,
};
use tokio_util::sync::CancellationToken;

use crate::{
  Attachment, ChatError, QueryTransport,
  session::{
    Progress, SessionController, SessionError, SessionObserver, SessionRequest,
    SessionState,
  },
};

pub struct ChatSurface<A, T> {
  state:      ChatState,
  api:        Arc<A>,
  controller: SessionController<T>,
}

impl<A, T> ChatSurface<A, T>
where
  A: ConversationApi,
  T: QueryTransport + 'static,
{
  pub fn new(
    api: Arc<A>,
    controller: SessionController<T>,
    default_settings: QuerySettings,
  ) -> Self {
    Self { state: ChatState::new(default_settings), api, controller }
  }

  pub fn state(&self) -> &ChatState { &self.state }

  pub fn state_mut(&mut self) -> &mut ChatState { &mut self.state }

  pub fn api(&self) -> &A { &self.api }

  // ── Conversation list ─────────────────────────────────────────────────────

  /// Fetch the conversation list.
  pub async fn load_conversations(&mut self) -> Result<(), ChatError> {
    match self.api.list_conversations(Page::CONVERSATIONS).await {
      Ok(conversations) => {
        self.state.set_conversations(conversations);
        Ok(())
      }
      Err(e) => Err(self.failed("Failed to load conversations", e)),
    }
  }

  /// Load a conversation's messages and make it the open one.
  ///
  /// A conversation missing from the loaded list is fetched first, so the
  /// settings stored on it are restored like any other.
  pub async fn open(&mut self, id: ConversationId) -> Result<(), ChatError> {
    if self.state.is_busy() {
      return Err(ragline_core::Error::SubmitInFlight.into());
    }
    let messages = match self.api.list_messages(id, Page::MESSAGES).await {
      Ok(messages) => messages,
      Err(e) => return Err(self.failed("Failed to load messages", e)),
    };
    if !self.state.conversations().iter().any(|c| c.id == id) {
      self.refresh_conversation(id).await;
    }
    Ok(self.state.open_conversation(id, messages)?)
  }

  /// Delete a conversation. If it was open, the next one in the list is
  /// opened instead (or a new chat if none is left).
  pub async fn delete(&mut self, id: ConversationId) -> Result<(), ChatError> {
    if let Err(e) = self.api.delete_conversation(id).await {
      return Err(self.failed("Failed to delete conversation", e));
    }
    let next = self.state.remove_conversation(id);
    self.state.notify(NoticeLevel::Info, "Conversation deleted");
    match next {
      Some(Some(next)) => self.open(next).await,
      Some(None) => Ok(self.state.new_chat()?),
      None => Ok(()),
    }
  }

  pub fn new_chat(&mut self) -> Result<(), ChatError> { Ok(self.state.new_chat()?) }

  // ── Exchange ──────────────────────────────────────────────────────────────

  /// Send `text` (and any attachments) and stream the answer into the chat
  /// state. `view` sees the same callbacks after the state has been updated.
  ///
  /// Returns the session's terminal state. Only a rejected submission (empty
  /// text, or one already in flight) is an error; session failures end up
  /// as notices on the state.
  pub async fn submit<V: SessionObserver>(
    &mut self,
    text: &str,
    attachments: Vec<Attachment>,
    view: &mut V,
    cancel: &CancellationToken,
  ) -> Result<SessionState, ChatError> {
    let files = attachments.iter().map(Attachment::metadata).collect();
    let payload = self.state.begin_submit(text, files)?;
    let request = SessionRequest::from_payload(payload, attachments);

    let mut reconciler = Reconciler {
      state: &mut self.state,
      view,
      adopted: None,
      completion: None,
    };
    let outcome = self.controller.run(&request, &mut reconciler, cancel).await;
    let Reconciler { adopted, completion, .. } = reconciler;

    if outcome == SessionState::Cancelled
      && let Err(e) = self.state.cancel()
    {
      tracing::warn!("cancelled session left no placeholder: {e}");
    }

    match completion {
      Some(completion) => self.after_completion(completion).await,
      // The backend created the conversation before giving up; list it.
      None => {
        if let Some(id) = adopted {
          self.refresh_conversation(id).await;
        }
      }
    }
    Ok(outcome)
  }

  async fn after_completion(&mut self, completion: Completion) {
    let Some(id) = completion.conversation_id else {
      tracing::debug!("completed without a conversation id; nothing to reconcile");
      return;
    };
    if completion.adopted {
      self.refresh_conversation(id).await;
    }
    self.persist_settings(id, &completion.settings).await;
    self.resync_messages(id).await;
  }

  async fn refresh_conversation(&mut self, id: ConversationId) {
    match self.api.get_conversation(id).await {
      Ok(conversation) => self.state.upsert_conversation(conversation),
      Err(e) => self.reconciliation_failed("Failed to fetch conversation", e),
    }
  }

  /// Merge the settings snapshot into the conversation's metadata.
  async fn persist_settings(&mut self, id: ConversationId, settings: &QuerySettings) {
    let mut metadata = self
      .state
      .conversations()
      .iter()
      .find(|c| c.id == id)
      .map(|c| c.metadata.clone())
      .unwrap_or_default();
    if let Err(e) = settings.merge_into(&mut metadata) {
      self.reconciliation_failed("Failed to save settings", e);
      return;
    }
    let patch = ConversationPatch { title: None, metadata: Some(metadata) };
    match self.api.update_conversation(id, patch).await {
      Ok(updated) => self.state.upsert_conversation(updated),
      Err(e) => self.reconciliation_failed("Failed to save settings", e),
    }
  }

  /// Replace provisional message ids with the backend's. When the fetch
  /// fails, or its page does not reach this exchange, the provisional ids
  /// stay until the conversation is next opened.
  async fn resync_messages(&mut self, id: ConversationId) {
    match self.api.list_messages(id, Page::MESSAGES).await {
      Ok(messages) if messages.is_empty() => {
        tracing::debug!(id, "backend returned no messages; keeping provisional ids");
      }
      Ok(messages) => {
        let replaced = self.state.replace_messages(id, messages);
        tracing::debug!(id, replaced, "resynced messages");
      }
      Err(e) => self.reconciliation_failed("Failed to refresh messages", e),
    }
  }

  fn reconciliation_failed(&mut self, what: &str, error: impl Display) {
    tracing::warn!("{what}: {error}");
    self.state.notify(NoticeLevel::Warning, format!("{what}: {error}"));
  }

  fn failed(&mut self, what: &str, error: A::Error) -> ChatError {
    tracing::error!("{what}: {error}");
    self.state.notify(NoticeLevel::Error, format!("{what}: {error}"));
    ChatError::Api(Box::new(error))
  }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Folds session callbacks into the chat state, then forwards them.
struct Reconciler<'a, V> {
  state:      &'a mut ChatState,
  view:       &'a mut V,
  adopted:    Option<ConversationId>,
  completion: Option<Completion>,
}

impl<V: SessionObserver> SessionObserver for Reconciler<'_, V> {
  fn on_progress(&mut self, progress: Progress<'_>) {
    match progress {
      Progress::ConversationAssigned(id) => {
        if self.state.adopt_conversation(id) {
          self.adopted = Some(id);
        }
      }
      Progress::Content { accumulated, .. } => self.state.apply_content(accumulated),
      Progress::References(references) => self.state.apply_references(references),
      Progress::InferredFilters(filters) => self.state.apply_inferred_filters(filters),
    }
    self.view.on_progress(progress);
  }

  fn on_error(&mut self, error: &SessionError) {
    if let Err(e) = self.state.fail(&error.to_string()) {
      tracing::warn!("failed session left no placeholder: {e}");
    }
    self.view.on_error(error);
  }

  fn on_complete(&mut self) {
    match self.state.complete() {
      Ok(completion) => self.completion = Some(completion),
      Err(e) => tracing::warn!("completed session left no placeholder: {e}"),
    }
    self.view.on_complete();
  }

  fn on_state(&mut self, from: SessionState, to: SessionState) {
    self.view.on_state(from, to);
  }
}
