//! The streaming query session.
//!
//! A session takes one [`SessionRequest`] through
//! `Idle → Sending → Streaming → {Completed, Failed, Cancelled}`:
//!
//! | From        | To          | When |
//! |-------------|-------------|------|
//! | `Idle`      | `Sending`   | `run` starts |
//! | `Sending`   | `Streaming` | the first bytes arrive, or the body ends empty |
//! | `Sending`   | `Failed`    | the transport fails |
//! | `Streaming` | `Completed` | the body ends without an error event |
//! | `Streaming` | `Failed`    | an error event, a read failure, or a timeout |
//! | any live    | `Cancelled` | the cancellation token fires |
//!
//! The idle timeout counts from the last bytes read, so keep-alive lines
//! and skipped malformed lines keep a session alive even though they never
//! become events.
//!
//! Observer callbacks run inline, in stream order. After `Failed` only
//! `on_error` has been called; after `Completed` only `on_complete`; after
//! `Cancelled` neither.
//!
//! The controller does not prevent two sessions from running at once for
//! the same conversation. Callers must not start a second session while one
//! is live; [`ChatSurface`](crate::ChatSurface) holds that line by taking
//! `&mut self` and [`ChatState`](ragline_core::reconcile::ChatState) refuses
//! a second pending submission.

use std::{pin::pin, sync::Arc, time::Duration};

use futures::StreamExt;
use ragline_core::{
  conversation::ConversationId,
  event::{Reference, StreamEvent},
  query::{HistoryEntry, QueryRequest},
  settings::{QueryMode, QuerySettings},
};
use ragline_stream::{StreamError, demux};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::{Attachment, ClientError, QueryTransport};

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Idle,
  Sending,
  Streaming,
  Completed,
  Failed,
  Cancelled,
}

impl SessionState {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Why a session failed. Every variant aborts the session.
#[derive(Debug, Error)]
pub enum SessionError {
  /// The request never produced a usable response.
  #[error(transparent)]
  Transport(#[from] ClientError),

  /// The connection broke while streaming.
  #[error("stream interrupted: {0}")]
  Read(#[from] StreamError),

  /// The backend reported an error in the stream.
  #[error("{0}")]
  Backend(String),

  #[error("no data from the backend for {}s", .0.as_secs())]
  IdleTimeout(Duration),

  #[error("response not finished within {}s", .0.as_secs())]
  TotalTimeout(Duration),
}

// ─── Observer ────────────────────────────────────────────────────────────────

/// Incremental news from a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress<'a> {
  /// The backend named the conversation. Reported once per session, for the
  /// first id seen.
  ConversationAssigned(ConversationId),
  /// A new fragment, plus everything received so far including it.
  Content {
    delta:       &'a str,
    accumulated: &'a str,
  },
  References(&'a [Reference]),
  InferredFilters(&'a [String]),
}

/// Receives a session's callbacks, in stream order.
pub trait SessionObserver: Send {
  fn on_progress(&mut self, progress: Progress<'_>);

  /// Called at most once, and never together with `on_complete`.
  fn on_error(&mut self, error: &SessionError);

  /// Called at most once, after the body ended without an error.
  fn on_complete(&mut self);

  fn on_state(&mut self, _from: SessionState, _to: SessionState) {}
}

impl<O: SessionObserver + ?Sized> SessionObserver for &mut O {
  fn on_progress(&mut self, progress: Progress<'_>) { (**self).on_progress(progress) }

  fn on_error(&mut self, error: &SessionError) { (**self).on_error(error) }

  fn on_complete(&mut self) { (**self).on_complete() }

  fn on_state(&mut self, from: SessionState, to: SessionState) { (**self).on_state(from, to) }
}

/// Ignores everything.
impl SessionObserver for () {
  fn on_progress(&mut self, _: Progress<'_>) {}

  fn on_error(&mut self, _: &SessionError) {}

  fn on_complete(&mut self) {}
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// Everything one session sends.
#[derive(Debug, Clone)]
pub struct SessionRequest {
  pub payload:     QueryRequest,
  pub attachments: Vec<Attachment>,
}

impl SessionRequest {
  /// Build the payload from the user's input and the chat's settings.
  /// Attachments force bypass mode.
  pub fn new(
    query: impl Into<String>,
    settings: &QuerySettings,
    conversation_id: Option<ConversationId>,
    history: Vec<HistoryEntry>,
    attachments: Vec<Attachment>,
  ) -> Self {
    let payload = QueryRequest::build(
      query,
      settings,
      conversation_id,
      history,
      !attachments.is_empty(),
    );
    Self { payload, attachments }
  }

  /// Wrap an already-built payload, forcing bypass mode if there are
  /// attachments.
  pub fn from_payload(mut payload: QueryRequest, attachments: Vec<Attachment>) -> Self {
    if !attachments.is_empty() {
      payload.mode = QueryMode::Bypass;
    }
    Self { payload, attachments }
  }
}

// ─── Timeouts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTimeouts {
  /// Longest wait for the next bytes of the body.
  pub idle:  Option<Duration>,
  /// Longest the whole session may take.
  pub total: Option<Duration>,
}

// ─── Controller ──────────────────────────────────────────────────────────────

/// Runs query sessions over a [`QueryTransport`].
///
/// Holds no per-session state; one controller can serve any number of
/// sessions, concurrently or not.
pub struct SessionController<T> {
  transport: Arc<T>,
  timeouts:  SessionTimeouts,
}

impl<T> Clone for SessionController<T> {
  fn clone(&self) -> Self {
    Self { transport: Arc::clone(&self.transport), timeouts: self.timeouts }
  }
}

impl<T: QueryTransport + 'static> SessionController<T> {
  pub fn new(transport: Arc<T>, timeouts: SessionTimeouts) -> Self {
    Self { transport, timeouts }
  }

  pub fn timeouts(&self) -> SessionTimeouts { self.timeouts }

  /// Run one session to a terminal state, reporting to `observer`.
  ///
  /// Returns the terminal state. The answer itself has already been
  /// delivered through the observer by then.
  pub async fn run<O: SessionObserver>(
    &self,
    request: &SessionRequest,
    observer: &mut O,
    cancel: &CancellationToken,
  ) -> SessionState {
    let span = tracing::info_span!(
      "session",
      id = %Uuid::new_v4(),
      conversation_id = ?request.payload.conversation_id,
    );
    let mut machine = Machine { state: SessionState::Idle, observer };
    self
      .drive(request, &mut machine, cancel)
      .instrument(span)
      .await
  }

  /// Run a session on its own task. The observer is handed back by
  /// [`SessionHandle::join`].
  pub fn spawn<O: SessionObserver + 'static>(
    &self,
    request: SessionRequest,
    mut observer: O,
  ) -> SessionHandle<O> {
    let cancel = CancellationToken::new();
    let controller = self.clone();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
      let state = controller.run(&request, &mut observer, &token).await;
      (state, observer)
    });
    SessionHandle { cancel, task }
  }

  async fn drive<O: SessionObserver>(
    &self,
    request: &SessionRequest,
    machine: &mut Machine<'_, O>,
    cancel: &CancellationToken,
  ) -> SessionState {
    tracing::info!(
      mode = %request.payload.mode,
      attachments = request.attachments.len(),
      "session started"
    );
    let deadline = self.timeouts.total.map(|limit| (Instant::now() + limit, limit));
    machine.transition(SessionState::Sending);

    let opened = tokio::select! {
      biased;
      _ = cancel.cancelled() => return machine.cancel(),
      limit = deadline_passed(deadline) => {
        return machine.fail(SessionError::TotalTimeout(limit));
      }
      opened = self.transport.send(&request.payload, &request.attachments) => opened,
    };
    let body = match opened {
      Ok(body) => body,
      Err(e) => return machine.fail(e.into()),
    };

    // Every read, whether or not it completes an event, bumps `last_read`.
    let (reads, mut last_read) = watch::channel(Instant::now());
    let body = body.inspect(move |_| {
      reads.send_replace(Instant::now());
    });
    let mut events = pin!(demux(body));
    let mut fold = Fold::default();

    loop {
      let since = *last_read.borrow_and_update();
      let next = tokio::select! {
        biased;
        _ = cancel.cancelled() => return machine.cancel(),
        limit = deadline_passed(deadline) => {
          return machine.fail(SessionError::TotalTimeout(limit));
        }
        next = events.next() => next,
        Ok(()) = last_read.changed() => {
          machine.mark_streaming();
          continue;
        }
        limit = idle_elapsed(since, self.timeouts.idle) => {
          return machine.fail(SessionError::IdleTimeout(limit));
        }
      };
      let event = match next {
        None => break,
        Some(Err(e)) => return machine.fail(e.into()),
        Some(Ok(event)) => event,
      };
      machine.mark_streaming();
      if let Err(e) = fold.apply(event, &mut *machine.observer) {
        return machine.fail(e);
      }
    }

    machine.mark_streaming();
    machine.complete(&fold)
  }
}

/// Handle to a session started with [`SessionController::spawn`].
pub struct SessionHandle<O> {
  cancel: CancellationToken,
  task:   JoinHandle<(SessionState, O)>,
}

impl<O> SessionHandle<O> {
  /// Abandon the session. It ends in `Cancelled` unless it already ended.
  pub fn cancel(&self) { self.cancel.cancel() }

  pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }

  /// Wait for the session to end.
  pub async fn join(self) -> Result<(SessionState, O), tokio::task::JoinError> {
    self.task.await
  }
}

// ─── Internals ───────────────────────────────────────────────────────────────

/// Tracks the state and reports transitions.
struct Machine<'o, O> {
  state:    SessionState,
  observer: &'o mut O,
}

impl<O: SessionObserver> Machine<'_, O> {
  fn transition(&mut self, to: SessionState) {
    let from = self.state;
    tracing::debug!(?from, ?to, "session transition");
    self.state = to;
    self.observer.on_state(from, to);
  }

  fn mark_streaming(&mut self) {
    if self.state == SessionState::Sending {
      self.transition(SessionState::Streaming);
    }
  }

  fn fail(&mut self, error: SessionError) -> SessionState {
    tracing::error!("session failed: {error}");
    self.transition(SessionState::Failed);
    self.observer.on_error(&error);
    SessionState::Failed
  }

  fn cancel(&mut self) -> SessionState {
    tracing::info!("session cancelled");
    self.transition(SessionState::Cancelled);
    SessionState::Cancelled
  }

  fn complete(&mut self, fold: &Fold) -> SessionState {
    tracing::info!(
      conversation_id = ?fold.conversation_id,
      chars = fold.accumulated.chars().count(),
      "session completed"
    );
    self.transition(SessionState::Completed);
    self.observer.on_complete();
    SessionState::Completed
  }
}

/// Running result of one session.
#[derive(Debug, Default)]
struct Fold {
  conversation_id: Option<ConversationId>,
  accumulated:     String,
}

impl Fold {
  fn apply<O: SessionObserver>(
    &mut self,
    event: StreamEvent,
    observer: &mut O,
  ) -> Result<(), SessionError> {
    tracing::debug!(?event, "stream event");
    match event {
      StreamEvent::ConversationAssigned(id) => match self.conversation_id {
        None => {
          self.conversation_id = Some(id);
          observer.on_progress(Progress::ConversationAssigned(id));
        }
        Some(first) if first != id => {
          tracing::warn!(first, ignored = id, "backend sent a second conversation id");
        }
        Some(_) => {}
      },
      StreamEvent::Delta(delta) => {
        self.accumulated.push_str(&delta);
        observer.on_progress(Progress::Content {
          delta:       &delta,
          accumulated: &self.accumulated,
        });
      }
      StreamEvent::References(references) => {
        observer.on_progress(Progress::References(&references));
      }
      StreamEvent::InferredFilters(filters) => {
        observer.on_progress(Progress::InferredFilters(&filters));
      }
      StreamEvent::Error(message) => return Err(SessionError::Backend(message)),
    }
    Ok(())
  }
}

/// Resolves once the total deadline has passed, yielding the limit.
/// Never resolves without a deadline.
async fn deadline_passed(deadline: Option<(Instant, Duration)>) -> Duration {
  match deadline {
    Some((at, limit)) => {
      tokio::time::sleep_until(at).await;
      limit
    }
    None => std::future::pending().await,
  }
}

/// Resolves once `idle` has passed since `last_read`, yielding the limit.
/// Never resolves without an idle limit.
async fn idle_elapsed(last_read: Instant, idle: Option<Duration>) -> Duration {
  match idle {
    Some(limit) => {
      tokio::time::sleep_until(last_read + limit).await;
      limit
    }
    None => std::future::pending().await,
  }
}
