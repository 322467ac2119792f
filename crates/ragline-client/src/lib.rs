//! HTTP client and streaming query session for the ragline RAG backend.
//!
//! - [`ApiClient`] talks to the backend: conversation CRUD through
//!   [`ConversationApi`](ragline_core::api::ConversationApi) and streaming
//!   queries through [`QueryTransport`].
//! - [`SessionController`] drives one query from request to completion and
//!   reports progress through a [`SessionObserver`].
//! - [`ChatSurface`] binds sessions to a caller-owned
//!   [`ChatState`](ragline_core::reconcile::ChatState) and performs the
//!   follow-up calls once an answer has arrived.

mod client;
mod config;
mod error;

pub mod chat;
pub mod session;
pub mod transport;

pub use chat::ChatSurface;
pub use client::ApiClient;
pub use config::{API_KEY_HEADER, ClientConfig, USER_ID_HEADER};
pub use error::{ChatError, ClientError, Result};
pub use session::{
  Progress, SessionController, SessionError, SessionHandle, SessionObserver,
  SessionRequest, SessionState, SessionTimeouts,
};
pub use transport::{Attachment, ByteStream, QueryTransport};

#[cfg(test)]
mod tests;
