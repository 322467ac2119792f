//! Core types and trait definitions for the ragline chat client.
//!
//! This crate has no HTTP dependencies. It holds the conversation model,
//! query settings, the wire event shape, the conversation CRUD capability
//! trait and the chat-state reconciler. The stream codec and the HTTP client
//! build on top of it.

pub mod api;
pub mod conversation;
pub mod error;
pub mod event;
pub mod query;
pub mod reconcile;
pub mod settings;

pub use error::{Error, Result};
