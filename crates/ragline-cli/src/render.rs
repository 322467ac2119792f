//! Terminal output: streamed answers, conversation lists, notices.

use std::io::Write;

use chrono::{DateTime, Local, Utc};
use ragline_client::{Progress, SessionError, SessionObserver, SessionState};
use ragline_core::{
  conversation::{Conversation, Message, Role},
  event::Reference,
  reconcile::{INFERRED_FILTERS_KEY, Notice, NoticeLevel, REFERENCES_KEY},
  settings::QuerySettings,
};

// ─── Streaming view ───────────────────────────────────────────────────────────

/// Prints an answer as it streams in, followed by its references.
///
/// Failures are not printed here; the chat surface reports them as notices.
pub struct TerminalView<W> {
  out:        W,
  references: Vec<Reference>,
  filters:    Vec<String>,
  mid_line:   bool,
}

impl<W: Write> TerminalView<W> {
  pub fn new(out: W) -> Self {
    Self { out, references: Vec::new(), filters: Vec::new(), mid_line: false }
  }

  #[cfg(test)]
  pub fn into_inner(self) -> W { self.out }

  fn end_line(&mut self) {
    if self.mid_line {
      writeln!(self.out).ok();
      self.mid_line = false;
    }
  }
}

impl<W: Write + Send> SessionObserver for TerminalView<W> {
  fn on_progress(&mut self, progress: Progress<'_>) {
    match progress {
      Progress::Content { delta, .. } => {
        if delta.is_empty() {
          return;
        }
        write!(self.out, "{delta}").ok();
        self.out.flush().ok();
        self.mid_line = !delta.ends_with('\n');
      }
      Progress::References(references) => self.references = references.to_vec(),
      Progress::InferredFilters(filters) => self.filters = filters.to_vec(),
      Progress::ConversationAssigned(id) => tracing::debug!(id, "answer bound to conversation"),
    }
  }

  fn on_error(&mut self, _: &SessionError) { self.end_line(); }

  fn on_complete(&mut self) {
    self.end_line();
    if !self.filters.is_empty() {
      writeln!(self.out, "  filters: {}", self.filters.join(", ")).ok();
    }
    for reference in &self.references {
      writeln!(self.out, "{}", reference_line(reference)).ok();
    }
    self.out.flush().ok();
  }

  fn on_state(&mut self, _: SessionState, to: SessionState) {
    if to == SessionState::Cancelled {
      self.end_line();
    }
  }
}

// ─── Formatting ───────────────────────────────────────────────────────────────

pub fn timestamp(at: DateTime<Utc>) -> String {
  at.with_timezone(&Local).format("%b %-d, %H:%M").to_string()
}

/// One row of the conversation list. `current` marks the open conversation.
pub fn conversation_line(conversation: &Conversation, current: bool) -> String {
  format!(
    "{} {:>6}  {:<14} {}",
    if current { '*' } else { ' ' },
    format!("#{}", conversation.id),
    timestamp(conversation.updated_at),
    conversation.display_title(),
  )
}

pub fn reference_line(reference: &Reference) -> String {
  format!("  [{}] {}", reference.reference_id, reference.file_path)
}

/// A stored message with its attachments and references.
pub fn message_block(message: &Message) -> String {
  let who = match message.role {
    Role::User => "you",
    Role::Assistant => "assistant",
    Role::System => "system",
  };
  let mut block = format!("{who} › {}", message.content);
  for file in message.files() {
    block.push_str(&format!("\n  📎 {} ({})", file.name, file.content_type));
  }
  if let Some(filters) = metadata_list::<String>(message, INFERRED_FILTERS_KEY) {
    block.push_str(&format!("\n  filters: {}", filters.join(", ")));
  }
  for reference in metadata_list::<Reference>(message, REFERENCES_KEY).unwrap_or_default() {
    block.push('\n');
    block.push_str(&reference_line(&reference));
  }
  block
}

fn metadata_list<T: serde::de::DeserializeOwned>(message: &Message, key: &str) -> Option<Vec<T>> {
  let value = message.metadata.get(key)?;
  serde_json::from_value(value.clone()).ok()
}

pub fn notice_line(notice: &Notice) -> String {
  let marker = match notice.level {
    NoticeLevel::Info => "·",
    NoticeLevel::Warning => "!",
    NoticeLevel::Error => "✗",
  };
  format!("{marker} {}", notice.text)
}

pub fn settings_summary(settings: &QuerySettings) -> String {
  let list = |values: &[String]| {
    if values.is_empty() { "(none)".to_string() } else { values.join(", ") }
  };
  format!(
    "mode        {}\nlocal_k     {}\nglobal_k    {}\nreferences  {}\ndivision    {}\naccess      {}\n",
    settings.mode,
    settings.local_k,
    settings.global_k,
    if settings.include_references { "on" } else { "off" },
    list(&settings.division_filter),
    list(&settings.access_filter),
  )
}
