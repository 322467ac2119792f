//! The interactive chat loop and the one-shot subcommands.

use std::{
  io::{self, Write},
  path::PathBuf,
  sync::Arc,
};

use anyhow::{Context, Result, bail};
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use ragline_client::{
  ApiClient, Attachment, ChatError, ChatSurface, SessionController, SessionState,
};
use ragline_core::{
  api::{ConversationApi, Page},
  conversation::{Conversation, ConversationId},
  settings::{QueryMode, QuerySettings, is_known_filter},
};
use tokio::{
  io::{AsyncBufReadExt, BufReader},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
  ConversationsCommand,
  input::{self, HELP, Input},
  render::{self, TerminalView},
};

type Surface = ChatSurface<ApiClient, ApiClient>;

fn surface(client: ApiClient, defaults: QuerySettings) -> Surface {
  let client = Arc::new(client);
  let controller = SessionController::new(client.clone(), client.config().session_timeouts());
  ChatSurface::new(client, controller, defaults)
}

// ─── Ctrl-C ───────────────────────────────────────────────────────────────────

/// A cancellation token tripped by the next Ctrl-C, for as long as it lives.
struct CtrlC {
  token:   CancellationToken,
  watcher: JoinHandle<()>,
}

impl CtrlC {
  fn arm() -> Self {
    let token = CancellationToken::new();
    let trip = token.clone();
    let watcher = tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        trip.cancel();
      }
    });
    Self { token, watcher }
  }
}

impl Drop for CtrlC {
  fn drop(&mut self) { self.watcher.abort(); }
}

// ─── Interactive chat ─────────────────────────────────────────────────────────

enum Flow {
  Continue,
  Quit,
}

struct Repl {
  surface:     Surface,
  /// Files to send with the next question.
  attachments: Vec<Attachment>,
}

pub async fn chat(
  client: ApiClient,
  defaults: QuerySettings,
  conversation: Option<ConversationId>,
) -> Result<()> {
  let mut repl = Repl { surface: surface(client, defaults), attachments: Vec::new() };

  // A failed load is already a notice; the chat still works without it.
  if repl.surface.load_conversations().await.is_ok() {
    println!("{} conversation(s). /list to show them.", repl.surface.state().conversations().len());
  }
  if let Some(id) = conversation
    && let Err(e) = repl.open(id).await
  {
    report(&e);
  }
  repl.flush_notices();
  println!("Type a question, or /help for commands.");

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  loop {
    repl.prompt().context("writing prompt")?;
    let line = tokio::select! {
      line = lines.next_line() => line.context("reading stdin")?,
      _ = tokio::signal::ctrl_c() => {
        println!("\n(/quit or Ctrl-D to leave)");
        continue;
      }
    };
    let Some(line) = line else { break };

    let flow = match input::parse(&line) {
      Ok(input) => repl.handle(input).await,
      Err(e) => Err(e),
    };
    match flow {
      Ok(Flow::Quit) => break,
      Ok(Flow::Continue) => {}
      Err(e) => report(&e),
    }
    repl.flush_notices();
  }
  println!();
  Ok(())
}

impl Repl {
  async fn handle(&mut self, input: Input) -> Result<Flow> {
    match input {
      Input::Empty => {}
      Input::Ask(text) => self.ask(&text).await?,
      Input::New => {
        self.surface.new_chat()?;
        println!("New chat.");
      }
      Input::List => {
        self.surface.load_conversations().await?;
        self.print_conversations(self.surface.state().conversations().iter());
      }
      Input::Open(id) => self.open(id).await?,
      Input::Delete(id) => self.surface.delete(id).await?,
      Input::Find(pattern) => {
        let found = find(self.surface.state().conversations(), &pattern);
        if found.is_empty() {
          println!("No conversation matches {pattern:?}.");
        }
        self.print_conversations(found.into_iter());
      }
      Input::Attach(path) => {
        let attachment = Attachment::from_path(&path).await?;
        println!(
          "Attached {} ({} bytes, {}). The next question goes out in bypass mode.",
          attachment.file_name,
          attachment.data.len(),
          attachment.content_type,
        );
        self.attachments.push(attachment);
      }
      Input::Detach => {
        println!("Dropped {} attachment(s).", self.attachments.len());
        self.attachments.clear();
      }
      Input::Mode(mode) => self.update_settings(|s| s.mode = mode)?,
      Input::K { local, global } => self.update_settings(|s| {
        s.local_k = local;
        s.global_k = global;
      })?,
      Input::Refs(on) => self.update_settings(|s| s.include_references = on)?,
      Input::Division(values) => {
        warn_unknown(&values);
        self.update_settings(|s| s.division_filter = values)?;
      }
      Input::Access(values) => {
        warn_unknown(&values);
        self.update_settings(|s| s.access_filter = values)?;
      }
      Input::Settings => print!("{}", render::settings_summary(self.surface.state().settings())),
      Input::Reset => {
        self.surface.state_mut().reset_settings();
        print!("{}", render::settings_summary(self.surface.state().settings()));
      }
      Input::Help => print!("{HELP}"),
      Input::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
  }

  async fn ask(&mut self, text: &str) -> Result<()> {
    let attachments = std::mem::take(&mut self.attachments);
    let ctrl_c = CtrlC::arm();
    let mut view = TerminalView::new(io::stdout());
    let outcome = self
      .surface
      .submit(text, attachments, &mut view, &ctrl_c.token)
      .await?;
    tracing::debug!(?outcome, "exchange finished");
    Ok(())
  }

  async fn open(&mut self, id: ConversationId) -> Result<()> {
    self.surface.open(id).await?;
    let state = self.surface.state();
    let title = state
      .current_conversation()
      .map(Conversation::display_title)
      .unwrap_or("(not in the list)");
    println!("── #{id} {title} ──");
    for message in state.messages() {
      println!("{}\n", render::message_block(message));
    }
    Ok(())
  }

  fn update_settings(&mut self, change: impl FnOnce(&mut QuerySettings)) -> Result<()> {
    let mut settings = self.surface.state().settings().clone();
    change(&mut settings);
    self.surface.state_mut().set_settings(settings)?;
    print!("{}", render::settings_summary(self.surface.state().settings()));
    Ok(())
  }

  fn print_conversations<'a>(&self, conversations: impl Iterator<Item = &'a Conversation>) {
    let current = self.surface.state().current_conversation_id();
    for conversation in conversations {
      println!("{}", render::conversation_line(conversation, current == Some(conversation.id)));
    }
  }

  fn prompt(&self) -> io::Result<()> {
    let state = self.surface.state();
    let mut out = io::stdout().lock();
    writeln!(out)?;
    match state.current_conversation_id() {
      Some(id) => write!(out, "#{id}")?,
      None => write!(out, "new")?,
    }
    write!(out, " [{}]", state.settings().mode)?;
    if !self.attachments.is_empty() {
      write!(out, " +{} file(s)", self.attachments.len())?;
    }
    write!(out, " › ")?;
    out.flush()
  }

  fn flush_notices(&mut self) {
    for notice in self.surface.state_mut().drain_notices() {
      eprintln!("{}", render::notice_line(&notice));
    }
  }
}

/// Print an error unless the chat surface has already queued it as a notice.
fn report(error: &anyhow::Error) {
  if let Some(ChatError::Api(_)) = error.downcast_ref::<ChatError>() {
    return;
  }
  eprintln!("✗ {error:#}");
}

fn warn_unknown(values: &[String]) {
  for value in values.iter().filter(|v| !is_known_filter(v)) {
    eprintln!("! {value} is not a known filter value; sending it anyway");
  }
}

/// Conversations whose title fuzzily matches `pattern`, best match first.
fn find<'a>(conversations: &'a [Conversation], pattern: &str) -> Vec<&'a Conversation> {
  let matcher = SkimMatcherV2::default();
  let mut scored: Vec<_> = conversations
    .iter()
    .filter_map(|c| {
      matcher
        .fuzzy_match(c.display_title(), pattern)
        .map(|score| (score, c))
    })
    .collect();
  scored.sort_by(|a, b| b.0.cmp(&a.0));
  scored.into_iter().map(|(_, c)| c).collect()
}

// ─── One-shot commands ────────────────────────────────────────────────────────

pub struct AskOptions {
  pub query:        String,
  pub attachments:  Vec<PathBuf>,
  pub conversation: Option<ConversationId>,
  pub mode:         Option<String>,
}

/// Stream one answer to stdout. Fails unless the answer completed.
pub async fn ask(client: ApiClient, defaults: QuerySettings, options: AskOptions) -> Result<()> {
  let mut surface = surface(client, defaults);
  let outcome = ask_with(&mut surface, options).await;
  for notice in surface.state_mut().drain_notices() {
    eprintln!("{}", render::notice_line(&notice));
  }
  match outcome? {
    SessionState::Completed => Ok(()),
    SessionState::Cancelled => bail!("cancelled"),
    state => bail!("query ended in state {state:?}"),
  }
}

async fn ask_with(surface: &mut Surface, options: AskOptions) -> Result<SessionState> {
  if let Some(id) = options.conversation {
    surface.load_conversations().await?;
    surface.open(id).await?;
  }
  if let Some(mode) = options.mode {
    let mut settings = surface.state().settings().clone();
    settings.mode = QueryMode::parse(&mode)?;
    surface.state_mut().set_settings(settings)?;
  }

  let mut attachments = Vec::with_capacity(options.attachments.len());
  for path in &options.attachments {
    attachments.push(Attachment::from_path(path).await?);
  }

  let ctrl_c = CtrlC::arm();
  let mut view = TerminalView::new(io::stdout());
  Ok(
    surface
      .submit(&options.query, attachments, &mut view, &ctrl_c.token)
      .await?,
  )
}

pub async fn conversations(client: &ApiClient, command: ConversationsCommand) -> Result<()> {
  match command {
    ConversationsCommand::List { skip, limit } => {
      let conversations = client
        .list_conversations(Page { skip, limit })
        .await
        .context("listing conversations")?;
      for conversation in &conversations {
        println!("{}", render::conversation_line(conversation, false));
      }
    }
    ConversationsCommand::Delete { id } => {
      client
        .delete_conversation(id)
        .await
        .with_context(|| format!("deleting conversation {id}"))?;
      println!("Deleted conversation #{id}.");
    }
    ConversationsCommand::Messages { id, skip, limit } => {
      let messages = client
        .list_messages(id, Page { skip, limit })
        .await
        .with_context(|| format!("listing messages of conversation {id}"))?;
      for message in &messages {
        println!("{}\n", render::message_block(message));
      }
    }
  }
  Ok(())
}
