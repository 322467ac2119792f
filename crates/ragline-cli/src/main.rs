//! `ragline`: terminal client for the ragline RAG backend.
//!
//! # Usage
//!
//! ```text
//! ragline --url http://localhost:8000 --user-id alice --api-key secret
//! ragline ask "what is the leave policy?" --attach policy.pdf
//! ragline conversations list --limit 20
//! ragline --config ~/.config/ragline/ragline.toml chat --conversation 42
//! ```

mod app;
mod conf;
mod input;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragline_client::ApiClient;
use ragline_core::conversation::ConversationId;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ragline", version, about = "Terminal client for the ragline RAG backend")]
struct Args {
  /// Path to a TOML config file. Missing files are ignored.
  #[arg(short, long, value_name = "FILE", default_value = "ragline.toml")]
  config: PathBuf,

  /// Base URL of the backend (overrides `base_url`).
  #[arg(long)]
  url: Option<String>,

  /// Value of the X-User-ID header (overrides `user_id`).
  #[arg(long)]
  user_id: Option<String>,

  /// Value of the X-API-Key header (overrides `api_key`).
  #[arg(long)]
  api_key: Option<String>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Interactive chat (the default).
  Chat {
    /// Open this conversation instead of starting a new one.
    #[arg(long, value_name = "ID")]
    conversation: Option<ConversationId>,
  },

  /// Ask a single question and stream the answer to stdout.
  Ask {
    query: String,

    /// File to send along; may be repeated. Forces bypass mode.
    #[arg(long = "attach", value_name = "PATH")]
    attachments: Vec<PathBuf>,

    /// Continue this conversation.
    #[arg(long, value_name = "ID")]
    conversation: Option<ConversationId>,

    /// Retrieval mode for this question.
    #[arg(long)]
    mode: Option<String>,
  },

  /// List, inspect or delete conversations.
  #[command(subcommand)]
  Conversations(ConversationsCommand),

  /// Print a temporary download URL for a stored document.
  SignedUrl {
    path: String,

    #[arg(long, default_value_t = 60)]
    minutes: u32,
  },
}

#[derive(Subcommand, Debug)]
enum ConversationsCommand {
  List {
    #[arg(long, default_value_t = 0)]
    skip:  u32,
    #[arg(long, default_value_t = 50)]
    limit: u32,
  },
  Delete {
    id: ConversationId,
  },
  Messages {
    id:    ConversationId,
    #[arg(long, default_value_t = 0)]
    skip:  u32,
    #[arg(long, default_value_t = 100)]
    limit: u32,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  // Logs go to stderr and default to warnings only, so they stay out of
  // the streamed answer.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let conf = conf::load(&args)?;
  let client = ApiClient::new(conf.client).context("building HTTP client")?;

  match args.command.unwrap_or(Command::Chat { conversation: None }) {
    Command::Chat { conversation } => app::chat(client, conf.defaults, conversation).await,
    Command::Ask { query, attachments, conversation, mode } => {
      app::ask(client, conf.defaults, app::AskOptions {
        query,
        attachments,
        conversation,
        mode,
      })
      .await
    }
    Command::Conversations(command) => app::conversations(&client, command).await,
    Command::SignedUrl { path, minutes } => {
      let url = client
        .signed_url(&path, minutes)
        .await
        .with_context(|| format!("requesting a signed URL for {path}"))?;
      println!("{url}");
      Ok(())
    }
  }
}
