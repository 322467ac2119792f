//! Parsing of REPL input lines.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use ragline_core::{conversation::ConversationId, settings::QueryMode};

pub const HELP: &str = "\
Type a question to ask it. Commands:
  /new                  start a new chat
  /list                 reload and show conversations
  /open ID              open a conversation
  /delete ID            delete a conversation
  /find TEXT            fuzzy-search conversation titles
  /attach PATH          attach a file to the next question
  /detach               drop pending attachments
  /mode MODE            local, global, hybrid, naive, mix or bypass
  /k LOCAL GLOBAL       retrieval depth (1-20, 1-30)
  /refs on|off          ask for references
  /division [NAME..]    division filter (none clears it)
  /access [NAME..]      access filter (none clears it)
  /settings             show current settings
  /reset                restore default settings
  /help                 this text
  /quit                 leave
Ctrl-C while an answer streams cancels it.
";

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
  Empty,
  Ask(String),
  New,
  List,
  Open(ConversationId),
  Delete(ConversationId),
  Find(String),
  Attach(PathBuf),
  Detach,
  Mode(QueryMode),
  K { local: u32, global: u32 },
  Refs(bool),
  Division(Vec<String>),
  Access(Vec<String>),
  Settings,
  Reset,
  Help,
  Quit,
}

pub fn parse(line: &str) -> Result<Input> {
  let line = line.trim();
  let Some(command) = line.strip_prefix('/') else {
    return Ok(if line.is_empty() { Input::Empty } else { Input::Ask(line.to_string()) });
  };
  let (name, args) = command
    .split_once(char::is_whitespace)
    .map(|(name, args)| (name, args.trim()))
    .unwrap_or((command, ""));
  let words: Vec<String> = args.split_whitespace().map(str::to_string).collect();

  let input = match name {
    "new" => Input::New,
    "list" | "ls" => Input::List,
    "open" => Input::Open(conversation_id(args)?),
    "delete" | "rm" => Input::Delete(conversation_id(args)?),
    "find" => Input::Find(required(args, "/find TEXT")?.to_string()),
    "attach" => Input::Attach(PathBuf::from(required(args, "/attach PATH")?)),
    "detach" => Input::Detach,
    "mode" => Input::Mode(QueryMode::parse(required(args, "/mode MODE")?)?),
    "k" => match words.as_slice() {
      [local, global] => Input::K {
        local:  local.parse().context("LOCAL must be a number")?,
        global: global.parse().context("GLOBAL must be a number")?,
      },
      _ => bail!("usage: /k LOCAL GLOBAL"),
    },
    "refs" => match args {
      "on" => Input::Refs(true),
      "off" => Input::Refs(false),
      _ => bail!("usage: /refs on|off"),
    },
    "division" => Input::Division(words),
    "access" => Input::Access(words),
    "settings" => Input::Settings,
    "reset" => Input::Reset,
    "help" | "?" => Input::Help,
    "quit" | "exit" | "q" => Input::Quit,
    other => bail!("unknown command /{other}; try /help"),
  };
  Ok(input)
}

fn required<'a>(args: &'a str, usage: &str) -> Result<&'a str> {
  if args.is_empty() {
    bail!("usage: {usage}");
  }
  Ok(args)
}

fn conversation_id(args: &str) -> Result<ConversationId> {
  required(args, "/open ID or /delete ID")?
    .trim_start_matches('#')
    .parse()
    .with_context(|| format!("{args:?} is not a conversation id"))
}
