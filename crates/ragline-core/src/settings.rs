//! Per-chat query settings and their persistence in conversation metadata.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantArray};

use crate::{Error, Result, conversation::Metadata};

/// Metadata key under which a conversation stores its [`QuerySettings`].
pub const SETTINGS_KEY: &str = "chatSettings";

pub const LOCAL_K_RANGE: (u32, u32) = (1, 20);
pub const GLOBAL_K_RANGE: (u32, u32) = (1, 30);

/// Division filter values the backend knows about.
pub const DIVISIONS: &[&str] = &[
  "BADIKLAT",
  "DIKLAT_NON_KLASIKAL",
  "KEPEGAWAIAN",
  "KEUANGAN",
  "KONTEN",
  "MANAJEMEN_PEMBELAJARAN",
  "PEMBEKALAN_CALON_PEJABAT_FUNGSIONAL",
  "PENDIDIKAN_DAN_PELATIHAN_TEKNIS",
  "PRODUKSI",
  "STANDARD_OPERATING_PROCEDURE",
  "TATA_USAHA",
];

/// Access-level filter values the backend knows about.
pub const ACCESS_LEVELS: &[&str] = &["PUBLIC", "INTERNAL", "CONFIDENTIAL"];

// ─── Mode ────────────────────────────────────────────────────────────────────

/// Retrieval mode. Semantics are defined by the backend; this crate only
/// forwards the name, except that attachments force [`QueryMode::Bypass`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
  VariantArray,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum QueryMode {
  Local,
  #[default]
  Global,
  Hybrid,
  Naive,
  Mix,
  /// Skip retrieval entirely; used for multimodal submissions.
  Bypass,
}

impl QueryMode {
  /// Parse a wire name, mapping failures to [`Error::UnknownMode`].
  pub fn parse(name: &str) -> Result<Self> {
    Self::from_str(name.trim()).map_err(|_| Error::UnknownMode(name.to_string()))
  }

  /// The mode actually sent for a submission.
  pub fn effective(self, has_attachments: bool) -> Self {
    if has_attachments { Self::Bypass } else { self }
  }
}

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
  pub mode:               QueryMode,
  pub local_k:            u32,
  pub global_k:           u32,
  pub include_references: bool,
  pub division_filter:    Vec<String>,
  pub access_filter:      Vec<String>,
}

impl Default for QuerySettings {
  fn default() -> Self {
    Self {
      mode:               QueryMode::Global,
      local_k:            5,
      global_k:           10,
      include_references: true,
      division_filter:    Vec::new(),
      access_filter:      vec!["external".to_string()],
    }
  }
}

impl QuerySettings {
  /// Check `local_k` and `global_k` against their allowed ranges.
  pub fn validate(&self) -> Result<()> {
    check_range("local_k", self.local_k, LOCAL_K_RANGE)?;
    check_range("global_k", self.global_k, GLOBAL_K_RANGE)
  }

  /// The snapshot persisted after a submission: identical to `self` except
  /// that the mode is forced to bypass when attachments were sent.
  pub fn snapshot(&self, had_attachments: bool) -> Self {
    Self {
      mode: self.mode.effective(had_attachments),
      ..self.clone()
    }
  }

  /// Read settings stored under [`SETTINGS_KEY`]. Returns `None` when the key
  /// is absent or its value does not decode.
  pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
    let raw = metadata.get(SETTINGS_KEY)?;
    match serde_json::from_value(raw.clone()) {
      Ok(settings) => Some(settings),
      Err(e) => {
        tracing::debug!("ignoring unreadable {SETTINGS_KEY}: {e}");
        None
      }
    }
  }

  /// Merge these settings into `metadata` under [`SETTINGS_KEY`], leaving
  /// other keys untouched.
  pub fn merge_into(&self, metadata: &mut Metadata) -> Result<()> {
    metadata.insert(SETTINGS_KEY.to_string(), serde_json::to_value(self)?);
    Ok(())
  }
}

fn check_range(field: &'static str, value: u32, (min, max): (u32, u32)) -> Result<()> {
  if (min..=max).contains(&value) {
    Ok(())
  } else {
    Err(Error::OutOfRange { field, value, min, max })
  }
}

/// Whether `value` is one of the known division or access filter values.
pub fn is_known_filter(value: &str) -> bool {
  DIVISIONS.contains(&value) || ACCESS_LEVELS.contains(&value)
}
