//! Layered configuration: TOML file, then `RAGLINE_*` environment
//! variables, then command-line flags.
//!
//! ```toml
//! base_url = "http://localhost:8000"
//! user_id  = "alice"
//! api_key  = "secret"
//! idle_timeout_secs = 120
//!
//! [defaults]
//! mode     = "mix"
//! local_k  = 5
//! global_k = 10
//! ```

use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File};
use ragline_client::ClientConfig;
use ragline_core::settings::QuerySettings;

use crate::Args;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

pub struct Conf {
  pub client:   ClientConfig,
  /// Settings a new chat starts with.
  pub defaults: QuerySettings,
}

pub fn load(args: &Args) -> Result<Conf> {
  let settings = Config::builder()
    .set_default("base_url", DEFAULT_BASE_URL)?
    .add_source(File::from(args.config.clone()).required(false))
    .add_source(Environment::with_prefix("RAGLINE"))
    .set_override_option("base_url", args.url.clone())?
    .set_override_option("user_id", args.user_id.clone())?
    .set_override_option("api_key", args.api_key.clone())?
    .build()
    .with_context(|| format!("failed to read config from {}", args.config.display()))?;

  from_config(settings)
}

fn from_config(settings: Config) -> Result<Conf> {
  let defaults = match settings.get::<QuerySettings>("defaults") {
    Ok(defaults) => defaults,
    Err(ConfigError::NotFound(_)) => QuerySettings::default(),
    Err(e) => return Err(e).context("failed to deserialise [defaults]"),
  };
  defaults.validate().context("invalid [defaults]")?;

  let client: ClientConfig = settings
    .try_deserialize()
    .context("failed to deserialise client configuration")?;

  Ok(Conf { client, defaults })
}
