use std::{
  fs,
  io,
  path::{
    Path,
    PathBuf,
  },
};

use serde::Deserialize;
use thiserror::Error;

use crate::notify::DEFAULT_EVENT_LIMIT;

pub const DEFAULT_GENERATOR: &str = "the-skein";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config '{path}': {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("bad config: {0}")]
  BadConfig(#[from] toml::de::Error),
}

/// Settings for a skein and the tools that drive it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SkeinConfig {
  /// Text written into the `<generator>` element of saved files.
  pub generator:      String,
  /// How many events the notifier keeps for polling consumers.
  pub event_limit:    usize,
  /// Default `min_score` handed to trim by front ends.
  pub trim_min_score: i32,
}

impl Default for SkeinConfig {
  fn default() -> Self {
    Self {
      generator:      DEFAULT_GENERATOR.to_string(),
      event_limit:    DEFAULT_EVENT_LIMIT,
      trim_min_score: -1,
    }
  }
}

impl SkeinConfig {
  pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(text)?)
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| {
      ConfigError::Io {
        path: path.to_path_buf(),
        source,
      }
    })?;
    Self::from_toml_str(&text)
  }
}
