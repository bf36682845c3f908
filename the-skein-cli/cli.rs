use std::path::{
  Path,
  PathBuf,
};

use anyhow::Result;
use clap::{
  ArgAction,
  Parser,
  Subcommand,
};

#[derive(Clone, Debug)]
pub struct CliOptions {
  pub verbosity:   u8,
  pub log_file:    Option<PathBuf>,
  pub config_file: Option<PathBuf>,
  pub file:        PathBuf,
  pub command:     Command,
}

/// What to do with the loaded skein.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
  Dump,
  Commands,
  Labels,
  Check,
  Trim {
    min_score: Option<i32>,
    output:    Option<PathBuf>,
  },
  Bless {
    all:    bool,
    output: Option<PathBuf>,
  },
  Lock {
    output: Option<PathBuf>,
  },
  Unlock {
    output: Option<PathBuf>,
  },
}

impl Command {
  /// Where a modifying command writes its result, `None` for read-only ones.
  pub fn output<'a>(&'a self, input: &'a Path) -> Option<&'a Path> {
    match self {
      Self::Dump | Self::Commands | Self::Labels | Self::Check => None,
      Self::Trim { output, .. }
      | Self::Bless { output, .. }
      | Self::Lock { output }
      | Self::Unlock { output } => Some(output.as_deref().unwrap_or(input)),
    }
  }
}

impl CliOptions {
  pub fn parse() -> Result<Self> {
    let raw = RawCli::parse();
    raw.try_into()
  }
}

#[derive(Parser, Debug)]
#[command(name = "skein", about, version, long_about = None)]
struct RawCli {
  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count, global = true)]
  verbosity: u8,

  /// Save logs to a specific file
  #[arg(long = "log", value_name = "FILE", global = true)]
  log_file: Option<PathBuf>,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
  config_file: Option<PathBuf>,

  /// Skein file to operate on
  #[arg(value_name = "SKEIN")]
  file: PathBuf,

  #[command(subcommand)]
  command: RawCommand,
}

#[derive(Subcommand, Debug)]
enum RawCommand {
  /// Print the tree on one line
  Dump,
  /// Print the commands from the start to the active node
  Commands,
  /// List labelled nodes in label order
  Labels,
  /// Check the tree's invariants and print a summary
  Check,
  /// Remove every subtree that is not locked
  Trim {
    /// Minimum score kept (defaults to the configured value)
    #[arg(long = "min-score", value_name = "N", allow_negative_numbers = true)]
    min_score: Option<i32>,
    /// Write the result here instead of over the input
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output:    Option<PathBuf>,
  },
  /// Accept the active node's transcript as the expected one
  Bless {
    /// Also bless every ancestor of the active node
    #[arg(long = "all")]
    all:    bool,
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
  },
  /// Lock the active node's thread
  Lock {
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
  },
  /// Unlock the active node's thread
  Unlock {
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
  },
}

impl From<RawCommand> for Command {
  fn from(raw: RawCommand) -> Self {
    match raw {
      RawCommand::Dump => Self::Dump,
      RawCommand::Commands => Self::Commands,
      RawCommand::Labels => Self::Labels,
      RawCommand::Check => Self::Check,
      RawCommand::Trim { min_score, output } => Self::Trim { min_score, output },
      RawCommand::Bless { all, output } => Self::Bless { all, output },
      RawCommand::Lock { output } => Self::Lock { output },
      RawCommand::Unlock { output } => Self::Unlock { output },
    }
  }
}

impl TryFrom<RawCli> for CliOptions {
  type Error = anyhow::Error;

  fn try_from(raw: RawCli) -> Result<Self> {
    if raw.file.is_dir() {
      anyhow::bail!("'{}' is a directory, not a skein file", raw.file.display());
    }

    Ok(Self {
      verbosity:   raw.verbosity,
      log_file:    raw.log_file,
      config_file: raw.config_file,
      file:        raw.file,
      command:     raw.command.into(),
    })
  }
}
