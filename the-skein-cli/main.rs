use std::path::Path;

use anyhow::{
  Context,
  Result,
};
use log::LevelFilter;
use the_skein::{
  Skein,
  SkeinConfig,
};

use crate::cli::{
  CliOptions,
  Command,
};

mod cli;

fn setup_logging(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
  let level = match verbosity {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Info,
    2 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  };

  let dispatch = fern::Dispatch::new()
    .format(|out, message, record| {
      out.finish(format_args!(
        "[{}] {}: {}",
        record.level(),
        record.target(),
        message
      ))
    })
    .level(level);

  let dispatch = match log_file {
    Some(path) => {
      let file = fern::log_file(path)
        .with_context(|| format!("failed to open log file '{}'", path.display()))?;
      dispatch.chain(file)
    },
    None => dispatch.chain(std::io::stderr()),
  };

  dispatch.apply()?;
  Ok(())
}

fn main() -> Result<()> {
  let opts = CliOptions::parse()?;
  setup_logging(opts.verbosity, opts.log_file.as_deref())?;

  let config = match &opts.config_file {
    Some(path) => SkeinConfig::load(path)?,
    None => SkeinConfig::default(),
  };
  log::debug!("using config {config:?}");

  let mut skein = Skein::load_with_config(&opts.file, &config)
    .with_context(|| format!("failed to open skein '{}'", opts.file.display()))?;

  run(&mut skein, &opts.command, &config)?;

  if let Some(output) = opts.command.output(&opts.file) {
    skein.save(output)?;
    log::info!("wrote {}", output.display());
  }
  Ok(())
}

fn run(skein: &mut Skein, command: &Command, config: &SkeinConfig) -> Result<()> {
  let active = skein.current();
  match command {
    Command::Dump => println!("{}", skein.dump()),
    Command::Commands => {
      for command in thread_commands(skein) {
        println!("{command}");
      }
    },
    Command::Labels => {
      for (label, node) in skein.labels() {
        let command = skein.get(node).map(|node| node.command()).unwrap_or_default();
        println!("{label}\t{command}");
      }
    },
    Command::Check => {
      skein.validate().context("skein is inconsistent")?;
      let nodes = skein.traverse().count();
      let changed = skein.traverse().filter(|(_, node)| node.changed()).count();
      let locked = skein.traverse().filter(|(_, node)| node.locked()).count();
      println!("{nodes} nodes, {changed} changed, {locked} locked");
    },
    Command::Trim { min_score, .. } => {
      let root = skein.root();
      let removed = skein.trim(root, min_score.unwrap_or(config.trim_min_score))?;
      println!("removed {removed} subtrees");
    },
    Command::Bless { all, .. } => {
      if !skein.can_bless(active, *all) {
        log::warn!("nothing to bless");
      }
      skein.bless(active, *all)?;
    },
    Command::Lock { .. } => skein.lock_thread(active)?,
    Command::Unlock { .. } => skein.unlock_thread(active)?,
  }
  Ok(())
}

/// Commands from the start of the story down to the active node.
fn thread_commands(skein: &Skein) -> Vec<String> {
  let root = skein.root();
  let mut commands: Vec<String> = skein
    .ancestors(skein.current())
    .filter(|&id| id != root)
    .filter_map(|id| skein.get(id))
    .map(|node| node.command().to_string())
    .collect();
  commands.reverse();
  commands
}
