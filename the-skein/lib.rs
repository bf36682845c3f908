//! The skein: a persistent tree of every command sequence tried against an
//! interactive story, with cursors for replaying threads through an
//! interpreter and an XML file format.

pub mod codec;
pub mod config;
pub mod edit;
pub mod line_ending;
pub mod navigate;
pub mod node;
pub mod notify;
pub mod skein;

pub use codec::{
  CodecError,
  FormatError,
};
pub use config::{
  ConfigError,
  SkeinConfig,
};
pub use navigate::CommandSink;
pub use node::{
  Node,
  NodeId,
  ROOT_COMMAND,
};
pub use notify::{
  LoggedEvent,
  Notifier,
  ObserverId,
  ShowReason,
  SkeinEvent,
  SkeinObserver,
};
pub use skein::{
  EditError,
  InvariantError,
  Skein,
};
