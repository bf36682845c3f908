use std::{
  borrow::Cow,
  fmt,
  sync::atomic::{
    AtomicU64,
    Ordering,
  },
};

use smallvec::SmallVec;

use crate::line_ending::normalize_line_endings;

slotmap::new_key_type! {
    /// Handle to a node inside a [`Skein`](crate::Skein) arena.
    ///
    /// Handles of removed nodes go stale instead of dangling: every lookup
    /// through the skein returns `None` for them.
    pub struct NodeId;
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}", self.0)
  }
}

/// Command text of the root node.
pub const ROOT_COMMAND: &str = "- start -";

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Returns a serialization id that has not been handed out before in this
/// process.
pub(crate) fn next_uid() -> String {
  format!("node-{}", NEXT_UID.fetch_add(1, Ordering::Relaxed))
}

/// Whether XML 1.0 can carry `ch` in a document at all, even as a
/// character reference.
pub(crate) fn is_xml_char(ch: char) -> bool {
  matches!(
    ch,
    '\u{9}' | '\u{A}' | '\u{D}' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
  )
}

/// Prepares text for storage in a node: line endings become LF and
/// characters a `.skein` file cannot hold are dropped, so what is stored is
/// exactly what a save and load give back.
pub(crate) fn clean_text(text: &str) -> Cow<'_, str> {
  let text = normalize_line_endings(text);
  if text.chars().all(is_xml_char) {
    return text;
  }
  log::debug!("dropping control characters from {text:?}");
  Cow::Owned(text.chars().filter(|&ch| is_xml_char(ch)).collect())
}

pub(crate) type Children = SmallVec<[NodeId; 4]>;

/// One command in the skein together with what the story printed for it.
///
/// Nodes are read through [`Skein`](crate::Skein) and changed only through
/// its methods, which keep cursors, locks and events in step:
///
/// ```compile_fail
/// let skein = the_skein::Skein::new();
/// let mut node = skein.get(skein.root()).unwrap().clone();
/// node.set_transcript("edited behind the skein's back");
/// ```
#[derive(Debug, Clone)]
pub struct Node {
  uid:        String,
  command:    String,
  label:      String,
  transcript: String,
  expected:   String,
  played:     bool,
  changed:    bool,
  locked:     bool,
  score:      i32,

  pub(crate) parent:   Option<NodeId>,
  pub(crate) children: Children,
}

impl Node {
  pub(crate) fn new(command: &str) -> Self {
    Self::with_uid(next_uid(), command)
  }

  pub(crate) fn with_uid(uid: String, command: &str) -> Self {
    Self {
      uid,
      command: clean_text(command).into_owned(),
      label: String::new(),
      transcript: String::new(),
      expected: String::new(),
      played: false,
      changed: false,
      locked: false,
      score: 0,
      parent: None,
      children: Children::new(),
    }
  }

  /// Stable id used to reference this node in saved files.
  pub fn uid(&self) -> &str {
    &self.uid
  }

  pub fn command(&self) -> &str {
    &self.command
  }

  pub(crate) fn set_command(&mut self, command: &str) {
    self.command = clean_text(command).into_owned();
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub(crate) fn set_label(&mut self, label: &str) {
    self.label = clean_text(label).into_owned();
  }

  /// True for non-root nodes the author has bookmarked with a label.
  pub fn has_label(&self) -> bool {
    self.parent.is_some() && !self.label.is_empty()
  }

  pub fn transcript(&self) -> &str {
    &self.transcript
  }

  /// Stores what the story printed, returning whether the changed state
  /// flipped.
  pub(crate) fn set_transcript(&mut self, text: &str) -> bool {
    self.transcript = clean_text(text).into_owned();
    self.refresh_changed()
  }

  pub fn expected(&self) -> &str {
    &self.expected
  }

  /// Stores the approved text, returning whether the changed state flipped.
  pub(crate) fn set_expected(&mut self, text: &str) -> bool {
    self.expected = clean_text(text).into_owned();
    self.refresh_changed()
  }

  /// Approves the current transcript.
  pub(crate) fn bless(&mut self) -> bool {
    self.expected.clone_from(&self.transcript);
    self.refresh_changed()
  }

  /// Whether the transcript differs from the expected text.
  pub fn changed(&self) -> bool {
    self.changed
  }

  pub fn played(&self) -> bool {
    self.played
  }

  pub(crate) fn set_played(&mut self, played: bool) {
    self.played = played;
  }

  pub fn locked(&self) -> bool {
    self.locked
  }

  pub(crate) fn set_locked(&mut self, locked: bool) {
    self.locked = locked;
  }

  /// Trim hint carried through save and load. Trimming itself only looks at
  /// the lock flag.
  pub fn score(&self) -> i32 {
    self.score
  }

  pub(crate) fn set_score(&mut self, score: i32) {
    self.score = score;
  }

  pub fn parent(&self) -> Option<NodeId> {
    self.parent
  }

  pub fn children(&self) -> &[NodeId] {
    &self.children
  }

  pub fn is_root(&self) -> bool {
    self.parent.is_none()
  }

  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }

  fn refresh_changed(&mut self) -> bool {
    let changed = self.transcript != self.expected;
    let flipped = changed != self.changed;
    self.changed = changed;
    flipped
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn changed_tracks_text() {
    let mut node = Node::new("x");
    assert!(!node.changed());

    node.set_transcript("You see a door.");
    assert!(node.changed());
    node.set_expected("You see a door.");
    assert!(!node.changed());

    assert!(node.set_transcript("You see a window."));
    assert!(node.changed());

    assert!(node.bless());
    assert!(!node.changed());
    assert_eq!(node.expected(), "You see a window.");
  }

  #[test]
  fn line_endings_are_normalized_before_comparing() {
    let mut node = Node::new("look");
    node.set_transcript("Hall\r\nA door.\r");
    node.set_expected("Hall\nA door.\n");
    assert_eq!(node.transcript(), "Hall\nA door.\n");
    assert!(!node.changed());
  }

  #[test]
  fn text_is_cleaned_for_storage() {
    let mut node = Node::new("x");
    node.set_command("go\r\nnorth");
    node.set_label("bell\u{7}\rhere");
    node.set_transcript("You hear a bell\u{7}.\u{1b}[0m\tDone.");
    assert_eq!(node.command(), "go\nnorth");
    assert_eq!(node.label(), "bell\nhere");
    assert_eq!(node.transcript(), "You hear a bell.[0m\tDone.");
    assert!(matches!(clean_text("plain\ttext\n"), Cow::Borrowed(_)));
  }

  #[test]
  fn set_reports_flip_only() {
    let mut node = Node::new("look");
    assert!(node.set_transcript("a"));
    assert!(!node.set_transcript("b"));
    assert!(node.set_expected("b"));
    assert!(!node.bless());
  }

  #[test]
  fn root_never_has_label() {
    let mut node = Node::new(ROOT_COMMAND);
    node.set_label("start here");
    assert!(!node.has_label());

    node.parent = Some(NodeId::default());
    assert!(node.has_label());
    node.set_label("");
    assert!(!node.has_label());
  }

  #[test]
  fn uids_are_unique() {
    let a = Node::new("a");
    let b = Node::new("a");
    assert_ne!(a.uid(), b.uid());
    assert!(a.uid().starts_with("node-"));
  }

  quickcheck::quickcheck! {
      fn changed_matches_text(ops: Vec<(u8, String)>) -> bool {
          let mut node = Node::new("x");
          for (op, text) in ops {
              match op % 3 {
                  0 => { node.set_transcript(&text); },
                  1 => { node.set_expected(&text); },
                  _ => { node.bless(); },
              }
              if node.changed() != (node.transcript() != node.expected()) {
                  return false;
              }
          }
          true
      }
  }
}
