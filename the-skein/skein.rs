//! The skein: a branching tree of commands played against a story.
//!
//! The skein owns every [`Node`] in a slot map arena. Two cursors point into
//! the tree: `current`, where the author is working, and `played`, how far
//! a live interpreter run has progressed towards it. Both always refer to a
//! node that is present in the arena; every removal that would take one of
//! them away resets both to the root first.

use std::{
  collections::{
    HashMap,
    HashSet,
  },
  fmt::Write as _,
};

use slotmap::HopSlotMap;
use thiserror::Error;

use crate::{
  config::SkeinConfig,
  node::{
    Node,
    NodeId,
    ROOT_COMMAND,
    next_uid,
  },
  notify::{
    Notifier,
    ObserverId,
    SkeinEvent,
    SkeinObserver,
  },
};

/// Errors reported by structural edits. A failed edit leaves the tree
/// untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EditError {
  #[error("node {0} is not part of this skein")]
  UnknownNode(NodeId),
  #[error("the root node cannot be removed or reparented")]
  RootNode,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantError {
  #[error("root node is missing from the arena")]
  MissingRoot,
  #[error("root node has a parent")]
  RootHasParent,
  #[error("root command is {0:?}")]
  RootCommand(String),
  #[error("node {0} is reachable twice")]
  DuplicateVisit(NodeId),
  #[error("child {0} is missing from the arena")]
  MissingNode(NodeId),
  #[error("node {0} does not point back at its parent")]
  ParentMismatch(NodeId),
  #[error("arena holds nodes unreachable from the root")]
  UnreachableNode,
  #[error("current cursor {0} is not in the tree")]
  DanglingCurrent(NodeId),
  #[error("played cursor {0} is not in the tree")]
  DanglingPlayed(NodeId),
  #[error("node {0} has a stale changed flag")]
  StaleChanged(NodeId),
  #[error("node {0} is locked but its parent is not")]
  UnlockedAncestor(NodeId),
  #[error("uid index disagrees with node {0}")]
  UidMismatch(NodeId),
}

pub struct Skein {
  pub(crate) nodes:    HopSlotMap<NodeId, Node>,
  pub(crate) uids:     HashMap<String, NodeId>,
  pub(crate) root:     NodeId,
  pub(crate) current:  NodeId,
  pub(crate) played:   NodeId,
  pub(crate) modified: bool,
  pub(crate) notifier: Notifier,
  generator:           String,
}

impl std::fmt::Debug for Skein {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Skein")
      .field("nodes", &self.nodes.len())
      .field("root", &self.root)
      .field("current", &self.current)
      .field("played", &self.played)
      .field("modified", &self.modified)
      .field("notifier", &self.notifier)
      .finish()
  }
}

impl Default for Skein {
  fn default() -> Self {
    Self::new()
  }
}

impl Skein {
  /// Creates a skein holding only the root node.
  pub fn new() -> Self {
    Self::with_config(&SkeinConfig::default())
  }

  pub fn with_config(config: &SkeinConfig) -> Self {
    let mut nodes = HopSlotMap::with_key();
    let root_node = Node::new(ROOT_COMMAND);
    let mut uids = HashMap::new();
    let uid = root_node.uid().to_string();
    let root = nodes.insert(root_node);
    uids.insert(uid, root);

    Self {
      nodes,
      uids,
      root,
      current: root,
      played: root,
      modified: true,
      notifier: Notifier::with_limit(config.event_limit),
      generator: config.generator.clone(),
    }
  }

  /// Builds a skein around an already wired arena. Used by the loader, which
  /// constructs the whole tree before anything is replaced.
  pub(crate) fn from_parts(
    nodes: HopSlotMap<NodeId, Node>,
    root: NodeId,
    current: NodeId,
    played: NodeId,
    config: &SkeinConfig,
  ) -> Self {
    let uids = nodes
      .iter()
      .map(|(id, node)| (node.uid().to_string(), id))
      .collect();
    Self {
      nodes,
      uids,
      root,
      current,
      played,
      modified: false,
      notifier: Notifier::with_limit(config.event_limit),
      generator: config.generator.clone(),
    }
  }

  pub fn root(&self) -> NodeId {
    self.root
  }

  pub fn current(&self) -> NodeId {
    self.current
  }

  pub fn played(&self) -> NodeId {
    self.played
  }

  /// Whether anything changed since the last load or save.
  pub fn is_modified(&self) -> bool {
    self.modified
  }

  pub fn generator(&self) -> &str {
    &self.generator
  }

  pub fn set_generator(&mut self, generator: impl Into<String>) {
    self.generator = generator.into();
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.len() <= 1
  }

  pub fn contains(&self, id: NodeId) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn get(&self, id: NodeId) -> Option<&Node> {
    self.nodes.get(id)
  }

  /// Resolves a serialization uid to a live node.
  pub fn find(&self, uid: &str) -> Option<NodeId> {
    self.uids.get(uid).copied()
  }

  pub fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.nodes.get(id).and_then(Node::parent)
  }

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    self.nodes.get(id).map(Node::children).unwrap_or(&[])
  }

  pub fn subscribe(&mut self, observer: impl SkeinObserver + 'static) -> ObserverId {
    self.notifier.subscribe(observer)
  }

  pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
    self.notifier.unsubscribe(id)
  }

  pub fn notifier(&self) -> &Notifier {
    &self.notifier
  }

  pub fn notifier_mut(&mut self) -> &mut Notifier {
    &mut self.notifier
  }

  /// True if `node` is `end` or a strict ancestor of it, i.e. `node` lies
  /// on the thread that ends at `end`.
  pub fn in_thread(&self, node: NodeId, end: NodeId) -> bool {
    if !self.contains(node) {
      return false;
    }
    self.ancestors(end).any(|id| id == node)
  }

  /// True if `ancestor` is a strict ancestor of `node`.
  pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
    ancestor != node && self.in_thread(ancestor, node)
  }

  pub fn is_in_current_thread(&self, node: NodeId) -> bool {
    self.in_thread(node, self.current)
  }

  /// Iterates from `id` up to the root, `id` included.
  pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
    Ancestors {
      skein: self,
      next:  self.contains(id).then_some(id),
    }
  }

  /// Number of edges between `id` and the root.
  pub fn depth(&self, id: NodeId) -> usize {
    self.ancestors(id).count().saturating_sub(1)
  }

  /// Pre-order traversal of the subtree rooted at `id`.
  pub fn traverse_from(&self, id: NodeId) -> Traverse<'_> {
    Traverse {
      skein: self,
      stack: if self.contains(id) { vec![id] } else { Vec::new() },
    }
  }

  pub fn traverse(&self) -> Traverse<'_> {
    self.traverse_from(self.root)
  }

  /// Every labelled node, sorted by label text.
  pub fn labels(&self) -> Vec<(String, NodeId)> {
    let mut labels: Vec<_> = self
      .traverse()
      .filter(|(_, node)| node.has_label())
      .map(|(id, node)| (node.label().to_string(), id))
      .collect();
    labels.sort_by(|a, b| a.0.cmp(&b.0));
    labels
  }

  pub fn has_labels(&self) -> bool {
    self.traverse().any(|(_, node)| node.has_label())
  }

  /// One-line rendering of the tree, e.g. `(- start -)->((look)(north))`.
  pub fn dump(&self) -> String {
    let mut out = String::new();
    self.dump_node(self.root, &mut out);
    out
  }

  fn dump_node(&self, id: NodeId, out: &mut String) {
    let Some(node) = self.nodes.get(id) else {
      return;
    };
    let _ = write!(out, "({})", node.command());
    if !node.children.is_empty() {
      out.push_str("->(");
      for &child in &node.children {
        self.dump_node(child, out);
      }
      out.push(')');
    }
  }

  pub fn validate(&self) -> Result<(), InvariantError> {
    let Some(root) = self.nodes.get(self.root) else {
      return Err(InvariantError::MissingRoot);
    };
    if root.parent.is_some() {
      return Err(InvariantError::RootHasParent);
    }
    if root.command() != ROOT_COMMAND {
      return Err(InvariantError::RootCommand(root.command().to_string()));
    }

    let mut visited = HashSet::with_capacity(self.nodes.len());
    let mut stack = vec![(self.root, None)];
    while let Some((id, expected_parent)) = stack.pop() {
      if !visited.insert(id) {
        return Err(InvariantError::DuplicateVisit(id));
      }
      let Some(node) = self.nodes.get(id) else {
        return Err(InvariantError::MissingNode(id));
      };
      if node.parent != expected_parent {
        return Err(InvariantError::ParentMismatch(id));
      }
      if node.changed() != (node.transcript() != node.expected()) {
        return Err(InvariantError::StaleChanged(id));
      }
      if node.locked() {
        if let Some(parent) = expected_parent.and_then(|parent| self.nodes.get(parent)) {
          if !parent.locked() {
            return Err(InvariantError::UnlockedAncestor(id));
          }
        }
      }
      if self.uids.get(node.uid()) != Some(&id) {
        return Err(InvariantError::UidMismatch(id));
      }
      stack.extend(node.children.iter().map(|&child| (child, Some(id))));
    }

    if visited.len() != self.nodes.len() || self.uids.len() != self.nodes.len() {
      return Err(InvariantError::UnreachableNode);
    }
    if !visited.contains(&self.current) {
      return Err(InvariantError::DanglingCurrent(self.current));
    }
    if !visited.contains(&self.played) {
      return Err(InvariantError::DanglingPlayed(self.played));
    }
    Ok(())
  }

  pub(crate) fn node(&self, id: NodeId) -> Result<&Node, EditError> {
    self.nodes.get(id).ok_or(EditError::UnknownNode(id))
  }

  pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, EditError> {
    self.nodes.get_mut(id).ok_or(EditError::UnknownNode(id))
  }

  /// Allocates a detached node with a uid no live node uses.
  pub(crate) fn alloc(&mut self, command: &str) -> NodeId {
    let mut uid = next_uid();
    while self.uids.contains_key(&uid) {
      uid = next_uid();
    }
    let id = self.nodes.insert(Node::with_uid(uid.clone(), command));
    self.uids.insert(uid, id);
    id
  }

  /// Appends a freshly allocated node to `parent`'s children.
  pub(crate) fn append_new(&mut self, parent: NodeId, command: &str) -> NodeId {
    let id = self.alloc(command);
    self.nodes[id].parent = Some(parent);
    self.nodes[parent].children.push(id);
    id
  }

  /// Resets both cursors to the root if removing `id` would take either away.
  pub(crate) fn release_cursors(&mut self, id: NodeId) {
    if self.in_thread(id, self.current) || self.in_thread(id, self.played) {
      log::debug!("cursors reset to root: node {id} is being removed");
      self.current = self.root;
      self.played = self.root;
    }
  }

  /// Unlinks `id` from its parent and drops it together with all descendants.
  pub(crate) fn destroy_subtree(&mut self, id: NodeId) {
    self.detach(id);
    let mut stack = vec![id];
    while let Some(next) = stack.pop() {
      if let Some(node) = self.nodes.remove(next) {
        self.uids.remove(node.uid());
        stack.extend(node.children);
      }
    }
  }

  /// Removes `id` from its parent's child list, returning its former position.
  pub(crate) fn detach(&mut self, id: NodeId) -> Option<usize> {
    let parent = self.nodes.get_mut(id)?.parent.take()?;
    let siblings = &mut self.nodes[parent].children;
    let pos = siblings.iter().position(|&child| child == id)?;
    siblings.remove(pos);
    Some(pos)
  }

  pub(crate) fn emit(&mut self, event: SkeinEvent) {
    self.notifier.emit(event);
  }

  pub(crate) fn mark_modified(&mut self) {
    self.modified = true;
  }

  pub(crate) fn mark_saved(&mut self) {
    self.modified = false;
  }
}

pub struct Ancestors<'a> {
  skein: &'a Skein,
  next:  Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
  type Item = NodeId;

  fn next(&mut self) -> Option<Self::Item> {
    let id = self.next?;
    self.next = self.skein.parent(id);
    Some(id)
  }
}

#[derive(Debug)]
pub struct Traverse<'a> {
  skein: &'a Skein,
  stack: Vec<NodeId>,
}

impl<'a> Iterator for Traverse<'a> {
  type Item = (NodeId, &'a Node);

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let id = self.stack.pop()?;
      let Some(node) = self.skein.nodes.get(id) else {
        continue;
      };
      self.stack.extend(node.children.iter().rev());
      return Some((id, node));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_skein_has_only_root() {
    let skein = Skein::new();
    assert_eq!(skein.len(), 1);
    assert!(skein.is_empty());
    assert_eq!(skein.current(), skein.root());
    assert_eq!(skein.played(), skein.root());
    assert_eq!(skein.get(skein.root()).unwrap().command(), ROOT_COMMAND);
    assert!(skein.is_modified());
    skein.validate().unwrap();
  }

  #[test]
  fn traverse_is_pre_order() {
    let mut skein = Skein::new();
    let root = skein.root();
    let a = skein.append_new(root, "a");
    let b = skein.append_new(root, "b");
    let a1 = skein.append_new(a, "a1");

    let order: Vec<_> = skein.traverse().map(|(id, _)| id).collect();
    assert_eq!(order, vec![root, a, a1, b]);
    assert_eq!(skein.dump(), "(- start -)->((a)->((a1))(b))");
    skein.validate().unwrap();
  }

  #[test]
  fn in_thread_includes_self_and_ancestors() {
    let mut skein = Skein::new();
    let root = skein.root();
    let a = skein.append_new(root, "a");
    let b = skein.append_new(a, "b");
    let c = skein.append_new(root, "c");

    assert!(skein.in_thread(b, b));
    assert!(skein.in_thread(a, b));
    assert!(skein.in_thread(root, b));
    assert!(!skein.in_thread(b, a));
    assert!(!skein.in_thread(c, b));
    assert!(skein.is_ancestor(root, a));
    assert!(!skein.is_ancestor(a, a));
    assert_eq!(skein.depth(b), 2);
    assert_eq!(skein.ancestors(b).collect::<Vec<_>>(), vec![b, a, root]);
  }

  #[test]
  fn labels_are_sorted_and_skip_root() {
    let mut skein = Skein::new();
    let root = skein.root();
    let a = skein.append_new(root, "a");
    let b = skein.append_new(root, "b");
    skein.nodes[root].set_label("root label");
    skein.nodes[a].set_label("zebra");
    skein.nodes[b].set_label("apple");

    assert!(skein.has_labels());
    assert_eq!(skein.labels(), vec![
      ("apple".to_string(), b),
      ("zebra".to_string(), a)
    ]);
  }

  #[test]
  fn destroyed_handles_go_stale() {
    let mut skein = Skein::new();
    let root = skein.root();
    let a = skein.append_new(root, "a");
    let b = skein.append_new(a, "b");
    let uid = skein.get(b).unwrap().uid().to_string();

    skein.destroy_subtree(a);
    assert!(skein.get(a).is_none());
    assert!(skein.get(b).is_none());
    assert_eq!(skein.find(&uid), None);
    assert!(skein.children(root).is_empty());
    skein.validate().unwrap();
  }

  #[test]
  fn validate_catches_unlocked_parent() {
    let mut skein = Skein::new();
    let a = skein.append_new(skein.root(), "a");
    skein.nodes[a].set_locked(true);
    assert_eq!(skein.validate(), Err(InvariantError::UnlockedAncestor(a)));
  }
}
