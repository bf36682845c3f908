//! Structural edits and per-node text edits.
//!
//! Each edit either fails with an [`EditError`] and leaves the tree as it
//! was, or completes and leaves both cursors on live nodes.

use crate::{
  node::NodeId,
  notify::SkeinEvent,
  skein::{
    EditError,
    Skein,
  },
};

impl Skein {
  /// Appends an empty child to `parent`. Cursors stay where they are.
  pub fn add_child(&mut self, parent: NodeId) -> Result<NodeId, EditError> {
    self.node(parent)?;
    let node = self.append_new(parent, "");
    log::debug!("added child {node} under {parent}");

    self.emit(SkeinEvent::TreeChanged);
    self.mark_modified();
    debug_assert!(self.validate().is_ok());
    Ok(node)
  }

  /// Splits a thread above `node`: a new empty node takes `node`'s place
  /// among its siblings and `node` becomes its only child.
  pub fn insert_parent(&mut self, node: NodeId) -> Result<NodeId, EditError> {
    let parent = self.node(node)?.parent().ok_or(EditError::RootNode)?;
    let pos = self
      .detach(node)
      .ok_or(EditError::UnknownNode(node))?;

    let knot = self.alloc("");
    self.nodes[knot].parent = Some(parent);
    self.nodes[knot].children.push(node);
    self.nodes[node].parent = Some(knot);
    self.nodes[parent].children.insert(pos, knot);
    log::debug!("inserted {knot} above {node}");

    self.emit(SkeinEvent::TreeChanged);
    self.mark_modified();
    debug_assert!(self.validate().is_ok());
    Ok(knot)
  }

  /// Deletes `node` and everything below it.
  pub fn remove_subtree(&mut self, node: NodeId) -> Result<(), EditError> {
    self.remove_subtree_quiet(node)?;
    self.emit(SkeinEvent::TreeChanged);
    debug_assert!(self.validate().is_ok());
    Ok(())
  }

  /// Deletes `node` alone; its children move up into its position, keeping
  /// their order.
  pub fn remove_single(&mut self, node: NodeId) -> Result<(), EditError> {
    let parent = self.node(node)?.parent().ok_or(EditError::RootNode)?;
    self.release_cursors(node);

    let pos = self
      .detach(node)
      .ok_or(EditError::UnknownNode(node))?;
    let children = std::mem::take(&mut self.nodes[node].children);
    for &child in &children {
      self.nodes[child].parent = Some(parent);
    }
    self.nodes[parent]
      .children
      .insert_many(pos, children.iter().copied());
    self.destroy_subtree(node);
    log::debug!("removed {node}, {} children moved up", children.len());

    self.emit(SkeinEvent::TreeChanged);
    self.mark_modified();
    debug_assert!(self.validate().is_ok());
    Ok(())
  }

  /// Locks `node` and every ancestor up to the root.
  pub fn lock(&mut self, node: NodeId) -> Result<(), EditError> {
    self.node(node)?;
    let mut next = Some(node);
    while let Some(id) = next {
      let node = &mut self.nodes[id];
      node.set_locked(true);
      next = node.parent();
    }

    self.emit(SkeinEvent::LockChanged);
    self.mark_modified();
    debug_assert!(self.validate().is_ok());
    Ok(())
  }

  /// Unlocks `node` and every descendant.
  pub fn unlock(&mut self, node: NodeId) -> Result<(), EditError> {
    self.node(node)?;
    let mut stack = vec![node];
    while let Some(id) = stack.pop() {
      let node = &mut self.nodes[id];
      node.set_locked(false);
      stack.extend(node.children.iter().copied());
    }

    self.emit(SkeinEvent::LockChanged);
    self.mark_modified();
    debug_assert!(self.validate().is_ok());
    Ok(())
  }

  /// Locks the whole unbranched thread `node` belongs to.
  pub fn lock_thread(&mut self, node: NodeId) -> Result<(), EditError> {
    let bottom = self.thread_bottom(node)?;
    self.lock(bottom)
  }

  /// Unlocks the whole unbranched thread `node` belongs to, and everything
  /// hanging below it.
  pub fn unlock_thread(&mut self, node: NodeId) -> Result<(), EditError> {
    let top = self.thread_top(node)?;
    self.unlock(top)
  }

  /// Deletes every unlocked subtree below `node`. Locked children are kept
  /// and trimmed in turn.
  ///
  /// `min_score` is accepted for compatibility with older front ends; only
  /// the lock flag decides what survives.
  pub fn trim(&mut self, node: NodeId, min_score: i32) -> Result<usize, EditError> {
    self.node(node)?;
    log::debug!("trimming below {node} (min score {min_score} ignored)");

    let mut removed = 0;
    let mut stack = vec![node];
    while let Some(id) = stack.pop() {
      let children: Vec<NodeId> = self.nodes[id].children().to_vec();
      for child in children {
        if self.nodes[child].locked() {
          stack.push(child);
        } else {
          self.remove_subtree_quiet(child)?;
          removed += 1;
        }
      }
    }

    self.emit(SkeinEvent::TreeChanged);
    self.mark_modified();
    debug_assert!(self.validate().is_ok());
    Ok(removed)
  }

  /// Approves `node`'s transcript, and every ancestor's too when `all` is
  /// set.
  pub fn bless(&mut self, node: NodeId, all: bool) -> Result<(), EditError> {
    self.node(node)?;
    let mut next = Some(node);
    while let Some(id) = next {
      let node = &mut self.nodes[id];
      node.bless();
      next = if all { node.parent() } else { None };
    }

    self.emit(SkeinEvent::NodeColorChanged);
    self.mark_modified();
    debug_assert!(self.validate().is_ok());
    Ok(())
  }

  /// Whether blessing `node` (and its ancestors, when `all` is set) would
  /// change anything.
  pub fn can_bless(&self, node: NodeId, all: bool) -> bool {
    if all {
      self
        .ancestors(node)
        .any(|id| self.nodes[id].changed())
    } else {
      self.get(node).is_some_and(|node| node.changed())
    }
  }

  pub fn set_command(&mut self, node: NodeId, command: &str) -> Result<(), EditError> {
    if node == self.root {
      return Err(EditError::RootNode);
    }
    self.node_mut(node)?.set_command(command);
    self.emit(SkeinEvent::NodeTextChanged);
    self.mark_modified();
    Ok(())
  }

  pub fn set_label(&mut self, node: NodeId, label: &str) -> Result<(), EditError> {
    self.node_mut(node)?.set_label(label);
    self.emit(SkeinEvent::NodeTextChanged);
    self.mark_modified();
    Ok(())
  }

  pub fn set_transcript(&mut self, node: NodeId, text: &str) -> Result<(), EditError> {
    if self.node_mut(node)?.set_transcript(text) {
      self.emit(SkeinEvent::NodeColorChanged);
    }
    self.mark_modified();
    Ok(())
  }

  pub fn set_expected(&mut self, node: NodeId, text: &str) -> Result<(), EditError> {
    self.node_mut(node)?.set_expected(text);
    self.emit(SkeinEvent::NodeColorChanged);
    self.mark_modified();
    Ok(())
  }

  fn remove_subtree_quiet(&mut self, node: NodeId) -> Result<(), EditError> {
    if self.node(node)?.is_root() {
      return Err(EditError::RootNode);
    }
    self.release_cursors(node);
    self.destroy_subtree(node);
    log::debug!("removed subtree {node}");
    self.mark_modified();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use quickcheck::TestResult;

  use super::*;
  use crate::navigate::CommandSink;

  struct Discard;

  impl CommandSink for Discard {
    fn restart(&mut self) {}

    fn feed(&mut self, _command: &str) {}
  }

  fn thread(skein: &mut Skein, commands: &[&str]) -> Vec<NodeId> {
    commands.iter().map(|command| skein.new_command(command)).collect()
  }

  /// Builds a tree where node `i + 1` hangs under an earlier node chosen by
  /// `shape[i]`.
  fn shaped(shape: &[u8]) -> (Skein, Vec<NodeId>) {
    let mut skein = Skein::new();
    let mut ids = vec![skein.root()];
    for (i, pick) in shape.iter().enumerate() {
      let parent = ids[*pick as usize % ids.len()];
      let id = skein.add_child(parent).unwrap();
      skein.set_command(id, &format!("c{i}")).unwrap();
      ids.push(id);
    }
    (skein, ids)
  }

  #[test]
  fn add_child_keeps_cursors() {
    let mut skein = Skein::new();
    let a = skein.new_command("a");
    let child = skein.add_child(a).unwrap();
    assert_eq!(skein.current(), a);
    assert_eq!(skein.parent(child), Some(a));
    assert_eq!(skein.get(child).unwrap().command(), "");
  }

  #[test]
  fn insert_parent_keeps_sibling_position() {
    let mut skein = Skein::new();
    let root = skein.root();
    let a = skein.add_child(root).unwrap();
    let b = skein.add_child(root).unwrap();
    let c = skein.add_child(root).unwrap();

    let knot = skein.insert_parent(b).unwrap();
    assert_eq!(skein.children(root), &[a, knot, c]);
    assert_eq!(skein.children(knot), &[b]);
    assert_eq!(skein.parent(b), Some(knot));
    assert_eq!(skein.insert_parent(root), Err(EditError::RootNode));
  }

  #[test]
  fn remove_single_splices_children_in_order() {
    let mut skein = Skein::new();
    let root = skein.root();
    let a = skein.add_child(root).unwrap();
    let b = skein.add_child(root).unwrap();
    let c = skein.add_child(root).unwrap();
    let b1 = skein.add_child(b).unwrap();
    let b2 = skein.add_child(b).unwrap();

    skein.remove_single(b).unwrap();
    assert_eq!(skein.children(root), &[a, b1, b2, c]);
    assert_eq!(skein.parent(b1), Some(root));
    assert!(!skein.contains(b));
  }

  #[test]
  fn root_cannot_be_removed() {
    let mut skein = Skein::new();
    let root = skein.root();
    skein.new_command("a");
    let before = skein.dump();

    assert_eq!(skein.remove_subtree(root), Err(EditError::RootNode));
    assert_eq!(skein.remove_single(root), Err(EditError::RootNode));
    assert_eq!(skein.dump(), before);
  }

  #[test]
  fn stale_handles_are_rejected() {
    let mut skein = Skein::new();
    let a = skein.new_command("a");
    skein.remove_subtree(a).unwrap();

    assert_eq!(skein.remove_subtree(a), Err(EditError::UnknownNode(a)));
    assert_eq!(skein.lock(a), Err(EditError::UnknownNode(a)));
    assert_eq!(skein.add_child(a), Err(EditError::UnknownNode(a)));
    assert!(!skein.can_bless(a, true));
  }

  #[test]
  fn removing_current_thread_resets_cursors() {
    let mut skein = Skein::new();
    let nodes = thread(&mut skein, &["a", "b", "c"]);
    skein.remove_subtree(nodes[1]).unwrap();
    assert_eq!(skein.current(), skein.root());
    assert_eq!(skein.played(), skein.root());
    assert_eq!(skein.len(), 2);
  }

  #[test]
  fn removing_played_branch_resets_cursors() {
    let mut skein = Skein::new();
    let root = skein.root();
    let x = skein.new_command("x");
    skein.set_current(root).unwrap();
    let y = skein.add_child(root).unwrap();
    skein.set_current(y).unwrap();
    assert_eq!(skein.played(), x);
    assert!(!skein.in_thread(x, skein.current()));

    skein.remove_subtree(x).unwrap();
    assert_eq!(skein.current(), root);
    assert_eq!(skein.played(), root);
    assert!(skein.contains(y));
  }

  #[test]
  fn removing_off_thread_keeps_cursors() {
    let mut skein = Skein::new();
    let side = skein.new_command("side");
    skein.reset(true);
    let main = skein.new_command("main");

    skein.remove_single(side).unwrap();
    assert_eq!(skein.current(), main);
    assert_eq!(skein.played(), main);
  }

  #[test]
  fn lock_climbs_unlock_descends() {
    let mut skein = Skein::new();
    let nodes = thread(&mut skein, &["a", "b", "c"]);

    skein.lock(nodes[1]).unwrap();
    assert!(skein.get(skein.root()).unwrap().locked());
    assert!(skein.get(nodes[0]).unwrap().locked());
    assert!(skein.get(nodes[1]).unwrap().locked());
    assert!(!skein.get(nodes[2]).unwrap().locked());

    skein.lock(nodes[2]).unwrap();
    skein.unlock(nodes[1]).unwrap();
    assert!(skein.get(nodes[0]).unwrap().locked());
    assert!(!skein.get(nodes[1]).unwrap().locked());
    assert!(!skein.get(nodes[2]).unwrap().locked());
  }

  #[test]
  fn trim_keeps_locked_thread() {
    let mut skein = Skein::new();
    let root = skein.root();
    let nodes = thread(&mut skein, &["open door", "go north"]);
    skein.lock(skein.current()).unwrap();
    skein.reset(true);
    let stray = skein.new_command("xyzzy");

    assert_eq!(skein.trim(root, -1), Ok(1));
    assert!(!skein.contains(stray));
    assert!(skein.contains(nodes[0]));
    assert!(skein.contains(nodes[1]));
    assert_eq!(skein.current(), root);
  }

  #[test]
  fn trim_descends_into_locked_children() {
    let mut skein = Skein::new();
    let root = skein.root();
    let nodes = thread(&mut skein, &["a", "b"]);
    skein.lock(nodes[0]).unwrap();
    skein.reset(true);

    assert_eq!(skein.trim(root, -1), Ok(1));
    assert!(skein.contains(nodes[0]));
    assert!(!skein.contains(nodes[1]));
  }

  #[test]
  fn thread_lock_helpers() {
    let mut skein = Skein::new();
    let nodes = thread(&mut skein, &["a", "b", "c"]);

    skein.lock_thread(nodes[0]).unwrap();
    assert!(nodes.iter().all(|&id| skein.get(id).unwrap().locked()));

    skein.unlock_thread(nodes[2]).unwrap();
    assert!(nodes.iter().all(|&id| !skein.get(id).unwrap().locked()));
  }

  #[test]
  fn bless_scenario() {
    let mut skein = Skein::new();
    let node = skein.new_command("look");

    skein.set_transcript(node, "You see a door.").unwrap();
    skein.set_expected(node, "You see a door.").unwrap();
    assert!(!skein.get(node).unwrap().changed());

    skein.set_transcript(node, "You see a window.").unwrap();
    assert!(skein.get(node).unwrap().changed());
    assert!(skein.can_bless(node, false));

    skein.bless(node, false).unwrap();
    let blessed = skein.get(node).unwrap();
    assert!(!blessed.changed());
    assert_eq!(blessed.expected(), "You see a window.");
    assert!(!skein.can_bless(node, false));
  }

  #[test]
  fn bless_all_reaches_ancestors() {
    let mut skein = Skein::new();
    let nodes = thread(&mut skein, &["a", "b"]);
    skein.set_transcript(nodes[0], "first").unwrap();
    skein.set_transcript(nodes[1], "second").unwrap();

    skein.bless(nodes[1], false).unwrap();
    assert!(!skein.can_bless(nodes[1], false));
    assert!(skein.can_bless(nodes[1], true));

    skein.bless(nodes[1], true).unwrap();
    assert!(!skein.can_bless(nodes[1], true));
    assert_eq!(skein.get(nodes[0]).unwrap().expected(), "first");
  }

  #[test]
  fn root_command_is_fixed() {
    let mut skein = Skein::new();
    let root = skein.root();
    assert_eq!(skein.set_command(root, "start"), Err(EditError::RootNode));
  }

  quickcheck::quickcheck! {
      fn lock_and_unlock_closure(shape: Vec<u8>, locks: Vec<(bool, u8)>) -> bool {
          let (mut skein, ids) = shaped(&shape);
          for (lock, pick) in locks {
              let id = ids[pick as usize % ids.len()];
              if lock {
                  skein.lock(id).unwrap();
                  if !skein.ancestors(id).all(|a| skein.get(a).unwrap().locked()) {
                      return false;
                  }
              } else {
                  skein.unlock(id).unwrap();
                  if skein.traverse_from(id).any(|(_, node)| node.locked()) {
                      return false;
                  }
              }
          }
          skein.validate().is_ok()
      }

      fn trim_leaves_only_locked_paths(shape: Vec<u8>, locks: Vec<u8>) -> bool {
          let (mut skein, ids) = shaped(&shape);
          for pick in locks {
              skein.lock(ids[pick as usize % ids.len()]).unwrap();
          }
          let root = skein.root();
          skein.trim(root, -1).unwrap();
          skein
              .traverse()
              .all(|(id, node)| id == root || node.locked())
              && skein.validate().is_ok()
      }

      fn removal_resets_cursors_on_thread(
          shape: Vec<u8>,
          played: u8,
          cur: u8,
          victim: u8,
          single: bool
      ) -> TestResult {
          let (mut skein, ids) = shaped(&shape);
          let victim = ids[victim as usize % ids.len()];
          if victim == skein.root() {
              return TestResult::discard();
          }
          skein.play_to(ids[played as usize % ids.len()], &mut Discard).unwrap();
          skein.set_current(ids[cur as usize % ids.len()]).unwrap();
          let on_thread = skein.in_thread(victim, skein.current())
              || skein.in_thread(victim, skein.played());
          let (current, played) = (skein.current(), skein.played());

          if single {
              skein.remove_single(victim).unwrap();
          } else {
              skein.remove_subtree(victim).unwrap();
          }

          let root = skein.root();
          let ok = if on_thread {
              skein.current() == root && skein.played() == root
          } else {
              skein.current() == current && skein.played() == played
          };
          TestResult::from_bool(ok && skein.validate().is_ok())
      }
  }
}
