//! Cursor movement: growing threads from interpreter input and feeding the
//! commands between `played` and `current` back to an interpreter.

use crate::{
  node::{
    NodeId,
    clean_text,
  },
  notify::{
    ShowReason,
    SkeinEvent,
  },
  skein::{
    EditError,
    Skein,
  },
};

/// Something that can run commands against a story, typically an
/// interpreter process owned by the caller.
pub trait CommandSink {
  /// Starts the story again from the beginning.
  fn restart(&mut self);
  /// Sends one command line.
  fn feed(&mut self, command: &str);
}

impl Skein {
  /// Moves to the child of `current` whose command is `command`, creating it
  /// when no such child exists. Identical continuations typed independently
  /// therefore converge on the same node. Both cursors end up on that node.
  pub fn new_command(&mut self, command: &str) -> NodeId {
    let command = clean_text(command);
    let command = command.as_ref();
    let current = self.current;
    let existing = self
      .children(current)
      .iter()
      .copied()
      .find(|&child| self.nodes[child].command() == command);

    let (node, added) = match existing {
      Some(node) => (node, false),
      None => {
        let node = self.append_new(current, command);
        self.nodes[node].set_played(true);
        (node, true)
      },
    };

    self.current = node;
    self.played = node;
    log::trace!("new command {command:?} -> {node} (added: {added})");

    if added {
      self.emit(SkeinEvent::TreeChanged);
    } else {
      self.emit(SkeinEvent::ThreadChanged);
    }
    self.emit(SkeinEvent::ShowNode {
      reason: ShowReason::GotCommand,
      node,
    });
    self.mark_modified();
    debug_assert!(self.validate().is_ok());
    node
  }

  /// Advances `played` one step towards `current` and returns the command
  /// to feed next. Returns `None` when `played` is not a strict ancestor of
  /// `current`, in which case nothing changes.
  pub fn next_command(&mut self) -> Option<String> {
    let next = self.step_towards(self.played, self.current)?;
    self.played = next;
    log::trace!("played advanced to {next}");

    self.emit(SkeinEvent::ThreadChanged);
    self.emit(SkeinEvent::ShowNode {
      reason: ShowReason::GotCommand,
      node:   next,
    });
    Some(self.nodes[next].command().to_string())
  }

  /// Commands on the path from `played` (exclusive) down to `current`
  /// (inclusive), in playing order. Neither cursor moves.
  pub fn commands(&self) -> Vec<String> {
    if !self.is_ancestor(self.played, self.current) {
      return Vec::new();
    }
    let mut commands: Vec<String> = self
      .ancestors(self.current)
      .take_while(|&id| id != self.played)
      .map(|id| self.nodes[id].command().to_string())
      .collect();
    commands.reverse();
    commands
  }

  /// Command entered `history` steps back: 1 is the current node, 2 its
  /// parent and so on. The root is never returned, nor is any depth below 1.
  /// Control whitespace in the command is flattened to spaces.
  pub fn command_from_history(&self, history: i32) -> Option<String> {
    if history < 1 {
      return None;
    }
    let node = self.ancestors(self.current).nth(history as usize - 1)?;
    if node == self.root {
      return None;
    }
    let command = self.nodes[node]
      .command()
      .chars()
      .map(|ch| {
        if matches!(ch, '\u{0008}' | '\u{000C}' | '\n' | '\r' | '\t') {
          ' '
        } else {
          ch
        }
      })
      .collect();
    Some(command)
  }

  /// Highest node of the unbranched thread containing `node`, stopping
  /// below the root.
  pub fn thread_top(&self, node: NodeId) -> Result<NodeId, EditError> {
    let mut node = self.node(node).map(|_| node)?;
    loop {
      let Some(parent) = self.nodes[node].parent() else {
        // Only reachable when asked about the root itself.
        log::warn!("thread_top called on the root node");
        return Ok(node);
      };
      if self.nodes[parent].children().len() != 1 || parent == self.root {
        return Ok(node);
      }
      node = parent;
    }
  }

  /// Lowest node of the unbranched thread starting at `node`.
  pub fn thread_bottom(&self, node: NodeId) -> Result<NodeId, EditError> {
    let mut node = self.node(node).map(|_| node)?;
    while let [only] = self.nodes[node].children() {
      node = *only;
    }
    Ok(node)
  }

  /// Rewinds `played` to the root, and `current` too when `clear_current` is
  /// set.
  pub fn reset(&mut self, clear_current: bool) {
    if clear_current {
      self.current = self.root;
    }
    self.played = self.root;
    self.emit(SkeinEvent::ThreadChanged);
    self.mark_modified();
  }

  pub fn set_current(&mut self, node: NodeId) -> Result<(), EditError> {
    self.node(node)?;
    self.current = node;
    self.emit(SkeinEvent::ThreadChanged);
    self.mark_modified();
    Ok(())
  }

  /// Records the interpreter's response to the played command.
  pub fn update_after_playing(&mut self, transcript: &str) {
    let played = self.played;
    self.nodes[played].set_played(true);
    self.emit(SkeinEvent::NodeColorChanged);
    if !transcript.is_empty() {
      self.nodes[played].set_transcript(transcript);
      self.emit(SkeinEvent::ShowNode {
        reason: ShowReason::GotTranscript,
        node:   played,
      });
      self.mark_modified();
    }
  }

  /// Output callback for a live play session: `command` is what the player
  /// typed (`None` for the opening text), `transcript` what the story
  /// printed in response.
  pub fn record_output(&mut self, command: Option<&str>, transcript: &str) -> NodeId {
    if let Some(command) = command {
      self.new_command(command);
    }
    self.update_after_playing(transcript);
    self.played
  }

  /// Asks views to bring `node` into sight on behalf of the author.
  pub fn show(&mut self, node: NodeId) -> Result<(), EditError> {
    self.node(node)?;
    self.emit(SkeinEvent::ShowNode {
      reason: ShowReason::UserAction,
      node,
    });
    Ok(())
  }

  /// Makes `target` current and feeds `sink` every command needed to reach
  /// it. The run restarts from the root when `target` is not downstream of
  /// what has already been played. Returns how many commands were fed.
  pub fn play_to(&mut self, target: NodeId, sink: &mut impl CommandSink) -> Result<usize, EditError> {
    self.set_current(target)?;
    if !self.in_thread(self.played, target) {
      log::debug!("played node is off the target thread, restarting run");
      self.reset(false);
      sink.restart();
    }

    let mut fed = 0;
    while let Some(command) = self.next_command() {
      sink.feed(&command);
      fed += 1;
    }
    Ok(fed)
  }

  /// Child of `from` on the path down to `to`, if `from` is a strict
  /// ancestor of `to`.
  fn step_towards(&self, from: NodeId, to: NodeId) -> Option<NodeId> {
    self
      .ancestors(to)
      .find(|&id| self.nodes[id].parent() == Some(from))
  }
}
