//! Change notifications emitted by the skein.
//!
//! Every event is delivered synchronously, on the thread that performed the
//! mutation, to each subscribed [`SkeinObserver`]. The notifier also keeps a
//! bounded log of recent events so a consumer that only wakes up once per
//! loop iteration can poll with [`Notifier::events_since`] instead.

use std::{
  collections::VecDeque,
  fmt,
};

use crate::node::NodeId;

pub const DEFAULT_EVENT_LIMIT: usize = 512;

/// Why the skein asks its view to bring a node into sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShowReason {
  /// A command was entered or replayed.
  GotCommand,
  /// The story produced output for the played node.
  GotTranscript,
  /// The author picked the node, e.g. from the label list.
  UserAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkeinEvent {
  /// Nodes were added or removed; views should lay the tree out again.
  TreeChanged,
  /// The current or played cursor moved without structural change.
  ThreadChanged,
  /// A command or label changed.
  NodeTextChanged,
  /// The changed/blessed state of some node differs.
  NodeColorChanged,
  LockChanged,
  ShowNode { reason: ShowReason, node: NodeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggedEvent {
  pub seq:   u64,
  pub event: SkeinEvent,
}

pub trait SkeinObserver {
  fn on_event(&mut self, event: &SkeinEvent);
}

impl<F> SkeinObserver for F
where
  F: FnMut(&SkeinEvent),
{
  fn on_event(&mut self, event: &SkeinEvent) {
    self(event)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

pub struct Notifier {
  observers:        Vec<(ObserverId, Box<dyn SkeinObserver>)>,
  events:           VecDeque<LoggedEvent>,
  next_seq:         u64,
  next_observer_id: u64,
  event_limit:      usize,
}

impl fmt::Debug for Notifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Notifier")
      .field("observers", &self.observers.len())
      .field("events", &self.events.len())
      .field("next_seq", &self.next_seq)
      .field("event_limit", &self.event_limit)
      .finish()
  }
}

impl Default for Notifier {
  fn default() -> Self {
    Self::with_limit(DEFAULT_EVENT_LIMIT)
  }
}

impl Notifier {
  pub fn with_limit(event_limit: usize) -> Self {
    Self {
      observers: Vec::new(),
      events: VecDeque::new(),
      next_seq: 1,
      next_observer_id: 1,
      event_limit: event_limit.max(1),
    }
  }

  pub fn subscribe(&mut self, observer: impl SkeinObserver + 'static) -> ObserverId {
    let id = ObserverId(self.next_observer_id);
    self.next_observer_id = self.next_observer_id.saturating_add(1);
    self.observers.push((id, Box::new(observer)));
    id
  }

  pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
    let before = self.observers.len();
    self.observers.retain(|(observer, _)| *observer != id);
    self.observers.len() != before
  }

  pub fn observer_count(&self) -> usize {
    self.observers.len()
  }

  pub fn emit(&mut self, event: SkeinEvent) {
    log::trace!("skein event: {event:?}");
    for (_, observer) in &mut self.observers {
      observer.on_event(&event);
    }

    let seq = self.next_seq;
    self.next_seq = self.next_seq.saturating_add(1);
    self.events.push_back(LoggedEvent { seq, event });
    while self.events.len() > self.event_limit {
      self.events.pop_front();
    }
  }

  pub fn latest_seq(&self) -> u64 {
    self.next_seq.saturating_sub(1)
  }

  pub fn oldest_seq(&self) -> u64 {
    self
      .events
      .front()
      .map(|logged| logged.seq)
      .unwrap_or(self.next_seq)
  }

  pub fn events_since(&self, seq: u64) -> Vec<LoggedEvent> {
    self
      .events
      .iter()
      .filter(|logged| logged.seq > seq)
      .copied()
      .collect()
  }

  /// Removes and returns every logged event, oldest first.
  pub fn drain(&mut self) -> Vec<SkeinEvent> {
    self.events.drain(..).map(|logged| logged.event).collect()
  }
}
