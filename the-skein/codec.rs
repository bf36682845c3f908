//! Reading and writing `.skein` XML files.
//!
//! The layout is fixed by files already in the wild:
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <Skein rootNode="node-1" xmlns="http://www.logicalshift.org.uk/IF/Skein">
//!   <generator>the-skein</generator>
//!   <activeNode nodeId="node-2"/>
//!   <item nodeId="node-1">
//!     <command xml:space="preserve">- start -</command>
//!     ...
//!     <temporary score="0">YES</temporary>
//!     <children>
//!       <child nodeId="node-2"/>
//!     </children>
//!   </item>
//!   ...
//! </Skein>
//! ```
//!
//! `<temporary>` holds the inverse of the lock flag. `<played>` and
//! `<changed>` are written for other tools; on load `changed` is recomputed
//! from the text and `played` only seeds the played cursor.

use std::{
  collections::{
    HashMap,
    HashSet,
  },
  fmt::Write as _,
  fs,
  io,
  path::{
    Path,
    PathBuf,
  },
};

use quick_xml::escape::escape;
use roxmltree::Document as XmlDocument;
use slotmap::HopSlotMap;
use thiserror::Error;

use crate::{
  config::SkeinConfig,
  node::{
    Node,
    NodeId,
    ROOT_COMMAND,
    is_xml_char,
  },
  notify::SkeinEvent,
  skein::Skein,
};

pub const SKEIN_NAMESPACE: &str = "http://www.logicalshift.org.uk/IF/Skein";

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
  #[error("failed to read '{path}': {source}")]
  Read {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("failed to save '{path}': {source}")]
  Write {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("malformed XML: {0}")]
  Xml(#[from] roxmltree::Error),
  #[error("bad skein file: {0}")]
  Format(#[from] FormatError),
}

/// The document is well-formed XML but not a usable skein.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
  #[error("<Skein> element not found, found <{0}>")]
  NotASkein(String),
  #[error("rootNode attribute not found")]
  MissingRootAttribute,
  #[error("<item> without a nodeId attribute")]
  MissingNodeId,
  #[error("node id {0:?} is used by more than one item")]
  DuplicateId(String),
  #[error("reference to unknown node id {0:?}")]
  UnknownId(String),
  #[error("node {0:?} is listed as a child more than once")]
  SharedChild(String),
  #[error("root node {0:?} is listed as a child")]
  RootIsChild(String),
  #[error("invalid score {score:?} on node {id:?}")]
  InvalidScore { id: String, score: String },
}

impl Skein {
  /// Reads a skein from `path` with default settings.
  pub fn load(path: &Path) -> Result<Skein> {
    Self::load_with_config(path, &SkeinConfig::default())
  }

  pub fn load_with_config(path: &Path, config: &SkeinConfig) -> Result<Skein> {
    let text = fs::read_to_string(path).map_err(|source| {
      CodecError::Read {
        path: path.to_path_buf(),
        source,
      }
    })?;
    let skein = from_xml(&text, config)?;
    log::debug!("loaded {} nodes from {}", skein.len(), path.display());
    Ok(skein)
  }

  /// Replaces this skein's tree with the one stored at `path`. On failure
  /// the current tree is left exactly as it was. Observers stay subscribed.
  pub fn reload(&mut self, path: &Path) -> Result<()> {
    let config = SkeinConfig {
      generator: self.generator().to_string(),
      ..SkeinConfig::default()
    };
    let loaded = Self::load_with_config(path, &config)?;
    self.replace_tree(loaded);
    Ok(())
  }

  /// Parses a skein from XML text and swaps it in, see [`Skein::reload`].
  pub fn reload_from_str(&mut self, text: &str) -> Result<()> {
    let config = SkeinConfig {
      generator: self.generator().to_string(),
      ..SkeinConfig::default()
    };
    let loaded = from_xml(text, &config)?;
    self.replace_tree(loaded);
    Ok(())
  }

  pub fn save(&mut self, path: &Path) -> Result<()> {
    let xml = to_xml(self);
    fs::write(path, xml).map_err(|source| {
      CodecError::Write {
        path: path.to_path_buf(),
        source,
      }
    })?;
    log::debug!("saved {} nodes to {}", self.len(), path.display());
    self.mark_saved();
    Ok(())
  }

  fn replace_tree(&mut self, loaded: Skein) {
    self.nodes = loaded.nodes;
    self.uids = loaded.uids;
    self.root = loaded.root;
    self.current = loaded.current;
    self.played = loaded.played;
    self.emit(SkeinEvent::TreeChanged);
    self.mark_saved();
    debug_assert!(self.validate().is_ok());
  }
}

/// Escapes text for element content or an attribute value. Characters XML
/// cannot hold are dropped and carriage returns are written as references,
/// so a parser reads back exactly the stored text.
fn xml_text(text: &str) -> String {
  let text: String = text.chars().filter(|&ch| is_xml_char(ch)).collect();
  escape(&text).replace('\r', "&#13;")
}

fn yes_no(value: bool) -> &'static str {
  if value { "YES" } else { "NO" }
}

/// Serializes the whole tree, pre-order, with `current` as the active node.
pub fn to_xml(skein: &Skein) -> String {
  let mut out = String::new();
  let uid = |id: NodeId| skein.get(id).map(Node::uid).unwrap_or_default();

  out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
  let _ = writeln!(
    out,
    "<Skein rootNode=\"{}\" xmlns=\"{SKEIN_NAMESPACE}\">",
    xml_text(uid(skein.root()))
  );
  let _ = writeln!(out, "  <generator>{}</generator>", xml_text(skein.generator()));
  let _ = writeln!(out, "  <activeNode nodeId=\"{}\"/>", xml_text(uid(skein.current())));

  for (_, node) in skein.traverse() {
    write_item(&mut out, skein, node);
  }

  out.push_str("</Skein>\n");
  out
}

fn write_item(out: &mut String, skein: &Skein, node: &Node) {
  let _ = writeln!(out, "  <item nodeId=\"{}\">", xml_text(node.uid()));
  let _ = writeln!(
    out,
    "    <command xml:space=\"preserve\">{}</command>",
    xml_text(node.command())
  );
  let _ = writeln!(
    out,
    "    <result xml:space=\"preserve\">{}</result>",
    xml_text(node.transcript())
  );
  let _ = writeln!(
    out,
    "    <commentary xml:space=\"preserve\">{}</commentary>",
    xml_text(node.expected())
  );
  let _ = writeln!(out, "    <played>{}</played>", yes_no(node.played()));
  let _ = writeln!(out, "    <changed>{}</changed>", yes_no(node.changed()));
  let _ = writeln!(
    out,
    "    <temporary score=\"{}\">{}</temporary>",
    node.score(),
    yes_no(!node.locked())
  );
  if !node.label().is_empty() {
    let _ = writeln!(
      out,
      "    <annotation xml:space=\"preserve\">{}</annotation>",
      xml_text(node.label())
    );
  }
  if !node.children().is_empty() {
    out.push_str("    <children>\n");
    for &child in node.children() {
      if let Some(child) = skein.get(child) {
        let _ = writeln!(out, "      <child nodeId=\"{}\"/>", xml_text(child.uid()));
      }
    }
    out.push_str("    </children>\n");
  }
  out.push_str("  </item>\n");
}

fn is_element(node: &roxmltree::Node, name: &str) -> bool {
  node.is_element() && node.tag_name().name() == name
}

/// All text inside `node`, comments and nested markup skipped.
fn element_text(node: &roxmltree::Node) -> String {
  node
    .descendants()
    .filter(|child| child.is_text())
    .filter_map(|child| child.text())
    .collect()
}

/// Reads `YES`/`NO`, falling back to `default` for anything else.
fn element_bool(node: &roxmltree::Node, default: bool) -> bool {
  match node.text().map(str::trim) {
    Some("YES") => true,
    Some("NO") => false,
    _ => default,
  }
}

struct ItemRecord<'a> {
  id:       NodeId,
  uid:      &'a str,
  children: Vec<&'a str>,
}

/// Parses a skein document. The new tree is assembled completely before it
/// is returned, so a failure never touches an existing skein.
pub fn from_xml(text: &str, config: &SkeinConfig) -> Result<Skein> {
  let doc = XmlDocument::parse(text)?;
  let top = doc.root_element();
  if top.tag_name().name() != "Skein" {
    return Err(FormatError::NotASkein(top.tag_name().name().to_string()).into());
  }
  let root_uid = top
    .attribute("rootNode")
    .ok_or(FormatError::MissingRootAttribute)?;

  let mut nodes: HopSlotMap<NodeId, Node> = HopSlotMap::with_key();
  let mut by_uid: HashMap<&str, NodeId> = HashMap::new();
  let mut records = Vec::new();
  let mut active_uid = None;

  for item in top.children().filter(|child| child.is_element()) {
    match item.tag_name().name() {
      "activeNode" => active_uid = item.attribute("nodeId"),
      "item" => {
        let uid = item.attribute("nodeId").ok_or(FormatError::MissingNodeId)?;
        if by_uid.contains_key(uid) {
          return Err(FormatError::DuplicateId(uid.to_string()).into());
        }
        let (node, children) = read_item(&item, uid)?;
        let id = nodes.insert(node);
        by_uid.insert(uid, id);
        records.push(ItemRecord { id, uid, children });
      },
      _ => {},
    }
  }

  let lookup = |uid: &str| -> std::result::Result<NodeId, FormatError> {
    by_uid
      .get(uid)
      .copied()
      .ok_or_else(|| FormatError::UnknownId(uid.to_string()))
  };

  let root = lookup(root_uid)?;
  if nodes[root].command() != ROOT_COMMAND {
    log::warn!("root command {:?} replaced by {ROOT_COMMAND:?}", nodes[root].command());
    nodes[root].set_command(ROOT_COMMAND);
  }
  let mut claimed = HashSet::new();
  for record in &records {
    for &child_uid in &record.children {
      let child = lookup(child_uid)?;
      if child == root {
        return Err(FormatError::RootIsChild(child_uid.to_string()).into());
      }
      if !claimed.insert(child) {
        return Err(FormatError::SharedChild(child_uid.to_string()).into());
      }
      nodes[child].parent = Some(record.id);
      nodes[record.id].children.push(child);
    }
  }

  // Every node now has at most one parent and the root has none, so walking
  // down from the root cannot loop. Whatever it does not reach is detached.
  let mut reachable = HashSet::with_capacity(nodes.len());
  let mut stack = vec![root];
  while let Some(id) = stack.pop() {
    reachable.insert(id);
    stack.extend(nodes[id].children.iter().copied());
  }
  if reachable.len() != nodes.len() {
    let orphans: Vec<_> = records
      .iter()
      .filter(|record| !reachable.contains(&record.id))
      .collect();
    for record in &orphans {
      log::warn!("dropping node {:?}: not reachable from the root", record.uid);
    }
    nodes.retain(|id, _| reachable.contains(&id));
  }

  let current = match active_uid {
    Some(uid) => lookup(uid)?,
    None => {
      log::warn!("no <activeNode> element, using the root");
      root
    },
  };
  if !reachable.contains(&current) {
    return Err(FormatError::UnknownId(active_uid.unwrap_or(root_uid).to_string()).into());
  }

  close_locks_upward(&mut nodes, &reachable);
  let played = derive_played(&nodes, root, current);

  let skein = Skein::from_parts(nodes, root, current, played, config);
  debug_assert!(skein.validate().is_ok());
  Ok(skein)
}

fn read_item<'a>(
  item: &roxmltree::Node<'a, '_>,
  uid: &'a str,
) -> std::result::Result<(Node, Vec<&'a str>), FormatError> {
  let mut node = Node::with_uid(uid.to_string(), "");
  let mut transcript = String::new();
  let mut expected = String::new();
  let mut children = Vec::new();
  let mut locked = false;

  for child in item.children().filter(|child| child.is_element()) {
    match child.tag_name().name() {
      "command" => node.set_command(&element_text(&child)),
      "annotation" => node.set_label(&element_text(&child)),
      "result" => transcript = element_text(&child),
      "commentary" => expected = element_text(&child),
      "played" => node.set_played(element_bool(&child, false)),
      "temporary" => {
        locked = !element_bool(&child, true);
        if let Some(score) = child.attribute("score") {
          let score = score.trim().parse().map_err(|_| {
            FormatError::InvalidScore {
              id:    uid.to_string(),
              score: score.to_string(),
            }
          })?;
          node.set_score(score);
        }
      },
      "children" => {
        for entry in child.children().filter(|entry| is_element(entry, "child")) {
          children.push(
            entry
              .attribute("nodeId")
              .ok_or(FormatError::MissingNodeId)?,
          );
        }
      },
      // <changed> is derived from the texts.
      _ => {},
    }
  }

  node.set_transcript(&transcript);
  node.set_expected(&expected);
  node.set_locked(locked);
  Ok((node, children))
}

/// A locked node protects its ancestors; files written by other tools do
/// not always say so.
fn close_locks_upward(nodes: &mut HopSlotMap<NodeId, Node>, reachable: &HashSet<NodeId>) {
  let locked: Vec<NodeId> = reachable
    .iter()
    .copied()
    .filter(|&id| nodes[id].locked())
    .collect();
  for id in locked {
    let mut next = nodes[id].parent();
    while let Some(parent) = next {
      if nodes[parent].locked() {
        break;
      }
      log::debug!("locking ancestor {:?} of locked node", nodes[parent].uid());
      nodes[parent].set_locked(true);
      next = nodes[parent].parent();
    }
  }
}

/// How far the recorded run got: descend from the root towards `current`
/// while the next node on that path has been played.
fn derive_played(nodes: &HopSlotMap<NodeId, Node>, root: NodeId, current: NodeId) -> NodeId {
  let mut path = Vec::new();
  let mut next = Some(current);
  while let Some(id) = next {
    path.push(id);
    next = nodes[id].parent();
  }

  let mut played = root;
  for &id in path.iter().rev().skip(1) {
    if !nodes[id].played() {
      break;
    }
    played = id;
  }
  played
}
