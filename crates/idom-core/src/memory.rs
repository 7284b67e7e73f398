//! Arena-backed host tree implementing the [`Patcher`] contract.
//!
//! It is a stand-in for a real incremental patcher: siblings are matched
//! linearly from the cursor with the installed [`NodeMatcher`], matched nodes
//! are moved into place, unmatched requests create nodes and whatever is left
//! unvisited when an element closes is removed.

use std::fmt::Write as _;

use crate::error::PatchError;
use crate::patcher::{BackRef, NodeMatcher, NodeSkipHandler, NodeType, PatchMode, Patcher};
use crate::NodeId;

/// Counters of primitive calls and host mutations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatcherStats {
    pub opens: usize,
    pub closes: usize,
    pub texts: usize,
    pub attrs: usize,
    pub created: usize,
    pub moved: usize,
    pub updated: usize,
    pub removed: usize,
}

impl PatcherStats {
    /// Primitive calls that could have changed the host tree.
    pub fn primitive_calls(&self) -> usize {
        self.opens + self.closes + self.texts + self.attrs
    }

    pub fn mutations(&self) -> usize {
        self.created + self.moved + self.updated + self.removed
    }
}

struct HostNode {
    node_type: NodeType,
    key: Option<String>,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    backref: Option<BackRef>,
    skip_handler: Option<NodeSkipHandler>,
}

impl HostNode {
    fn new(node_type: NodeType, key: Option<String>, parent: Option<NodeId>) -> Self {
        Self {
            node_type,
            key,
            attrs: Vec::new(),
            text: None,
            parent,
            children: Vec::new(),
            backref: None,
            skip_handler: None,
        }
    }
}

struct Frame {
    element: NodeId,
    cursor: usize,
    /// Exclusive end of the children this frame may consume; `None` means all.
    limit: Option<usize>,
    pending_attrs: Vec<(String, String)>,
}

impl Frame {
    fn new(element: NodeId, cursor: usize, limit: Option<usize>) -> Self {
        Self {
            element,
            cursor,
            limit,
            pending_attrs: Vec::new(),
        }
    }
}

struct Transaction {
    mode: PatchMode,
    root: NodeId,
    frames: Vec<Frame>,
}

fn exact_match(
    _node: NodeId,
    requested: &NodeType,
    existing: &NodeType,
    proposed_key: Option<&str>,
    existing_key: Option<&str>,
) -> bool {
    requested == existing && proposed_key == existing_key
}

pub struct MemoryPatcher {
    nodes: Vec<Option<HostNode>>,
    root: NodeId,
    matcher: NodeMatcher,
    transaction: Option<Transaction>,
    stats: PatcherStats,
}

impl Default for MemoryPatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPatcher {
    /// Creates a tree holding a single document node. Keys are compared
    /// exactly until another matcher is installed.
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(HostNode::new(
                NodeType::element("#document"),
                None,
                None,
            ))],
            root: 0,
            matcher: exact_match,
            transaction: None,
            stats: PatcherStats::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn stats(&self) -> PatcherStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = PatcherStats::default();
    }

    /// Live node count, the document node included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id), Some(Some(_)))
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn node_type(&self, id: NodeId) -> Option<NodeType> {
        self.node(id).map(|node| node.node_type.clone())
    }

    pub fn key_of(&self, id: NodeId) -> Option<String> {
        self.node(id).and_then(|node| node.key.clone())
    }

    pub fn text_of(&self, id: NodeId) -> Option<String> {
        self.node(id).and_then(|node| node.text.clone())
    }

    pub fn attr_of(&self, id: NodeId, name: &str) -> Option<String> {
        self.node(id).and_then(|node| {
            node.attrs
                .iter()
                .find(|(attr, _)| attr == name)
                .map(|(_, value)| value.clone())
        })
    }

    pub fn attrs_of(&self, id: NodeId) -> Vec<(String, String)> {
        self.node(id)
            .map(|node| node.attrs.clone())
            .unwrap_or_default()
    }

    /// Appends a node outside of any transaction, e.g. to model content that
    /// some other code placed in the host tree.
    pub fn append_child(
        &mut self,
        parent: NodeId,
        node_type: NodeType,
        key: Option<&str>,
    ) -> Result<NodeId, PatchError> {
        if !self.contains(parent) {
            return Err(PatchError::Missing { id: parent });
        }
        let id = self.alloc(HostNode::new(
            node_type,
            key.map(str::to_owned),
            Some(parent),
        ));
        if let Some(node) = self.node_mut(parent) {
            node.children.push(id);
        }
        Ok(id)
    }

    /// Renders the subtree under `id` one node per line.
    pub fn dump_tree(&self, id: NodeId) -> String {
        let mut output = String::new();
        self.dump_node(&mut output, id, 0);
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Some(node) = self.node(id) else {
            let _ = writeln!(output, "{indent}[{id}] (missing)");
            return;
        };
        match &node.node_type {
            NodeType::Text => {
                let _ = writeln!(
                    output,
                    "{indent}{:?}",
                    node.text.as_deref().unwrap_or_default()
                );
            }
            NodeType::Element(name) => {
                let _ = write!(output, "{indent}<{name}");
                if let Some(key) = &node.key {
                    let _ = write!(output, " key={key:?}");
                }
                for (attr, value) in &node.attrs {
                    let _ = write!(output, " {attr}={value:?}");
                }
                let _ = writeln!(output, ">");
                for child in &node.children {
                    self.dump_node(output, *child, depth + 1);
                }
            }
        }
    }

    fn node(&self, id: NodeId) -> Option<&HostNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut HostNode> {
        self.nodes.get_mut(id).and_then(Option::as_mut)
    }

    fn alloc(&mut self, node: HostNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(node));
        id
    }

    fn transaction_mut(&mut self) -> &mut Transaction {
        self.transaction
            .as_mut()
            .expect("patch primitive called outside a transaction")
    }

    fn transaction(&self) -> &Transaction {
        self.transaction
            .as_ref()
            .expect("patch primitive called outside a transaction")
    }

    fn frame(&self) -> &Frame {
        self.transaction()
            .frames
            .last()
            .expect("transaction has a root frame")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.transaction_mut()
            .frames
            .last_mut()
            .expect("transaction has a root frame")
    }

    fn frame_end(&self, frame: &Frame) -> usize {
        let len = self
            .node(frame.element)
            .map_or(0, |node| node.children.len());
        frame.limit.map_or(len, |limit| limit.min(len))
    }

    fn flush_pending_attrs(&mut self) {
        let frame = self.frame_mut();
        if frame.pending_attrs.is_empty() {
            return;
        }
        let element = frame.element;
        let attrs = std::mem::take(&mut frame.pending_attrs);
        self.commit_attrs(element, attrs);
    }

    fn commit_attrs(&mut self, element: NodeId, attrs: Vec<(String, String)>) {
        let changed = match self.node_mut(element) {
            Some(node) if node.attrs != attrs => {
                node.attrs = attrs;
                true
            }
            _ => false,
        };
        if changed {
            self.stats.updated += 1;
        }
    }

    /// Finds a node matching the request between the cursor and the frame
    /// end, moves it to the cursor or creates it there, and advances the
    /// cursor past it.
    fn place(&mut self, node_type: &NodeType, key: Option<&str>) -> NodeId {
        self.flush_pending_attrs();
        let matcher = self.matcher;
        let (parent, cursor, end) = {
            let frame = self.frame();
            (frame.element, frame.cursor, self.frame_end(frame))
        };
        let siblings = self.children(parent);
        let found = siblings[cursor.min(siblings.len())..end.max(cursor)]
            .iter()
            .position(|&candidate| {
                self.node(candidate).is_some_and(|existing| {
                    matcher(
                        candidate,
                        node_type,
                        &existing.node_type,
                        key,
                        existing.key.as_deref(),
                    )
                })
            })
            .map(|offset| cursor + offset);

        let id = match found {
            Some(index) => {
                let id = siblings[index];
                if index != cursor {
                    if let Some(node) = self.node_mut(parent) {
                        let moved = node.children.remove(index);
                        node.children.insert(cursor, moved);
                    }
                    self.stats.moved += 1;
                }
                id
            }
            None => {
                let id = self.alloc(HostNode::new(
                    node_type.clone(),
                    key.map(str::to_owned),
                    Some(parent),
                ));
                if let Some(node) = self.node_mut(parent) {
                    node.children.insert(cursor, id);
                }
                let frame = self.frame_mut();
                if let Some(limit) = frame.limit.as_mut() {
                    *limit += 1;
                }
                self.stats.created += 1;
                id
            }
        };
        self.frame_mut().cursor += 1;
        id
    }

    /// Removes the children of the current frame that were not visited.
    fn trim_frame(&mut self) {
        let (element, cursor, end) = {
            let frame = self.frame();
            (frame.element, frame.cursor, self.frame_end(frame))
        };
        if cursor >= end {
            return;
        }
        let removed: Vec<NodeId> = match self.node_mut(element) {
            Some(node) => node.children.drain(cursor..end).collect(),
            None => Vec::new(),
        };
        if let Some(limit) = self.frame_mut().limit.as_mut() {
            *limit -= removed.len();
        }
        for id in removed {
            self.free_subtree(id);
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id).and_then(Option::take) {
            self.stats.removed += 1;
            for child in node.children {
                self.free_subtree(child);
            }
        }
    }
}

impl Patcher for MemoryPatcher {
    fn set_matcher(&mut self, matcher: NodeMatcher) {
        self.matcher = matcher;
    }

    fn begin_patch(&mut self, root: NodeId, mode: PatchMode) -> Result<(), PatchError> {
        if self.transaction.is_some() {
            return Err(PatchError::TransactionOpen);
        }
        if !self.contains(root) {
            return Err(PatchError::Missing { id: root });
        }
        let frame = match mode {
            PatchMode::Inner => Frame::new(root, 0, None),
            PatchMode::Outer => {
                let parent = self
                    .parent_of(root)
                    .ok_or(PatchError::Detached { id: root })?;
                let index = self
                    .node(parent)
                    .and_then(|node| node.children.iter().position(|&c| c == root))
                    .ok_or(PatchError::Detached { id: root })?;
                Frame::new(parent, index, Some(index + 1))
            }
        };
        log::trace!("begin {mode:?} patch at node {root}");
        self.transaction = Some(Transaction {
            mode,
            root,
            frames: vec![frame],
        });
        Ok(())
    }

    fn end_patch(&mut self) -> Result<(), PatchError> {
        let open = match &self.transaction {
            None => return Err(PatchError::NoTransaction),
            Some(transaction) => transaction.frames.len().saturating_sub(1),
        };
        if open > 0 {
            self.transaction = None;
            return Err(PatchError::Unbalanced { open });
        }
        if self.transaction().mode == PatchMode::Inner {
            self.flush_pending_attrs();
        }
        self.trim_frame();
        if let Some(transaction) = self.transaction.take() {
            log::trace!(
                "end {:?} patch at node {}",
                transaction.mode,
                transaction.root
            );
        }
        Ok(())
    }

    fn in_patch(&self) -> bool {
        self.transaction.is_some()
    }

    fn open(&mut self, node_type: &NodeType, key: Option<&str>) -> NodeId {
        self.stats.opens += 1;
        let id = self.place(node_type, key);
        self.transaction_mut().frames.push(Frame::new(id, 0, None));
        id
    }

    fn open_start(&mut self, node_type: &NodeType, key: Option<&str>) {
        self.open(node_type, key);
    }

    fn open_end(&mut self) -> NodeId {
        self.apply_attrs();
        self.frame().element
    }

    fn close(&mut self) -> NodeId {
        assert!(
            self.transaction().frames.len() > 1,
            "close() without a matching open()"
        );
        self.stats.closes += 1;
        self.flush_pending_attrs();
        self.trim_frame();
        let frame = self
            .transaction_mut()
            .frames
            .pop()
            .expect("checked above");
        frame.element
    }

    fn text(&mut self, value: &str) -> NodeId {
        self.stats.texts += 1;
        let id = self.place(&NodeType::Text, None);
        let changed = match self.node_mut(id) {
            Some(node) if node.text.as_deref() != Some(value) => {
                node.text = Some(value.to_owned());
                true
            }
            _ => false,
        };
        if changed {
            self.stats.updated += 1;
        }
        id
    }

    fn attr(&mut self, name: &str, value: &str) {
        self.stats.attrs += 1;
        self.frame_mut()
            .pending_attrs
            .push((name.to_owned(), value.to_owned()));
    }

    fn apply_attrs(&mut self) {
        let frame = self.frame_mut();
        let element = frame.element;
        let attrs = std::mem::take(&mut frame.pending_attrs);
        self.commit_attrs(element, attrs);
    }

    fn current_pointer(&self) -> Option<NodeId> {
        let frame = self.frame();
        if frame.cursor >= self.frame_end(frame) {
            return None;
        }
        self.node(frame.element)
            .and_then(|node| node.children.get(frame.cursor).copied())
    }

    fn current_element(&self) -> Option<NodeId> {
        Some(self.frame().element)
    }

    fn skip(&mut self) {
        let end = self.frame_end(self.frame());
        self.frame_mut().cursor = end;
    }

    fn skip_node(&mut self) {
        let end = self.frame_end(self.frame());
        let frame = self.frame_mut();
        if frame.cursor < end {
            frame.cursor += 1;
        }
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent_of(node)?;
        let siblings = &self.node(parent)?.children;
        let index = siblings.iter().position(|&c| c == node)?;
        siblings.get(index + 1).copied()
    }

    fn scan_boundary(&self) -> Option<NodeId> {
        let frame = self.frame();
        let limit = frame.limit?;
        self.node(frame.element)
            .and_then(|node| node.children.get(limit).copied())
    }

    fn back_reference(&self, node: NodeId) -> Option<BackRef> {
        self.node(node).and_then(|node| node.backref.clone())
    }

    fn set_back_reference(&mut self, node: NodeId, backref: BackRef) {
        if let Some(node) = self.node_mut(node) {
            node.backref = Some(backref);
        }
    }

    fn set_node_skip_handler(&mut self, node: NodeId, handler: NodeSkipHandler) {
        if let Some(node) = self.node_mut(node) {
            node.skip_handler = Some(handler);
        }
    }

    fn has_node_skip_handler(&self, node: NodeId) -> bool {
        self.node(node).is_some_and(|node| node.skip_handler.is_some())
    }

    fn take_node_skip_handler(&mut self, node: NodeId) -> Option<NodeSkipHandler> {
        self.node_mut(node).and_then(|node| node.skip_handler.take())
    }
}
