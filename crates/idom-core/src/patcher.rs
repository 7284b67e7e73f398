//! The contract consumed from the external tree-patching engine.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use crate::error::PatchError;
use crate::NodeId;

/// Requested or existing host node type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    Element(Cow<'static, str>),
    Text,
}

impl NodeType {
    pub fn element(name: impl Into<Cow<'static, str>>) -> Self {
        NodeType::Element(name.into())
    }

    /// Name the matcher compares; element names are case-insensitive the way
    /// HTML tag names are, so they are folded to lowercase here.
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            NodeType::Element(name) if name.bytes().any(|b| b.is_ascii_uppercase()) => {
                Cow::Owned(name.to_ascii_lowercase())
            }
            NodeType::Element(name) => Cow::Borrowed(name.as_ref()),
            NodeType::Text => Cow::Borrowed("#text"),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// `matches(node, requested, existing, proposed_key, existing_key)`.
pub type NodeMatcher = fn(NodeId, &NodeType, &NodeType, Option<&str>, Option<&str>) -> bool;

/// How a transaction treats its root node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    /// The render closure produces the root node itself.
    Outer,
    /// The render closure produces the root node's children.
    Inner,
}

/// Opaque link from a host node back to the logical object that owns it.
pub trait BackReference: Any {
    /// Identity key the owner was created with.
    fn identity_key(&self) -> String;

    /// Removes and returns the callback armed to run once this node's subtree
    /// has been patched.
    fn take_patch_handler(&self) -> Option<Box<dyn FnOnce()>>;

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

pub type BackRef = Rc<dyn BackReference>;

/// Type-erased skip handler parked on a host node until the element that
/// renders there claims it.
pub type NodeSkipHandler = Rc<dyn Any>;

/// Primitive surface of the incremental patcher. Primitives are only valid
/// between [`Patcher::begin_patch`] and [`Patcher::end_patch`].
pub trait Patcher {
    fn set_matcher(&mut self, matcher: NodeMatcher);

    fn begin_patch(&mut self, root: NodeId, mode: PatchMode) -> Result<(), PatchError>;
    fn end_patch(&mut self) -> Result<(), PatchError>;
    fn in_patch(&self) -> bool;

    /// Matches or creates an element at the current position and descends
    /// into it.
    fn open(&mut self, node_type: &NodeType, key: Option<&str>) -> NodeId;
    fn open_start(&mut self, node_type: &NodeType, key: Option<&str>);
    fn open_end(&mut self) -> NodeId;
    fn close(&mut self) -> NodeId;
    fn text(&mut self, value: &str) -> NodeId;
    fn attr(&mut self, name: &str, value: &str);
    /// Commits the attributes issued since the element was opened.
    fn apply_attrs(&mut self);

    fn current_pointer(&self) -> Option<NodeId>;
    fn current_element(&self) -> Option<NodeId>;
    /// Keeps the remaining children of the current element as they are.
    fn skip(&mut self);
    /// Moves past the node at the current pointer without touching it.
    fn skip_node(&mut self);

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    /// First node a sibling scan must not reach: everything from it on
    /// belongs to an enclosing, already settled patch.
    fn scan_boundary(&self) -> Option<NodeId>;

    fn back_reference(&self, node: NodeId) -> Option<BackRef>;
    fn set_back_reference(&mut self, node: NodeId, backref: BackRef);

    fn set_node_skip_handler(&mut self, node: NodeId, handler: NodeSkipHandler);
    fn has_node_skip_handler(&self, node: NodeId) -> bool;
    fn take_node_skip_handler(&mut self, node: NodeId) -> Option<NodeSkipHandler>;
}
