//! Patcher and logger doubles that remember what they were asked to do.

use std::cell::RefCell;

use idom_core::{
    BackRef, Logger, NodeId, NodeMatcher, NodeSkipHandler, NodeType, PatchError, PatchMode,
    Patcher, VisualElement,
};

/// A host-tree primitive as it reached the patcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchCall {
    Open { tag: String, key: Option<String> },
    Close,
    Text(String),
    Attr { name: String, value: String },
    ApplyAttrs,
    Skip,
    SkipNode,
}

impl PatchCall {
    /// Whether the call opens, closes, or writes content or attributes.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            PatchCall::ApplyAttrs | PatchCall::Skip | PatchCall::SkipNode
        )
    }
}

/// Wraps a patcher and logs every primitive forwarded to it. Reads are not
/// logged.
pub struct RecordingPatcher<P> {
    inner: P,
    calls: Vec<PatchCall>,
}

impl<P: Patcher> RecordingPatcher<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            calls: Vec::new(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    pub fn calls(&self) -> &[PatchCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<PatchCall> {
        std::mem::take(&mut self.calls)
    }

    fn record_open(&mut self, node_type: &NodeType, key: Option<&str>) {
        self.calls.push(PatchCall::Open {
            tag: node_type.name().into_owned(),
            key: key.map(str::to_owned),
        });
    }
}

impl<P: Patcher> Patcher for RecordingPatcher<P> {
    fn set_matcher(&mut self, matcher: NodeMatcher) {
        self.inner.set_matcher(matcher);
    }

    fn begin_patch(&mut self, root: NodeId, mode: PatchMode) -> Result<(), PatchError> {
        self.inner.begin_patch(root, mode)
    }

    fn end_patch(&mut self) -> Result<(), PatchError> {
        self.inner.end_patch()
    }

    fn in_patch(&self) -> bool {
        self.inner.in_patch()
    }

    fn open(&mut self, node_type: &NodeType, key: Option<&str>) -> NodeId {
        self.record_open(node_type, key);
        self.inner.open(node_type, key)
    }

    fn open_start(&mut self, node_type: &NodeType, key: Option<&str>) {
        self.record_open(node_type, key);
        self.inner.open_start(node_type, key);
    }

    fn open_end(&mut self) -> NodeId {
        self.calls.push(PatchCall::ApplyAttrs);
        self.inner.open_end()
    }

    fn close(&mut self) -> NodeId {
        self.calls.push(PatchCall::Close);
        self.inner.close()
    }

    fn text(&mut self, value: &str) -> NodeId {
        self.calls.push(PatchCall::Text(value.to_owned()));
        self.inner.text(value)
    }

    fn attr(&mut self, name: &str, value: &str) {
        self.calls.push(PatchCall::Attr {
            name: name.to_owned(),
            value: value.to_owned(),
        });
        self.inner.attr(name, value);
    }

    fn apply_attrs(&mut self) {
        self.calls.push(PatchCall::ApplyAttrs);
        self.inner.apply_attrs();
    }

    fn current_pointer(&self) -> Option<NodeId> {
        self.inner.current_pointer()
    }

    fn current_element(&self) -> Option<NodeId> {
        self.inner.current_element()
    }

    fn skip(&mut self) {
        self.calls.push(PatchCall::Skip);
        self.inner.skip();
    }

    fn skip_node(&mut self) {
        self.calls.push(PatchCall::SkipNode);
        self.inner.skip_node();
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.inner.next_sibling(node)
    }

    fn scan_boundary(&self) -> Option<NodeId> {
        self.inner.scan_boundary()
    }

    fn back_reference(&self, node: NodeId) -> Option<BackRef> {
        self.inner.back_reference(node)
    }

    fn set_back_reference(&mut self, node: NodeId, backref: BackRef) {
        self.inner.set_back_reference(node, backref);
    }

    fn set_node_skip_handler(&mut self, node: NodeId, handler: NodeSkipHandler) {
        self.inner.set_node_skip_handler(node, handler);
    }

    fn has_node_skip_handler(&self, node: NodeId) -> bool {
        self.inner.has_node_skip_handler(node)
    }

    fn take_node_skip_handler(&mut self, node: NodeId) -> Option<NodeSkipHandler> {
        self.inner.take_node_skip_handler(node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Enter { name: String, logonly: bool },
    Exit,
}

/// Logger collecting enter/exit events.
#[derive(Default)]
pub struct RecordingLogger {
    events: RefCell<Vec<LogEvent>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.borrow().clone()
    }

    /// Names of entered elements, in order.
    pub fn entered(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                LogEvent::Enter { name, .. } => Some(name.clone()),
                LogEvent::Exit => None,
            })
            .collect()
    }

    /// Every exit closes an earlier enter and nothing is left open.
    pub fn is_balanced(&self) -> bool {
        let mut depth = 0usize;
        for event in self.events.borrow().iter() {
            match event {
                LogEvent::Enter { .. } => depth += 1,
                LogEvent::Exit => match depth.checked_sub(1) {
                    Some(next) => depth = next,
                    None => return false,
                },
            }
        }
        depth == 0
    }
}

impl Logger for RecordingLogger {
    fn enter(&self, element: &VisualElement, logonly: bool) {
        self.events.borrow_mut().push(LogEvent::Enter {
            name: element.name.clone(),
            logonly,
        });
    }

    fn exit(&self) {
        self.events.borrow_mut().push(LogEvent::Exit);
    }
}
