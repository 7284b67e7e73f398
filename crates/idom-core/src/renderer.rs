//! The object templates call into to emit structure.
//!
//! Every renderer owns a [`KeyStack`]; the variants differ only in what they
//! do with primitive calls. [`DefaultRenderer`] forwards them to the patcher,
//! [`SuppressingRenderer`] drops them inside log-only regions and
//! [`ProbeRenderer`] only notes that something would have been emitted.

use crate::error::UsageError;
use crate::key::{encode, KeySegment, KeyStack};
use crate::logger::{SharedLogger, VisualElement};
use crate::patcher::{BackRef, NodeSkipHandler, NodeType, Patcher};
use crate::NodeId;

/// Work a renderer cannot do yet, handed to the renderer its output is
/// eventually replayed on.
pub type DeferredPass = Box<dyn FnOnce(&mut dyn Renderer)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Default,
    Suppressing,
    Probe,
    Buffering,
}

impl RendererKind {
    pub fn name(self) -> &'static str {
        match self {
            RendererKind::Default => "default",
            RendererKind::Suppressing => "suppressing",
            RendererKind::Probe => "probe",
            RendererKind::Buffering => "buffering",
        }
    }
}

pub trait Renderer {
    fn kind(&self) -> RendererKind;

    fn key_stack(&self) -> &KeyStack;
    fn key_stack_mut(&mut self) -> &mut KeyStack;

    fn push_scope(&mut self) {
        self.key_stack_mut().push_scope();
    }

    fn pop_scope(&mut self) {
        self.key_stack_mut().pop_scope();
    }

    fn push_manual_key(&mut self, segment: &KeySegment) {
        self.key_stack_mut().push_manual_key(segment);
    }

    fn pop_manual_key(&mut self) {
        self.key_stack_mut().pop_manual_key();
    }

    fn push_call_key(&mut self, segment: Option<&KeySegment>) -> String {
        self.key_stack_mut().push_call_key(segment)
    }

    fn pop_call_key(&mut self, saved: String) {
        self.key_stack_mut().pop_call_key(saved);
    }

    fn current_top(&self) -> &str {
        self.key_stack().current_top()
    }

    fn open(&mut self, tag: &str, key: Option<&KeySegment>) -> Option<NodeId>;
    fn open_start(&mut self, tag: &str, key: Option<&KeySegment>);
    fn open_end(&mut self) -> Option<NodeId>;
    fn close(&mut self) -> Option<NodeId>;

    /// Opens the root of a stateful element.
    fn element_open(&mut self, tag: &str, key: Option<&KeySegment>) -> Option<NodeId> {
        self.open(tag, key)
    }

    /// Closes the root of a stateful element and fires its pending
    /// after-patch handler, if any. Handlers of nested elements run once the
    /// outermost element root is closed.
    fn element_close(&mut self) -> Option<NodeId>;
    fn text(&mut self, value: &str) -> Option<NodeId>;
    fn attr(&mut self, name: &str, value: &str);
    fn apply_attrs(&mut self);

    fn apply_statics(&mut self, statics: &[(&str, &str)]) {
        for (name, value) in statics {
            self.attr(name, value);
        }
    }

    fn current_pointer(&self) -> Option<NodeId>;
    fn current_element(&self) -> Option<NodeId>;
    fn skip(&mut self);
    fn skip_node(&mut self);

    /// Opens the root of a `{skip}` region. Returns `true` when the existing
    /// node already holds content, which has been skipped; the caller then
    /// closes the node without rendering children.
    fn open_skippable(&mut self, tag: &str, key: Option<&KeySegment>) -> bool;

    /// Read access to the host tree, only for renderers that mutate it.
    fn patcher(&self) -> Option<&dyn Patcher> {
        None
    }

    /// Links the current element to the object that owns it.
    fn attach_back_reference(&mut self, _backref: BackRef) {}

    /// Removes the skip handler parked on the current element, if any.
    fn take_node_skip_handler(&mut self) -> Option<NodeSkipHandler> {
        None
    }

    /// Postpones `pass` until this renderer's output is replayed. Renderers
    /// that are not replayed hand it back to be run right away.
    fn defer(&mut self, label: &str, pass: DeferredPass) -> Result<(), DeferredPass> {
        let _ = label;
        Err(pass)
    }

    fn logger(&self) -> Option<SharedLogger>;
    fn set_logger(&mut self, logger: Option<SharedLogger>);

    fn enter(&mut self, element: &VisualElement, logonly: bool) {
        if let Some(logger) = self.logger() {
            logger.enter(element, logonly);
        }
    }

    fn exit(&mut self) {
        if let Some(logger) = self.logger() {
            logger.exit();
        }
    }

    fn try_verify_log_only(&self, logonly: bool) -> Result<(), UsageError> {
        if logonly && self.logger().is_none() {
            return Err(UsageError::LogOnlyWithoutLogger);
        }
        Ok(())
    }

    fn verify_log_only(&self, logonly: bool) {
        if let Err(err) = self.try_verify_log_only(logonly) {
            panic!("{err}");
        }
    }

    /// Hands back the renderer this one wraps. Only wrapping renderers have
    /// one; everything else fails loudly.
    fn to_default_renderer(&mut self) -> &mut dyn Renderer {
        panic!(
            "{}",
            UsageError::NotWrapping {
                kind: self.kind().name()
            }
        )
    }
}

/// Forwards every primitive to the patcher of the open transaction.
pub struct DefaultRenderer<'p> {
    patcher: &'p mut dyn Patcher,
    keys: KeyStack,
    logger: Option<SharedLogger>,
    open_elements: usize,
    after_patch: Vec<Box<dyn FnOnce()>>,
}

impl<'p> DefaultRenderer<'p> {
    pub fn new(patcher: &'p mut dyn Patcher) -> Self {
        Self::with_key_stack(patcher, KeyStack::new())
    }

    pub fn with_key_stack(patcher: &'p mut dyn Patcher, keys: KeyStack) -> Self {
        Self {
            patcher,
            keys,
            logger: None,
            open_elements: 0,
            after_patch: Vec::new(),
        }
    }

    pub fn with_logger(mut self, logger: Option<SharedLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Key handed to the patcher for a node opened with `key` at the current
    /// stack position.
    pub fn full_key(&self, key: Option<&KeySegment>) -> Option<String> {
        let top = self.keys.current_top();
        let full = match key {
            Some(segment) => {
                let mut full = encode(segment);
                full.push_str(top);
                full
            }
            None => top.to_owned(),
        };
        (!full.is_empty()).then_some(full)
    }
}

impl Renderer for DefaultRenderer<'_> {
    fn kind(&self) -> RendererKind {
        RendererKind::Default
    }

    fn key_stack(&self) -> &KeyStack {
        &self.keys
    }

    fn key_stack_mut(&mut self) -> &mut KeyStack {
        &mut self.keys
    }

    fn open(&mut self, tag: &str, key: Option<&KeySegment>) -> Option<NodeId> {
        let full = self.full_key(key);
        log::trace!("open <{tag}> key={full:?}");
        Some(
            self.patcher
                .open(&NodeType::element(tag.to_owned()), full.as_deref()),
        )
    }

    fn open_start(&mut self, tag: &str, key: Option<&KeySegment>) {
        let full = self.full_key(key);
        log::trace!("open_start <{tag}> key={full:?}");
        self.patcher
            .open_start(&NodeType::element(tag.to_owned()), full.as_deref());
    }

    fn open_end(&mut self) -> Option<NodeId> {
        Some(self.patcher.open_end())
    }

    fn close(&mut self) -> Option<NodeId> {
        Some(self.patcher.close())
    }

    fn element_open(&mut self, tag: &str, key: Option<&KeySegment>) -> Option<NodeId> {
        self.open_elements += 1;
        self.open(tag, key)
    }

    fn element_close(&mut self) -> Option<NodeId> {
        let node = self.patcher.close();
        let handler = self
            .patcher
            .back_reference(node)
            .and_then(|backref| backref.take_patch_handler());
        if let Some(handler) = handler {
            self.after_patch.push(handler);
        }
        self.open_elements = self.open_elements.saturating_sub(1);
        if self.open_elements == 0 && !self.after_patch.is_empty() {
            log::debug!(
                "firing {} after-patch handler(s) at node {node}",
                self.after_patch.len()
            );
            for handler in std::mem::take(&mut self.after_patch) {
                handler();
            }
        }
        Some(node)
    }

    fn text(&mut self, value: &str) -> Option<NodeId> {
        Some(self.patcher.text(value))
    }

    fn attr(&mut self, name: &str, value: &str) {
        self.patcher.attr(name, value);
    }

    fn apply_attrs(&mut self) {
        self.patcher.apply_attrs();
    }

    fn current_pointer(&self) -> Option<NodeId> {
        self.patcher.current_pointer()
    }

    fn current_element(&self) -> Option<NodeId> {
        self.patcher.current_element()
    }

    fn skip(&mut self) {
        self.patcher.skip();
    }

    fn skip_node(&mut self) {
        self.patcher.skip_node();
    }

    fn open_skippable(&mut self, tag: &str, key: Option<&KeySegment>) -> bool {
        self.open(tag, key);
        if self.patcher.current_pointer().is_some() {
            self.patcher.skip();
            return true;
        }
        false
    }

    fn patcher(&self) -> Option<&dyn Patcher> {
        Some(&*self.patcher)
    }

    fn attach_back_reference(&mut self, backref: BackRef) {
        if let Some(node) = self.patcher.current_element() {
            self.patcher.set_back_reference(node, backref);
        }
    }

    fn take_node_skip_handler(&mut self) -> Option<NodeSkipHandler> {
        let node = self.patcher.current_element()?;
        self.patcher.take_node_skip_handler(node)
    }

    fn logger(&self) -> Option<SharedLogger> {
        self.logger.clone()
    }

    fn set_logger(&mut self, logger: Option<SharedLogger>) {
        self.logger = logger;
    }
}

/// Used inside log-only regions: keeps the key stack moving exactly as the
/// wrapped renderer would, but never touches the host tree.
pub struct SuppressingRenderer<'a> {
    inner: &'a mut dyn Renderer,
    keys: KeyStack,
    logger: Option<SharedLogger>,
}

impl<'a> SuppressingRenderer<'a> {
    pub fn new(inner: &'a mut dyn Renderer) -> Self {
        let keys = inner.key_stack().clone();
        let logger = inner.logger();
        Self {
            inner,
            keys,
            logger,
        }
    }
}

impl Renderer for SuppressingRenderer<'_> {
    fn kind(&self) -> RendererKind {
        RendererKind::Suppressing
    }

    fn key_stack(&self) -> &KeyStack {
        &self.keys
    }

    fn key_stack_mut(&mut self) -> &mut KeyStack {
        &mut self.keys
    }

    fn open(&mut self, _tag: &str, _key: Option<&KeySegment>) -> Option<NodeId> {
        None
    }

    fn open_start(&mut self, _tag: &str, _key: Option<&KeySegment>) {}

    fn open_end(&mut self) -> Option<NodeId> {
        None
    }

    fn close(&mut self) -> Option<NodeId> {
        None
    }

    fn element_close(&mut self) -> Option<NodeId> {
        None
    }

    fn text(&mut self, _value: &str) -> Option<NodeId> {
        None
    }

    fn attr(&mut self, _name: &str, _value: &str) {}

    fn apply_attrs(&mut self) {}

    fn current_pointer(&self) -> Option<NodeId> {
        None
    }

    fn current_element(&self) -> Option<NodeId> {
        None
    }

    fn skip(&mut self) {}

    fn skip_node(&mut self) {}

    fn open_skippable(&mut self, _tag: &str, _key: Option<&KeySegment>) -> bool {
        false
    }

    fn logger(&self) -> Option<SharedLogger> {
        self.logger.clone()
    }

    fn set_logger(&mut self, logger: Option<SharedLogger>) {
        self.logger = logger;
    }

    fn to_default_renderer(&mut self) -> &mut dyn Renderer {
        self.inner.set_logger(self.logger.clone());
        &mut *self.inner
    }
}

/// Answers "would this render anything" without mutating the host tree.
#[derive(Default)]
pub struct ProbeRenderer {
    keys: KeyStack,
    logger: Option<SharedLogger>,
    rendered: bool,
}

impl ProbeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn did_render(&self) -> bool {
        self.rendered
    }
}

impl Renderer for ProbeRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Probe
    }

    fn key_stack(&self) -> &KeyStack {
        &self.keys
    }

    fn key_stack_mut(&mut self) -> &mut KeyStack {
        &mut self.keys
    }

    fn open(&mut self, _tag: &str, _key: Option<&KeySegment>) -> Option<NodeId> {
        self.rendered = true;
        None
    }

    fn open_start(&mut self, _tag: &str, _key: Option<&KeySegment>) {
        self.rendered = true;
    }

    fn open_end(&mut self) -> Option<NodeId> {
        self.rendered = true;
        None
    }

    fn close(&mut self) -> Option<NodeId> {
        self.rendered = true;
        None
    }

    fn element_close(&mut self) -> Option<NodeId> {
        self.rendered = true;
        None
    }

    fn text(&mut self, value: &str) -> Option<NodeId> {
        if !value.is_empty() {
            self.rendered = true;
        }
        None
    }

    fn attr(&mut self, _name: &str, _value: &str) {
        self.rendered = true;
    }

    fn apply_attrs(&mut self) {}

    fn current_pointer(&self) -> Option<NodeId> {
        None
    }

    fn current_element(&self) -> Option<NodeId> {
        None
    }

    fn skip(&mut self) {
        self.rendered = true;
    }

    fn skip_node(&mut self) {
        self.rendered = true;
    }

    // There is no host node to compare against: count the root as rendered
    // and never skip.
    fn open_skippable(&mut self, _tag: &str, _key: Option<&KeySegment>) -> bool {
        self.rendered = true;
        false
    }

    fn logger(&self) -> Option<SharedLogger> {
        self.logger.clone()
    }

    fn set_logger(&mut self, logger: Option<SharedLogger>) {
        self.logger = logger;
    }
}
