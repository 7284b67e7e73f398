//! A renderer that records instead of rendering.
//!
//! Output of a template that may still fail is collected here and replayed on
//! the real renderer only once the template has finished successfully.

use crate::key::{KeySegment, KeyStack};
use crate::logger::{SharedLogger, VisualElement};
use crate::patcher::BackRef;
use crate::renderer::{DeferredPass, Renderer, RendererKind};
use crate::NodeId;

/// One recorded renderer call.
pub enum BufferedOp {
    Open { tag: String, key: Option<KeySegment> },
    ElementOpen { tag: String, key: Option<KeySegment> },
    OpenStart { tag: String, key: Option<KeySegment> },
    OpenEnd,
    OpenSkippable { tag: String, key: Option<KeySegment> },
    Close,
    ElementClose,
    Text(String),
    Attr { name: String, value: String },
    ApplyAttrs,
    Skip,
    SkipNode,
    PushScope,
    PopScope,
    PushManualKey(KeySegment),
    PopManualKey,
    PushCallKey(Option<KeySegment>),
    PopCallKey,
    Enter { element: VisualElement, logonly: bool },
    Exit,
    AttachBackReference(BackRef),
    /// A pass that needs the host tree, run when the buffer is replayed.
    Deferred { label: String, run: DeferredPass },
}

impl std::fmt::Debug for BufferedOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferedOp::Open { tag, key } => write!(f, "Open({tag}, {key:?})"),
            BufferedOp::ElementOpen { tag, key } => write!(f, "ElementOpen({tag}, {key:?})"),
            BufferedOp::OpenStart { tag, key } => write!(f, "OpenStart({tag}, {key:?})"),
            BufferedOp::OpenEnd => f.write_str("OpenEnd"),
            BufferedOp::OpenSkippable { tag, key } => {
                write!(f, "OpenSkippable({tag}, {key:?})")
            }
            BufferedOp::Close => f.write_str("Close"),
            BufferedOp::ElementClose => f.write_str("ElementClose"),
            BufferedOp::Text(value) => write!(f, "Text({value:?})"),
            BufferedOp::Attr { name, value } => write!(f, "Attr({name}={value:?})"),
            BufferedOp::ApplyAttrs => f.write_str("ApplyAttrs"),
            BufferedOp::Skip => f.write_str("Skip"),
            BufferedOp::SkipNode => f.write_str("SkipNode"),
            BufferedOp::PushScope => f.write_str("PushScope"),
            BufferedOp::PopScope => f.write_str("PopScope"),
            BufferedOp::PushManualKey(segment) => write!(f, "PushManualKey({segment})"),
            BufferedOp::PopManualKey => f.write_str("PopManualKey"),
            BufferedOp::PushCallKey(segment) => write!(f, "PushCallKey({segment:?})"),
            BufferedOp::PopCallKey => f.write_str("PopCallKey"),
            BufferedOp::Enter { element, logonly } => {
                write!(f, "Enter({}, logonly={logonly})", element.name)
            }
            BufferedOp::Exit => f.write_str("Exit"),
            BufferedOp::AttachBackReference(backref) => {
                write!(f, "AttachBackReference({})", backref.identity_key())
            }
            BufferedOp::Deferred { label, .. } => write!(f, "Deferred({label})"),
        }
    }
}

impl BufferedOp {
    fn depth_delta(&self) -> isize {
        match self {
            BufferedOp::Open { .. }
            | BufferedOp::ElementOpen { .. }
            | BufferedOp::OpenStart { .. }
            | BufferedOp::OpenSkippable { .. } => 1,
            BufferedOp::Close | BufferedOp::ElementClose => -1,
            _ => 0,
        }
    }
}

#[derive(Default)]
pub struct BufferingRenderer {
    keys: KeyStack,
    logger: Option<SharedLogger>,
    ops: Vec<BufferedOp>,
}

impl BufferingRenderer {
    /// Starts recording at the key-stack position of the renderer the buffer
    /// will later be replayed on.
    pub fn new(keys: KeyStack, logger: Option<SharedLogger>) -> Self {
        Self {
            keys,
            logger,
            ops: Vec::new(),
        }
    }

    pub fn for_renderer(renderer: &dyn Renderer) -> Self {
        Self::new(renderer.key_stack().clone(), renderer.logger())
    }

    pub fn ops(&self) -> &[BufferedOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Concatenated text of every recorded `text` call.
    pub fn text_content(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                BufferedOp::Text(value) => Some(value.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Issues the recorded calls against `target` in order.
    pub fn replay_on(self, target: &mut dyn Renderer) {
        log::trace!("replaying {} buffered op(s)", self.ops.len());
        let mut saved_keys: Vec<String> = Vec::new();
        // Depth inside a skipped `{skip}` root, counting the root itself.
        let mut skipping = 0isize;
        for op in self.ops {
            if skipping > 0 {
                skipping += op.depth_delta();
                if skipping == 0 {
                    target.close();
                }
                continue;
            }
            match op {
                BufferedOp::Open { tag, key } => {
                    target.open(&tag, key.as_ref());
                }
                BufferedOp::ElementOpen { tag, key } => {
                    target.element_open(&tag, key.as_ref());
                }
                BufferedOp::OpenStart { tag, key } => target.open_start(&tag, key.as_ref()),
                BufferedOp::OpenEnd => {
                    target.open_end();
                }
                BufferedOp::OpenSkippable { tag, key } => {
                    if target.open_skippable(&tag, key.as_ref()) {
                        skipping = 1;
                    }
                }
                BufferedOp::Close => {
                    target.close();
                }
                BufferedOp::ElementClose => {
                    target.element_close();
                }
                BufferedOp::Text(value) => {
                    target.text(&value);
                }
                BufferedOp::Attr { name, value } => target.attr(&name, &value),
                BufferedOp::ApplyAttrs => target.apply_attrs(),
                BufferedOp::Skip => target.skip(),
                BufferedOp::SkipNode => target.skip_node(),
                BufferedOp::PushScope => target.push_scope(),
                BufferedOp::PopScope => target.pop_scope(),
                BufferedOp::PushManualKey(segment) => target.push_manual_key(&segment),
                BufferedOp::PopManualKey => target.pop_manual_key(),
                BufferedOp::PushCallKey(segment) => {
                    saved_keys.push(target.push_call_key(segment.as_ref()));
                }
                BufferedOp::PopCallKey => match saved_keys.pop() {
                    Some(saved) => target.pop_call_key(saved),
                    None => log::warn!("buffered call key pop without a recorded push"),
                },
                BufferedOp::Enter { element, logonly } => target.enter(&element, logonly),
                BufferedOp::Exit => target.exit(),
                BufferedOp::AttachBackReference(backref) => target.attach_back_reference(backref),
                BufferedOp::Deferred { label, run } => {
                    log::trace!("running deferred pass {label}");
                    if let Err(run) = target.defer(&label, run) {
                        run(&mut *target);
                    }
                }
            }
        }
    }

    fn record(&mut self, op: BufferedOp) {
        self.ops.push(op);
    }
}

impl Renderer for BufferingRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Buffering
    }

    fn key_stack(&self) -> &KeyStack {
        &self.keys
    }

    fn key_stack_mut(&mut self) -> &mut KeyStack {
        &mut self.keys
    }

    fn push_scope(&mut self) {
        self.keys.push_scope();
        self.record(BufferedOp::PushScope);
    }

    fn pop_scope(&mut self) {
        self.keys.pop_scope();
        self.record(BufferedOp::PopScope);
    }

    fn push_manual_key(&mut self, segment: &KeySegment) {
        self.keys.push_manual_key(segment);
        self.record(BufferedOp::PushManualKey(segment.clone()));
    }

    fn pop_manual_key(&mut self) {
        self.keys.pop_manual_key();
        self.record(BufferedOp::PopManualKey);
    }

    fn push_call_key(&mut self, segment: Option<&KeySegment>) -> String {
        self.record(BufferedOp::PushCallKey(segment.cloned()));
        self.keys.push_call_key(segment)
    }

    fn pop_call_key(&mut self, saved: String) {
        self.keys.pop_call_key(saved);
        self.record(BufferedOp::PopCallKey);
    }

    fn open(&mut self, tag: &str, key: Option<&KeySegment>) -> Option<NodeId> {
        self.record(BufferedOp::Open {
            tag: tag.to_owned(),
            key: key.cloned(),
        });
        None
    }

    fn element_open(&mut self, tag: &str, key: Option<&KeySegment>) -> Option<NodeId> {
        self.record(BufferedOp::ElementOpen {
            tag: tag.to_owned(),
            key: key.cloned(),
        });
        None
    }

    fn open_start(&mut self, tag: &str, key: Option<&KeySegment>) {
        self.record(BufferedOp::OpenStart {
            tag: tag.to_owned(),
            key: key.cloned(),
        });
    }

    fn open_end(&mut self) -> Option<NodeId> {
        self.record(BufferedOp::OpenEnd);
        None
    }

    fn close(&mut self) -> Option<NodeId> {
        self.record(BufferedOp::Close);
        None
    }

    fn element_close(&mut self) -> Option<NodeId> {
        self.record(BufferedOp::ElementClose);
        None
    }

    fn text(&mut self, value: &str) -> Option<NodeId> {
        self.record(BufferedOp::Text(value.to_owned()));
        None
    }

    fn attr(&mut self, name: &str, value: &str) {
        self.record(BufferedOp::Attr {
            name: name.to_owned(),
            value: value.to_owned(),
        });
    }

    fn apply_attrs(&mut self) {
        self.record(BufferedOp::ApplyAttrs);
    }

    fn current_pointer(&self) -> Option<NodeId> {
        None
    }

    fn current_element(&self) -> Option<NodeId> {
        None
    }

    fn skip(&mut self) {
        self.record(BufferedOp::Skip);
    }

    fn skip_node(&mut self) {
        self.record(BufferedOp::SkipNode);
    }

    // Whether the root can be skipped is only known at replay time, so the
    // children are always recorded.
    fn open_skippable(&mut self, tag: &str, key: Option<&KeySegment>) -> bool {
        self.record(BufferedOp::OpenSkippable {
            tag: tag.to_owned(),
            key: key.cloned(),
        });
        false
    }

    fn attach_back_reference(&mut self, backref: BackRef) {
        self.record(BufferedOp::AttachBackReference(backref));
    }

    fn defer(&mut self, label: &str, pass: DeferredPass) -> Result<(), DeferredPass> {
        self.record(BufferedOp::Deferred {
            label: label.to_owned(),
            run: pass,
        });
        Ok(())
    }

    fn logger(&self) -> Option<SharedLogger> {
        self.logger.clone()
    }

    fn set_logger(&mut self, logger: Option<SharedLogger>) {
        self.logger = logger;
    }

    fn enter(&mut self, element: &VisualElement, logonly: bool) {
        self.record(BufferedOp::Enter {
            element: element.clone(),
            logonly,
        });
    }

    fn exit(&mut self) {
        self.record(BufferedOp::Exit);
    }
}
