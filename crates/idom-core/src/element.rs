//! Stateful elements: long-lived objects bound to one host node across
//! render passes.
//!
//! Each pass either finds the instance already attached to a nearby sibling
//! (through the node's back-reference) or constructs a new one, then lets an
//! optional skip handler elide the re-render. A skip handler may also be
//! parked on a host node before any element renders there; the first instance
//! rendered on that node adopts it. Rendered passes can arm an after-patch
//! handler that runs once the outermost element's subtree has been patched.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{PatchError, UsageError};
use crate::key::{encode, is_match, KeyDiscipline, KeySegment, KeyStack};
use crate::logger::SharedLogger;
use crate::patcher::{BackRef, BackReference, PatchMode, Patcher};
use crate::renderer::{DeferredPass, Renderer, RendererKind};
use crate::runtime::patch_with;
use crate::NodeId;

/// User-defined element behaviour. The controller opens and closes the root
/// node (`TAG`); `render` emits its children.
pub trait Element: 'static {
    type Data: Clone + 'static;

    const TAG: &'static str = "div";

    /// Recomputes state derived from `data`. Runs before each render while
    /// state syncing is enabled.
    fn sync_state(&mut self, _data: &Self::Data) {}

    fn render(&mut self, renderer: &mut dyn Renderer, data: &Self::Data);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Constructed during the current pass.
    New,
    /// Found attached to the host tree during the current pass.
    Located,
    Skipped,
    Rendered,
}

/// What handlers see of an instance: its identity and its data at one point
/// in time. `data` is `None` before the first render.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSnapshot<D> {
    pub key: String,
    pub data: Option<D>,
}

type SkipHandler<D> = Rc<dyn Fn(&ElementSnapshot<D>, &ElementSnapshot<D>) -> bool>;
type AfterPatchHandler<D> = Rc<dyn Fn(&ElementSnapshot<D>, &ElementSnapshot<D>)>;

struct ElementState<D> {
    data: Option<D>,
    segment: Option<KeySegment>,
    /// Key stack top the root was last opened under.
    top: String,
    node: Option<NodeId>,
    phase: LifecyclePhase,
    logger: Option<SharedLogger>,
    /// Discipline of the key stack the instance was created under.
    discipline: KeyDiscipline,
    sync_state: bool,
    skip_handler: Option<SkipHandler<D>>,
    after_patch: Option<AfterPatchHandler<D>>,
}

struct ElementInner<E: Element> {
    key: String,
    state: RefCell<ElementState<E::Data>>,
    element: RefCell<E>,
    patch_handler: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl<E: Element> BackReference for ElementInner<E> {
    fn identity_key(&self) -> String {
        self.key.clone()
    }

    fn take_patch_handler(&self) -> Option<Box<dyn FnOnce()>> {
        self.patch_handler.borrow_mut().take()
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Shared handle to one element instance.
pub struct ElementHandle<E: Element> {
    inner: Rc<ElementInner<E>>,
}

impl<E: Element> Clone for ElementHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Element> ElementHandle<E> {
    fn create(
        key: String,
        element: E,
        logger: Option<SharedLogger>,
        discipline: KeyDiscipline,
    ) -> Self {
        Self {
            inner: Rc::new(ElementInner {
                key,
                state: RefCell::new(ElementState {
                    data: None,
                    segment: None,
                    top: String::new(),
                    node: None,
                    phase: LifecyclePhase::New,
                    logger,
                    discipline,
                    sync_state: true,
                    skip_handler: None,
                    after_patch: None,
                }),
                element: RefCell::new(element),
                patch_handler: RefCell::new(None),
            }),
        }
    }

    fn from_back_reference(backref: BackRef) -> Option<Self> {
        backref
            .into_any()
            .downcast::<ElementInner<E>>()
            .ok()
            .map(|inner| Self { inner })
    }

    fn back_reference(&self) -> BackRef {
        self.inner.clone()
    }

    /// Identity key assigned at construction.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn data(&self) -> Option<E::Data> {
        self.inner.state.borrow().data.clone()
    }

    /// Root node of the last pass that reached the host tree.
    pub fn node(&self) -> Option<NodeId> {
        self.inner.state.borrow().node
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.inner.state.borrow().phase
    }

    pub fn logger(&self) -> Option<SharedLogger> {
        self.inner.state.borrow().logger.clone()
    }

    pub fn snapshot(&self) -> ElementSnapshot<E::Data> {
        ElementSnapshot {
            key: self.inner.key.clone(),
            data: self.data(),
        }
    }

    pub fn same_instance(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn with_element<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.inner.element.borrow())
    }

    pub fn with_element_mut<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut self.inner.element.borrow_mut())
    }

    /// Enables or disables [`Element::sync_state`] before renders.
    pub fn set_sync_state(&self, enabled: bool) {
        self.inner.state.borrow_mut().sync_state = enabled;
    }

    pub fn try_set_skip_handler(
        &self,
        handler: impl Fn(&ElementSnapshot<E::Data>, &ElementSnapshot<E::Data>) -> bool + 'static,
    ) -> Result<(), UsageError> {
        let mut state = self.inner.state.borrow_mut();
        if state.skip_handler.is_some() {
            return Err(UsageError::DuplicateSkipHandler {
                key: self.inner.key.clone(),
            });
        }
        state.skip_handler = Some(Rc::new(handler));
        Ok(())
    }

    /// Installs the predicate deciding whether a pass may keep the existing
    /// subtree. Called with `(existing, next)`.
    ///
    /// # Panics
    ///
    /// If a skip handler is already attached.
    pub fn set_skip_handler(
        &self,
        handler: impl Fn(&ElementSnapshot<E::Data>, &ElementSnapshot<E::Data>) -> bool + 'static,
    ) {
        if let Err(err) = self.try_set_skip_handler(handler) {
            panic!("{err}");
        }
    }

    pub fn try_set_after_patch_handler(
        &self,
        handler: impl Fn(&ElementSnapshot<E::Data>, &ElementSnapshot<E::Data>) + 'static,
    ) -> Result<(), UsageError> {
        let mut state = self.inner.state.borrow_mut();
        if state.after_patch.is_some() {
            return Err(UsageError::DuplicateAfterPatchHandler {
                key: self.inner.key.clone(),
            });
        }
        state.after_patch = Some(Rc::new(handler));
        Ok(())
    }

    /// Installs the callback run with `(previous, next)` after each rendered
    /// pass has patched the element's subtree.
    ///
    /// # Panics
    ///
    /// If an after-patch handler is already attached.
    pub fn set_after_patch_handler(
        &self,
        handler: impl Fn(&ElementSnapshot<E::Data>, &ElementSnapshot<E::Data>) + 'static,
    ) {
        if let Err(err) = self.try_set_after_patch_handler(handler) {
            panic!("{err}");
        }
    }

    /// Renders this element on its own, replacing its root node in place.
    /// The instance's data, key position and logger are reused.
    pub fn rerender(&self, patcher: &mut dyn Patcher) -> Result<(), PatchError> {
        let (node, top, segment, data, logger, discipline) = {
            let state = self.inner.state.borrow();
            (
                state.node,
                state.top.clone(),
                state.segment.clone(),
                state.data.clone(),
                state.logger.clone(),
                state.discipline,
            )
        };
        let (Some(node), Some(segment), Some(data)) = (node, segment, data) else {
            return Err(PatchError::Unmounted {
                key: self.inner.key.clone(),
            });
        };
        log::debug!("re-rendering element {} at node {node}", self.inner.key);
        let keys = KeyStack::rooted_at(top, discipline);
        patch_with(patcher, node, PatchMode::Outer, keys, logger, |renderer| {
            let node = renderer.element_open(E::TAG, Some(&segment));
            renderer.attach_back_reference(self.back_reference());
            self.render_contents(renderer, node, data);
        })
    }

    fn pass(&self, renderer: &mut dyn Renderer, segment: &KeySegment, top: String, data: E::Data) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.segment = Some(segment.clone());
            state.top = top;
        }
        let node = renderer.element_open(E::TAG, Some(segment));
        renderer.attach_back_reference(self.back_reference());
        self.adopt_node_skip_handler(renderer);

        let candidate = ElementSnapshot {
            key: self.inner.key.clone(),
            data: Some(data.clone()),
        };
        let (previous, skip_handler, after_patch) = {
            let state = self.inner.state.borrow();
            (
                ElementSnapshot {
                    key: self.inner.key.clone(),
                    data: state.data.clone(),
                },
                state.skip_handler.clone(),
                state.after_patch.clone(),
            )
        };

        if skip_handler.is_some_and(|skip| skip(&previous, &candidate)) {
            log::debug!("skipping element {}", self.inner.key);
            renderer.skip();
            {
                let mut state = self.inner.state.borrow_mut();
                state.data = Some(data);
                state.node = node.or(state.node);
                state.phase = LifecyclePhase::Skipped;
            }
            renderer.element_close();
            return;
        }

        if let Some(handler) = after_patch {
            *self.inner.patch_handler.borrow_mut() =
                Some(Box::new(move || handler(&previous, &candidate)));
        }
        self.render_contents(renderer, node, data);
    }

    /// Renders the children of an already opened root, then closes it. No
    /// borrow of the instance is held when the root closes, so after-patch
    /// handlers may touch it.
    fn render_contents(&self, renderer: &mut dyn Renderer, node: Option<NodeId>, data: E::Data) {
        let sync = {
            let mut state = self.inner.state.borrow_mut();
            state.data = Some(data.clone());
            state.sync_state
        };
        {
            let mut element = self.inner.element.borrow_mut();
            if sync {
                element.sync_state(&data);
            }
            element.render(renderer, &data);
        }
        {
            let mut state = self.inner.state.borrow_mut();
            state.node = node.or(state.node);
            state.phase = LifecyclePhase::Rendered;
        }
        renderer.element_close();
    }

    fn adopt_node_skip_handler(&self, renderer: &mut dyn Renderer) {
        let Some(parked) = renderer.take_node_skip_handler() else {
            return;
        };
        let Ok(handler) = parked.downcast::<SkipHandler<E::Data>>() else {
            log::warn!(
                "dropping skip handler parked for another element type at {}",
                self.inner.key
            );
            return;
        };
        let mut state = self.inner.state.borrow_mut();
        if state.skip_handler.is_some() {
            drop(state);
            panic!(
                "{}",
                UsageError::DuplicateSkipHandler {
                    key: self.inner.key.clone()
                }
            );
        }
        log::debug!("element {} adopted a parked skip handler", self.inner.key);
        state.skip_handler = Some((*handler).clone());
    }
}

/// Registers a skip handler for whichever element of type `E` renders on
/// `node`. An element already attached there takes it directly; otherwise it
/// is parked on the node until the first pass adopts it.
pub fn try_set_node_skip_handler<E: Element>(
    patcher: &mut dyn Patcher,
    node: NodeId,
    handler: impl Fn(&ElementSnapshot<E::Data>, &ElementSnapshot<E::Data>) -> bool + 'static,
) -> Result<(), UsageError> {
    if patcher.has_node_skip_handler(node) {
        let key = patcher
            .back_reference(node)
            .map(|backref| backref.identity_key())
            .unwrap_or_else(|| format!("node {node}"));
        return Err(UsageError::DuplicateSkipHandler { key });
    }
    if let Some(owner) = element_from_node::<E>(&*patcher, node) {
        return owner.try_set_skip_handler(handler);
    }
    let handler: SkipHandler<E::Data> = Rc::new(handler);
    patcher.set_node_skip_handler(node, Rc::new(handler));
    Ok(())
}

/// Like [`try_set_node_skip_handler`].
///
/// # Panics
///
/// If `node` or the element attached to it already has a skip handler.
pub fn set_node_skip_handler<E: Element>(
    patcher: &mut dyn Patcher,
    node: NodeId,
    handler: impl Fn(&ElementSnapshot<E::Data>, &ElementSnapshot<E::Data>) -> bool + 'static,
) {
    if let Err(err) = try_set_node_skip_handler::<E>(patcher, node, handler) {
        panic!("{err}");
    }
}

/// The element of type `E` owning `node`, if any.
pub fn element_from_node<E: Element>(
    patcher: &dyn Patcher,
    node: NodeId,
) -> Option<ElementHandle<E>> {
    patcher
        .back_reference(node)
        .and_then(ElementHandle::from_back_reference)
}

/// Scans siblings from the renderer's current pointer for an instance of `E`
/// whose identity key matches `key`. The scan stops at the boundary of the
/// enclosing patch so instances owned by settled content are never reused.
pub fn locate_element<E: Element>(renderer: &dyn Renderer, key: &str) -> Option<ElementHandle<E>> {
    let patcher = renderer.patcher()?;
    let boundary = patcher.scan_boundary();
    let mut cursor = renderer.current_pointer();
    while let Some(node) = cursor {
        if Some(node) == boundary {
            log::trace!("element scan for {key} stopped at patch boundary {node}");
            break;
        }
        if let Some(handle) = element_from_node::<E>(patcher, node) {
            if is_match(Some(key), Some(handle.key())) {
                return Some(handle);
            }
        }
        cursor = patcher.next_sibling(node);
    }
    None
}

/// Runs one render pass for a stateful element keyed by `key` at the current
/// key-stack position. `construct` is only called when no existing instance
/// is found.
///
/// Probe renderers get a placeholder node and no instance. Buffering
/// renderers have no host tree to find instances in, so the pass is deferred
/// until the buffer is replayed and no instance is returned either.
pub fn render_element<E: Element>(
    renderer: &mut dyn Renderer,
    key: impl Into<KeySegment>,
    data: E::Data,
    construct: impl FnOnce() -> E + 'static,
) -> Option<ElementHandle<E>> {
    if renderer.kind() == RendererKind::Probe {
        renderer.open(E::TAG, None);
        renderer.close();
        return None;
    }
    let segment = key.into();
    let top = renderer.current_top().to_owned();
    let mut identity = encode(&segment);
    identity.push_str(&top);

    if renderer.kind() == RendererKind::Buffering {
        let pass: DeferredPass = Box::new(move |target: &mut dyn Renderer| {
            render_element(target, segment, data, construct);
        });
        if let Err(pass) = renderer.defer(&identity, pass) {
            pass(&mut *renderer);
        }
        return None;
    }

    let handle = match locate_element::<E>(renderer, &identity) {
        Some(handle) => {
            log::debug!("located element {identity}");
            handle.inner.state.borrow_mut().phase = LifecyclePhase::Located;
            handle
        }
        None => {
            log::debug!("constructing element {identity}");
            ElementHandle::create(
                identity,
                construct(),
                renderer.logger(),
                renderer.key_stack().discipline(),
            )
        }
    };
    handle.pass(renderer, &segment, top, data);
    Some(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::BufferingRenderer;
    use crate::memory::MemoryPatcher;
    use crate::renderer::{DefaultRenderer, ProbeRenderer};
    use std::cell::Cell;

    #[derive(Default)]
    struct Counter {
        label: String,
        renders: usize,
    }

    impl Element for Counter {
        type Data = u32;

        fn sync_state(&mut self, data: &u32) {
            self.label = format!("count {data}");
        }

        fn render(&mut self, renderer: &mut dyn Renderer, _data: &u32) {
            self.renders += 1;
            renderer.text(&self.label);
        }
    }

    #[derive(Default)]
    struct Other;

    impl Element for Other {
        type Data = ();

        fn render(&mut self, renderer: &mut dyn Renderer, _data: &()) {
            renderer.text("other");
        }
    }

    fn counter_pass(patcher: &mut MemoryPatcher, data: u32) -> ElementHandle<Counter> {
        let root = patcher.root();
        patcher.begin_patch(root, PatchMode::Inner).expect("begin");
        let handle = {
            let mut renderer = DefaultRenderer::new(patcher);
            render_element(&mut renderer, "c", data, Counter::default)
        };
        patcher.end_patch().expect("end");
        handle.expect("default renderer yields an instance")
    }

    fn root_text(patcher: &MemoryPatcher, handle: &ElementHandle<Counter>) -> Option<String> {
        let node = handle.node()?;
        let text = *patcher.children(node).first()?;
        patcher.text_of(text)
    }

    #[test]
    fn second_pass_reuses_the_instance() {
        let mut patcher = MemoryPatcher::new();
        let first = counter_pass(&mut patcher, 1);
        assert_eq!(first.key(), "1:c");
        assert_eq!(first.phase(), LifecyclePhase::Rendered);

        let second = counter_pass(&mut patcher, 2);
        assert!(second.same_instance(&first));
        assert_eq!(second.data(), Some(2));
        assert_eq!(root_text(&patcher, &second).as_deref(), Some("count 2"));
        assert_eq!(second.with_element(|c| c.renders), 2);
    }

    #[test]
    fn skip_handler_keeps_subtree_and_updates_data() {
        let mut patcher = MemoryPatcher::new();
        let handle = counter_pass(&mut patcher, 1);
        handle.set_skip_handler(|_, next| next.data.is_some_and(|d| d % 2 == 0));

        patcher.reset_stats();
        counter_pass(&mut patcher, 2);
        let stats = patcher.stats();
        assert_eq!((stats.opens, stats.closes), (1, 1));
        assert_eq!((stats.texts, stats.attrs), (0, 0));
        assert_eq!(stats.mutations(), 0);
        assert_eq!(handle.phase(), LifecyclePhase::Skipped);
        assert_eq!(handle.data(), Some(2));
        assert_eq!(root_text(&patcher, &handle).as_deref(), Some("count 1"));

        counter_pass(&mut patcher, 3);
        assert_eq!(handle.phase(), LifecyclePhase::Rendered);
        assert_eq!(root_text(&patcher, &handle).as_deref(), Some("count 3"));
    }

    #[test]
    fn after_patch_fires_once_per_rendered_pass() {
        let mut patcher = MemoryPatcher::new();
        let handle = counter_pass(&mut patcher, 1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let watched = handle.clone();
        handle.set_after_patch_handler(move |previous, next| {
            assert_eq!(watched.phase(), LifecyclePhase::Rendered);
            sink.borrow_mut().push((previous.data, next.data));
        });

        counter_pass(&mut patcher, 2);
        counter_pass(&mut patcher, 3);
        assert_eq!(
            *seen.borrow(),
            vec![(Some(1), Some(2)), (Some(2), Some(3))]
        );
    }

    #[test]
    fn skipped_pass_does_not_fire_after_patch() {
        let mut patcher = MemoryPatcher::new();
        let handle = counter_pass(&mut patcher, 1);
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        handle.set_skip_handler(|_, _| true);
        handle.set_after_patch_handler(move |_, _| counter.set(counter.get() + 1));
        counter_pass(&mut patcher, 2);
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn duplicate_skip_handler_is_rejected() {
        let mut patcher = MemoryPatcher::new();
        let handle = counter_pass(&mut patcher, 1);
        handle.set_skip_handler(|_, _| false);
        assert_eq!(
            handle.try_set_skip_handler(|_, _| true),
            Err(UsageError::DuplicateSkipHandler {
                key: "1:c".to_owned()
            })
        );
    }

    #[test]
    #[should_panic(expected = "already has an after-patch handler")]
    fn duplicate_after_patch_handler_panics() {
        let mut patcher = MemoryPatcher::new();
        let handle = counter_pass(&mut patcher, 1);
        handle.set_after_patch_handler(|_, _| {});
        handle.set_after_patch_handler(|_, _| {});
    }

    #[test]
    fn probe_renders_placeholder_without_instance() {
        let mut probe = ProbeRenderer::new();
        let handle = render_element(&mut probe, "c", 1, Counter::default);
        assert!(handle.is_none());
        assert!(probe.did_render());
    }

    #[test]
    fn buffered_pass_waits_for_replay() {
        let mut buffer = BufferingRenderer::default();
        assert!(render_element(&mut buffer, "c", 1, Counter::default).is_none());
        assert_eq!(format!("{:?}", buffer.ops()), "[Deferred(1:c)]");

        let mut patcher = MemoryPatcher::new();
        let root = patcher.root();
        patcher.begin_patch(root, PatchMode::Inner).expect("begin");
        buffer.replay_on(&mut DefaultRenderer::new(&mut patcher));
        patcher.end_patch().expect("end");
        let node = patcher.children(root)[0];
        let handle = element_from_node::<Counter>(&patcher, node).expect("attached");
        assert_eq!(handle.data(), Some(1));
        assert_eq!(root_text(&patcher, &handle).as_deref(), Some("count 1"));
    }

    #[test]
    fn back_reference_resolves_only_for_matching_type() {
        let mut patcher = MemoryPatcher::new();
        let handle = counter_pass(&mut patcher, 1);
        let node = handle.node().expect("rendered");
        let found = element_from_node::<Counter>(&patcher, node).expect("counter");
        assert!(found.same_instance(&handle));
        assert!(element_from_node::<Other>(&patcher, node).is_none());
    }

    #[test]
    fn instance_of_another_type_is_not_reused() {
        let mut patcher = MemoryPatcher::new();
        let root = patcher.root();
        patcher.begin_patch(root, PatchMode::Inner).expect("begin");
        render_element(&mut DefaultRenderer::new(&mut patcher), "c", (), Other::default);
        patcher.end_patch().expect("end");

        let handle = counter_pass(&mut patcher, 1);
        assert_eq!(handle.with_element(|c| c.renders), 1);
        assert_eq!(root_text(&patcher, &handle).as_deref(), Some("count 1"));
    }

    #[test]
    fn scan_stops_at_the_patch_boundary() {
        let mut patcher = MemoryPatcher::new();
        let root = patcher.root();
        patcher.begin_patch(root, PatchMode::Inner).expect("begin");
        let settled = {
            let mut renderer = DefaultRenderer::new(&mut patcher);
            renderer.open("p", Some(&KeySegment::from("slot")));
            renderer.close();
            render_element(&mut renderer, "c", 1, Counter::default)
        };
        patcher.end_patch().expect("end");
        let settled = settled.expect("instance");
        let slot = patcher.children(root)[0];

        patcher.begin_patch(slot, PatchMode::Outer).expect("begin");
        let fresh = render_element(
            &mut DefaultRenderer::new(&mut patcher),
            "c",
            2,
            Counter::default,
        )
        .expect("instance");
        patcher.end_patch().expect("end");

        assert!(!fresh.same_instance(&settled));
        assert_eq!(settled.data(), Some(1));
        let children = patcher.children(root);
        assert_eq!(children.len(), 2);
        assert_eq!(Some(children[1]), settled.node());
    }

    #[test]
    fn rerender_replaces_root_in_place() {
        let mut patcher = MemoryPatcher::new();
        let handle = counter_pass(&mut patcher, 1);
        let node = handle.node();

        handle.set_sync_state(false);
        handle.with_element_mut(|c| c.label = "manual".to_owned());
        handle.rerender(&mut patcher).expect("rerender");

        assert_eq!(handle.node(), node);
        assert_eq!(patcher.children(patcher.root()).len(), 1);
        assert_eq!(root_text(&patcher, &handle).as_deref(), Some("manual"));
        assert_eq!(handle.with_element(|c| c.renders), 2);
    }

    #[test]
    fn rerender_before_first_render_fails() {
        let handle: ElementHandle<Counter> =
            ElementHandle::create(
                "1:c".to_owned(),
                Counter::default(),
                None,
                KeyDiscipline::default(),
            );
        assert_eq!(
            handle.rerender(&mut MemoryPatcher::new()),
            Err(PatchError::Unmounted {
                key: "1:c".to_owned()
            })
        );
    }
}
