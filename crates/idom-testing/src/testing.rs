use idom_core::{
    Element, ElementHandle, MemoryPatcher, NodeId, PatchError, Renderer, TemplateRuntime,
};

use crate::recording::{PatchCall, RecordingPatcher};

/// Headless harness for exercising templates in tests.
///
/// `IdomTestRule` owns an in-memory host tree behind a recording patcher and
/// a runtime attached to it. Installed content is re-rendered into the
/// document node on demand, so tests can drive several passes and inspect
/// what each one sent to the patcher.
pub struct IdomTestRule {
    runtime: TemplateRuntime,
    patcher: RecordingPatcher<MemoryPatcher>,
    content: Option<Box<dyn FnMut(&mut dyn Renderer)>>,
}

impl IdomTestRule {
    pub fn new() -> Self {
        Self::with_runtime(TemplateRuntime::default())
    }

    pub fn with_runtime(runtime: TemplateRuntime) -> Self {
        let mut patcher = RecordingPatcher::new(MemoryPatcher::new());
        runtime.attach(&mut patcher);
        Self {
            runtime,
            patcher,
            content: None,
        }
    }

    /// Install the provided content and perform an initial render.
    pub fn set_content(
        &mut self,
        content: impl FnMut(&mut dyn Renderer) + 'static,
    ) -> Result<(), PatchError> {
        self.content = Some(Box::new(content));
        self.render()
    }

    /// Render the installed content again.
    pub fn rerender(&mut self) -> Result<(), PatchError> {
        self.render()
    }

    /// Render the installed content again and return the primitives that
    /// reached the patcher during that pass.
    pub fn rerender_recorded(&mut self) -> Result<Vec<PatchCall>, PatchError> {
        self.patcher.take_calls();
        self.render()?;
        Ok(self.patcher.take_calls())
    }

    /// Re-render a single element in place.
    pub fn rerender_element<E: Element>(
        &mut self,
        handle: &ElementHandle<E>,
    ) -> Result<Vec<PatchCall>, PatchError> {
        self.patcher.take_calls();
        handle.rerender(&mut self.patcher)?;
        Ok(self.patcher.take_calls())
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn runtime(&self) -> &TemplateRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut TemplateRuntime {
        &mut self.runtime
    }

    pub fn patcher(&self) -> &MemoryPatcher {
        self.patcher.inner()
    }

    pub fn patcher_mut(&mut self) -> &mut MemoryPatcher {
        self.patcher.inner_mut()
    }

    pub fn calls(&self) -> &[PatchCall] {
        self.patcher.calls()
    }

    pub fn root_id(&self) -> NodeId {
        self.patcher.inner().root()
    }

    /// Top-level nodes rendered by the content.
    pub fn rendered(&self) -> Vec<NodeId> {
        self.patcher().children(self.root_id())
    }

    pub fn dump_tree(&self) -> String {
        self.patcher().dump_tree(self.root_id())
    }

    fn render(&mut self) -> Result<(), PatchError> {
        let root = self.root_id();
        if let Some(content) = self.content.as_mut() {
            self.runtime
                .patch_inner(&mut self.patcher, root, |renderer| content(renderer))?;
        }
        Ok(())
    }
}

impl Default for IdomTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Render `content` once into a fresh tree and return the tree dump.
pub fn render_to_dump(content: impl FnOnce(&mut dyn Renderer)) -> Result<String, PatchError> {
    let mut patcher = MemoryPatcher::new();
    let root = patcher.root();
    TemplateRuntime::default().attach(&mut patcher);
    idom_core::patch_inner(&mut patcher, root, content)?;
    Ok(patcher.dump_tree(root))
}

/// Element stub for harness tests: renders its data as text.
#[derive(Debug, Default)]
pub struct TextElement {
    pub renders: usize,
}

impl Element for TextElement {
    type Data = String;

    fn render(&mut self, renderer: &mut dyn Renderer, data: &String) {
        self.renders += 1;
        renderer.text(data);
    }
}
