use crate::call::with_call_key;
use crate::error::PatchError;
use crate::key::{matches, KeyDiscipline, KeySegment, KeyStack};
use crate::logger::SharedLogger;
use crate::patcher::{PatchMode, Patcher};
use crate::registry::DelegateRegistry;
use crate::renderer::{DefaultRenderer, Renderer};
use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub key_discipline: KeyDiscipline,
    /// Install the prefix-relaxed key matcher when attaching to a patcher.
    pub install_matcher: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            key_discipline: KeyDiscipline::default(),
            install_matcher: true,
        }
    }
}

impl RuntimeConfig {
    pub fn with_key_discipline(mut self, discipline: KeyDiscipline) -> Self {
        self.key_discipline = discipline;
        self
    }

    pub fn with_install_matcher(mut self, install: bool) -> Self {
        self.install_matcher = install;
        self
    }
}

/// Everything one template runtime instance needs: configuration, the
/// delegate registry and the optional visual-element logger.
#[derive(Default)]
pub struct TemplateRuntime {
    config: RuntimeConfig,
    registry: DelegateRegistry,
    logger: Option<SharedLogger>,
}

impl TemplateRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            registry: DelegateRegistry::new(),
            logger: None,
        }
    }

    pub fn with_registry(mut self, registry: DelegateRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &DelegateRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DelegateRegistry {
        &mut self.registry
    }

    pub fn logger(&self) -> Option<SharedLogger> {
        self.logger.clone()
    }

    /// Prepares `patcher` for rendering with this runtime. Call once per
    /// patcher before the first transaction.
    pub fn attach(&self, patcher: &mut dyn Patcher) {
        if self.config.install_matcher {
            log::debug!("installing prefix-relaxed key matcher");
            patcher.set_matcher(matches);
        }
    }

    /// Replaces `root` with what `render` emits.
    pub fn patch_outer<R>(
        &self,
        patcher: &mut dyn Patcher,
        root: NodeId,
        render: impl FnOnce(&mut dyn Renderer) -> R,
    ) -> Result<R, PatchError> {
        self.patch(patcher, root, PatchMode::Outer, render)
    }

    /// Replaces the children of `root` with what `render` emits.
    pub fn patch_inner<R>(
        &self,
        patcher: &mut dyn Patcher,
        root: NodeId,
        render: impl FnOnce(&mut dyn Renderer) -> R,
    ) -> Result<R, PatchError> {
        self.patch(patcher, root, PatchMode::Inner, render)
    }

    fn patch<R>(
        &self,
        patcher: &mut dyn Patcher,
        root: NodeId,
        mode: PatchMode,
        render: impl FnOnce(&mut dyn Renderer) -> R,
    ) -> Result<R, PatchError> {
        let keys = KeyStack::with_discipline(self.config.key_discipline);
        patch_with(patcher, root, mode, keys, self.logger(), render)
    }

    /// Renders the best registered implementation of delegate `name` for
    /// `variant`. Returns `false` when nothing is registered.
    pub fn call_delegate(
        &self,
        renderer: &mut dyn Renderer,
        name: &str,
        variant: &str,
        key: Option<&KeySegment>,
    ) -> bool {
        let Some(template) = self.registry.select(name, variant) else {
            log::debug!("no delegate registered for {name}:{variant}");
            return false;
        };
        with_call_key(renderer, key, |renderer| template.invoke(renderer));
        true
    }
}

/// Runs one patch transaction on `root` with a default renderer starting
/// from `keys`.
pub fn patch_with<R>(
    patcher: &mut dyn Patcher,
    root: NodeId,
    mode: PatchMode,
    keys: KeyStack,
    logger: Option<SharedLogger>,
    render: impl FnOnce(&mut dyn Renderer) -> R,
) -> Result<R, PatchError> {
    patcher.begin_patch(root, mode)?;
    let out = {
        let mut renderer = DefaultRenderer::with_key_stack(&mut *patcher, keys).with_logger(logger);
        render(&mut renderer)
    };
    patcher.end_patch()?;
    Ok(out)
}

pub fn patch_outer<R>(
    patcher: &mut dyn Patcher,
    root: NodeId,
    render: impl FnOnce(&mut dyn Renderer) -> R,
) -> Result<R, PatchError> {
    patch_with(patcher, root, PatchMode::Outer, KeyStack::new(), None, render)
}

pub fn patch_inner<R>(
    patcher: &mut dyn Patcher,
    root: NodeId,
    render: impl FnOnce(&mut dyn Renderer) -> R,
) -> Result<R, PatchError> {
    patch_with(patcher, root, PatchMode::Inner, KeyStack::new(), None, render)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentKind, Template};
    use crate::memory::MemoryPatcher;

    #[test]
    fn attach_installs_prefix_matcher() {
        let runtime = TemplateRuntime::default();
        let mut patcher = MemoryPatcher::new();
        runtime.attach(&mut patcher);
        let root = patcher.root();

        runtime
            .patch_inner(&mut patcher, root, |r| {
                r.open("div", Some(&KeySegment::from("a")));
                r.close();
            })
            .expect("first pass");
        let first = patcher.children(root)[0];

        runtime
            .patch_inner(&mut patcher, root, |r| {
                let saved = r.push_call_key(Some(&KeySegment::from("b")));
                r.open("div", Some(&KeySegment::from("a")));
                r.close();
                r.pop_call_key(saved);
            })
            .expect("second pass");
        assert_eq!(patcher.children(root), vec![first]);
    }

    #[test]
    fn matcher_stays_exact_when_disabled() {
        let runtime = TemplateRuntime::new(RuntimeConfig::default().with_install_matcher(false));
        let mut patcher = MemoryPatcher::new();
        runtime.attach(&mut patcher);
        let root = patcher.root();
        patch_inner(&mut patcher, root, |r| {
            r.open("div", Some(&KeySegment::from("a")));
            r.close();
        })
        .expect("first pass");
        let first = patcher.children(root)[0];
        patch_inner(&mut patcher, root, |r| {
            let saved = r.push_call_key(Some(&KeySegment::from("b")));
            r.open("div", Some(&KeySegment::from("a")));
            r.close();
            r.pop_call_key(saved);
        })
        .expect("second pass");
        assert_ne!(patcher.children(root), vec![first]);
    }

    #[test]
    fn transaction_errors_surface() {
        let mut patcher = MemoryPatcher::new();
        let root = patcher.root();
        assert_eq!(
            patch_outer(&mut patcher, root, |_| ()),
            Err(PatchError::Detached { id: root })
        );
        assert_eq!(
            patch_inner(&mut patcher, 99, |_| ()),
            Err(PatchError::Missing { id: 99 })
        );
        assert_eq!(
            patch_inner(&mut patcher, root, |r| {
                r.open("div", None);
            }),
            Err(PatchError::Unbalanced { open: 1 })
        );
    }

    #[test]
    fn delegate_call_is_keyed_and_reports_misses() {
        let mut runtime = TemplateRuntime::default();
        runtime
            .registry_mut()
            .register(
                "badge",
                "",
                0,
                Template::new(ContentKind::Html, |r| {
                    r.open("span", None);
                    r.close();
                }),
            )
            .expect("register");
        let mut patcher = MemoryPatcher::new();
        let root = patcher.root();
        let (hit, miss) = runtime
            .patch_inner(&mut patcher, root, |r| {
                let hit = runtime.call_delegate(r, "badge", "", Some(&KeySegment::from("d")));
                let miss = runtime.call_delegate(r, "ribbon", "", None);
                (hit, miss)
            })
            .expect("patch");
        assert!(hit);
        assert!(!miss);
        let span = patcher.children(root)[0];
        assert_eq!(patcher.key_of(span).as_deref(), Some("1:d"));
    }
}
