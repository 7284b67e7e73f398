#![doc = r"Key-stack reconciliation and stateful element lifecycle for an incremental template runtime."]

pub mod buffering;
pub mod call;
pub mod collections;
pub mod content;
pub mod element;
pub mod error;
pub mod key;
pub mod logger;
pub mod memory;
pub mod patcher;
pub mod registry;
pub mod renderer;
pub mod runtime;

pub type NodeId = usize;

pub use buffering::{BufferedOp, BufferingRenderer};
pub use call::{call_with_error_fallback, with_call_key, with_log_region, with_manual_key};
pub use content::{
    call_dynamic_html, is_truthy_non_empty, print, print_dynamic_attr, ContentKind,
    SanitizedContent, Template, TemplateValue,
};
pub use element::{
    element_from_node, locate_element, render_element, set_node_skip_handler,
    try_set_node_skip_handler, Element, ElementHandle, ElementSnapshot, LifecyclePhase,
};
pub use error::{KeyDisciplineError, PatchError, RegistryError, UsageError};
pub use key::{encode, is_match, location_key, matches, KeyDiscipline, KeySegment, KeyStack};
pub use logger::{Logger, SharedLogger, VisualElement};
pub use memory::{MemoryPatcher, PatcherStats};
pub use patcher::{
    BackRef, BackReference, NodeMatcher, NodeSkipHandler, NodeType, PatchMode, Patcher,
};
pub use registry::DelegateRegistry;
pub use renderer::{
    DefaultRenderer, DeferredPass, ProbeRenderer, Renderer, RendererKind, SuppressingRenderer,
};
pub use runtime::{patch_inner, patch_outer, patch_with, RuntimeConfig, TemplateRuntime};
