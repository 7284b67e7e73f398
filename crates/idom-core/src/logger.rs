//! Visual-element logging hooks attached to renderers and element instances.

use std::rc::Rc;

/// A visual element entered by a logging region, with optional payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualElement {
    pub id: u64,
    pub name: String,
    pub data: Option<String>,
}

impl VisualElement {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// Receives enter/exit notifications for logging regions. Implementations
/// use interior mutability; one logger is shared by every renderer and
/// element instance of a render tree.
pub trait Logger {
    fn enter(&self, element: &VisualElement, logonly: bool);
    fn exit(&self);
}

pub type SharedLogger = Rc<dyn Logger>;
