//! Values flowing through template calls: plain strings, sanitized content
//! of a known kind, and invokable templates.

use std::fmt;
use std::rc::Rc;

use crate::buffering::BufferingRenderer;
use crate::call::with_call_key;
use crate::key::KeySegment;
use crate::renderer::{ProbeRenderer, Renderer};

/// Output context a piece of content is safe to use in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Html,
    Attributes,
    Text,
    Uri,
    TrustedResourceUri,
    Css,
    Js,
}

/// Content that has already been made safe for its [`ContentKind`]. Only the
/// named constructors below create it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedContent {
    kind: ContentKind,
    content: String,
}

impl SanitizedContent {
    fn ordain(kind: ContentKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn html(content: impl Into<String>) -> Self {
        Self::ordain(ContentKind::Html, content)
    }

    pub fn attributes(content: impl Into<String>) -> Self {
        Self::ordain(ContentKind::Attributes, content)
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::ordain(ContentKind::Text, content)
    }

    pub fn uri(content: impl Into<String>) -> Self {
        Self::ordain(ContentKind::Uri, content)
    }

    pub fn trusted_resource_uri(content: impl Into<String>) -> Self {
        Self::ordain(ContentKind::TrustedResourceUri, content)
    }

    pub fn css(content: impl Into<String>) -> Self {
        Self::ordain(ContentKind::Css, content)
    }

    pub fn js(content: impl Into<String>) -> Self {
        Self::ordain(ContentKind::Js, content)
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }
}

impl fmt::Display for SanitizedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

type TemplateBody = Rc<dyn Fn(&mut dyn Renderer)>;

/// A template passed around as a value, tagged with the kind of output it
/// produces.
#[derive(Clone)]
pub struct Template {
    kind: ContentKind,
    body: TemplateBody,
}

impl Template {
    pub fn new(kind: ContentKind, body: impl Fn(&mut dyn Renderer) + 'static) -> Self {
        Self {
            kind,
            body: Rc::new(body),
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn invoke(&self, renderer: &mut dyn Renderer) {
        (self.body)(renderer);
    }

    /// Text this template emits, with all structure discarded.
    pub fn render_to_text(&self) -> String {
        let mut buffer = BufferingRenderer::default();
        self.invoke(&mut buffer);
        buffer.text_content()
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum TemplateValue {
    Value(String),
    Content(SanitizedContent),
    Template(Template),
}

impl TemplateValue {
    pub fn content_kind(&self) -> Option<ContentKind> {
        match self {
            TemplateValue::Value(_) => None,
            TemplateValue::Content(content) => Some(content.kind()),
            TemplateValue::Template(template) => Some(template.kind()),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::Value(value.to_owned())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::Value(value)
    }
}

impl From<SanitizedContent> for TemplateValue {
    fn from(value: SanitizedContent) -> Self {
        TemplateValue::Content(value)
    }
}

impl From<Template> for TemplateValue {
    fn from(value: Template) -> Self {
        TemplateValue::Template(value)
    }
}

/// Prints a value at the current position. HTML templates render their
/// structure; everything else becomes a text node.
pub fn print(renderer: &mut dyn Renderer, value: &TemplateValue) {
    match value {
        TemplateValue::Template(template) if template.kind() == ContentKind::Html => {
            template.invoke(renderer);
        }
        TemplateValue::Template(template) => {
            renderer.text(&template.render_to_text());
        }
        TemplateValue::Content(content) => {
            renderer.text(content.as_str());
        }
        TemplateValue::Value(value) => {
            renderer.text(value);
        }
    }
}

/// Prints a value in attribute position. Attribute templates are invoked;
/// anything else is parsed as `name="value"` pairs.
pub fn print_dynamic_attr(renderer: &mut dyn Renderer, value: &TemplateValue) {
    match value {
        TemplateValue::Template(template) if template.kind() == ContentKind::Attributes => {
            template.invoke(renderer);
        }
        TemplateValue::Template(template) => {
            for (name, value) in parse_attributes(&template.render_to_text()) {
                renderer.attr(&name, &value);
            }
        }
        TemplateValue::Content(content) => {
            for (name, value) in parse_attributes(content.as_str()) {
                renderer.attr(&name, &value);
            }
        }
        TemplateValue::Value(value) => {
            for (name, value) in parse_attributes(value) {
                renderer.attr(&name, &value);
            }
        }
    }
}

/// Prints an HTML value as a keyed nested call.
pub fn call_dynamic_html(
    renderer: &mut dyn Renderer,
    key: Option<&KeySegment>,
    value: &TemplateValue,
) {
    with_call_key(renderer, key, |renderer| print(renderer, value));
}

/// Whether `value` would produce any output. Templates are rendered on a
/// probe to find out.
pub fn is_truthy_non_empty(value: &TemplateValue) -> bool {
    match value {
        TemplateValue::Value(value) => !value.is_empty(),
        TemplateValue::Content(content) => !content.as_str().is_empty(),
        TemplateValue::Template(template) => {
            let mut probe = ProbeRenderer::new();
            template.invoke(&mut probe);
            probe.did_render()
        }
    }
}

/// Splits `a="1" b='2' c=3 d` into name/value pairs. Bare names get an empty
/// value.
pub fn parse_attributes(input: &str) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut name = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            name.push(c);
        }
        if name.is_empty() {
            if chars.next().is_none() {
                break;
            }
            // Stray `=` without a name.
            continue;
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut value = String::new();
        if chars.next_if_eq(&'=').is_some() {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            match chars.next_if(|c| *c == '"' || *c == '\'') {
                Some(quote) => {
                    for c in chars.by_ref() {
                        if c == quote {
                            break;
                        }
                        value.push(c);
                    }
                }
                None => {
                    while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                        value.push(c);
                    }
                }
            }
        }
        attributes.push((name, value));
    }
    attributes
}
