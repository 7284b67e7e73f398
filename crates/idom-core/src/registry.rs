//! Priority-ordered delegate table.

use crate::collections::map::HashMap;
use crate::content::Template;
use crate::error::RegistryError;

struct Delegate {
    variant: String,
    priority: i32,
    template: Template,
}

/// Implementations registered for a delegate name, each under a variant and
/// a priority. Selection prefers the exact variant and falls back to the
/// default (empty) variant; within a variant the highest priority wins.
#[derive(Default)]
pub struct DelegateRegistry {
    delegates: HashMap<String, Vec<Delegate>>,
}

impl DelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        variant: impl Into<String>,
        priority: i32,
        template: Template,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let variant = variant.into();
        let entries = self.delegates.entry(name.clone()).or_default();
        if entries
            .iter()
            .any(|d| d.variant == variant && d.priority == priority)
        {
            return Err(RegistryError::DuplicatePriority {
                name,
                variant,
                priority,
            });
        }
        log::debug!("registered delegate {name}:{variant} at priority {priority}");
        entries.push(Delegate {
            variant,
            priority,
            template,
        });
        Ok(())
    }

    pub fn select(&self, name: &str, variant: &str) -> Option<&Template> {
        let entries = self.delegates.get(name)?;
        best(entries, variant).or_else(|| {
            if variant.is_empty() {
                None
            } else {
                best(entries, "")
            }
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.delegates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.delegates.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn best<'a>(entries: &'a [Delegate], variant: &str) -> Option<&'a Template> {
    entries
        .iter()
        .filter(|d| d.variant == variant)
        .max_by_key(|d| d.priority)
        .map(|d| &d.template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::BufferingRenderer;
    use crate::content::ContentKind;
    use crate::renderer::{ProbeRenderer, Renderer};

    fn emitting(text: &'static str) -> Template {
        Template::new(ContentKind::Html, move |r: &mut dyn Renderer| {
            r.text(text);
        })
    }

    fn output(template: Option<&Template>) -> Option<String> {
        template.map(Template::render_to_text)
    }

    #[test]
    fn highest_priority_wins_within_variant() {
        let mut registry = DelegateRegistry::new();
        registry.register("card", "", 0, emitting("base")).expect("register");
        registry.register("card", "", 10, emitting("override")).expect("register");
        registry.register("card", "", -5, emitting("low")).expect("register");
        assert_eq!(output(registry.select("card", "")).as_deref(), Some("override"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn unknown_variant_falls_back_to_default() {
        let mut registry = DelegateRegistry::new();
        registry.register("card", "", 0, emitting("base")).expect("register");
        registry.register("card", "compact", 0, emitting("compact")).expect("register");
        assert_eq!(output(registry.select("card", "compact")).as_deref(), Some("compact"));
        assert_eq!(output(registry.select("card", "wide")).as_deref(), Some("base"));
        assert!(registry.select("missing", "").is_none());
    }

    #[test]
    fn equal_priority_is_rejected() {
        let mut registry = DelegateRegistry::new();
        registry.register("card", "x", 1, emitting("a")).expect("register");
        assert_eq!(
            registry.register("card", "x", 1, emitting("b")),
            Err(RegistryError::DuplicatePriority {
                name: "card".to_owned(),
                variant: "x".to_owned(),
                priority: 1,
            })
        );
        registry.register("card", "y", 1, emitting("b")).expect("other variant");
    }

    #[test]
    fn registries_are_independent() {
        let mut first = DelegateRegistry::new();
        let second = DelegateRegistry::new();
        first.register("card", "", 0, emitting("a")).expect("register");
        assert!(first.contains("card"));
        assert!(!second.contains("card"));
        assert!(second.is_empty());

        let mut probe = ProbeRenderer::new();
        first.select("card", "").expect("registered").invoke(&mut probe);
        assert!(probe.did_render());
        let mut buffer = BufferingRenderer::default();
        first.select("card", "").expect("registered").invoke(&mut buffer);
        assert_eq!(buffer.text_content(), "a");
    }
}
