//! Key segments, the key stack and the prefix-relaxed matching rule.
//!
//! A key is the concatenation, most recent first, of self-delimiting tokens
//! `<len><disc><payload>` where `disc` is `_` (null), `#` (number) or `:`
//! (anything else) and `len` is the payload length in UTF-16 code units. The
//! format is shared with other runtimes that read keys back from host nodes,
//! so it must not change.

use std::borrow::Cow;
use std::fmt::{self, Write as _};

use sha2::{Digest, Sha256};

use crate::error::{KeyDisciplineError, UsageError};
use crate::patcher::NodeType;
use crate::NodeId;

/// One atomic key value.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySegment {
    Null,
    Number(f64),
    Str(String),
}

impl KeySegment {
    fn discriminator(&self) -> char {
        match self {
            KeySegment::Null => '_',
            KeySegment::Number(_) => '#',
            KeySegment::Str(_) => ':',
        }
    }

    /// The stringified value carried after the discriminator.
    pub fn payload(&self) -> Cow<'_, str> {
        match self {
            KeySegment::Null => Cow::Borrowed("null"),
            KeySegment::Number(n) => Cow::Owned(format_number(*n)),
            KeySegment::Str(s) => Cow::Borrowed(s.as_str()),
        }
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        KeySegment::Str(value.to_owned())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        KeySegment::Str(value)
    }
}

impl From<&String> for KeySegment {
    fn from(value: &String) -> Self {
        KeySegment::Str(value.clone())
    }
}

impl From<f64> for KeySegment {
    fn from(value: f64) -> Self {
        KeySegment::Number(value)
    }
}

impl From<f32> for KeySegment {
    fn from(value: f32) -> Self {
        KeySegment::Number(value as f64)
    }
}

macro_rules! number_segment_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KeySegment {
                fn from(value: $ty) -> Self {
                    KeySegment::Number(value as f64)
                }
            }
        )*
    };
}

number_segment_from!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl<T: Into<KeySegment>> From<Option<T>> for KeySegment {
    fn from(value: Option<T>) -> Self {
        value.map_or(KeySegment::Null, Into::into)
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if n == 0.0 {
        // Negative zero stringifies as "0".
        return "0".to_owned();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        return format!("{n:.0}");
    }
    format!("{n}")
}

/// Encodes one segment into its self-delimiting token.
pub fn encode(segment: &KeySegment) -> String {
    let payload = segment.payload();
    let len = payload.encode_utf16().count();
    let mut token = String::with_capacity(payload.len() + 8);
    token.push_str(&len.to_string());
    token.push(segment.discriminator());
    token.push_str(&payload);
    token
}

/// Returns `true` when `proposed` identifies the same logical position as
/// `existing`: the keys are equal, or one is a prefix of the other.
///
/// The prefix relaxation can pair unrelated siblings whose keys happen to be
/// prefixes of each other; stored keys depend on it, so it stays.
pub fn is_match(proposed: Option<&str>, existing: Option<&str>) -> bool {
    match (proposed, existing) {
        (None, None) => true,
        (Some(proposed), Some(existing)) => {
            proposed == existing
                || proposed.starts_with(existing)
                || existing.starts_with(proposed)
        }
        _ => false,
    }
}

/// Node matcher installed into the patcher: same node type name and
/// [`is_match`] keys.
pub fn matches(
    _node: NodeId,
    requested: &NodeType,
    existing: &NodeType,
    proposed_key: Option<&str>,
    existing_key: Option<&str>,
) -> bool {
    requested.name() == existing.name() && is_match(proposed_key, existing_key)
}

/// Stable segment for a call site, used for keys of nested template calls.
///
/// Keys end up stored on host nodes, so the digest is a fixed algorithm:
/// the first 8 bytes of SHA-256 over `file:line:column`, hex encoded.
pub fn location_key(file: &str, line: u32, column: u32) -> KeySegment {
    let mut hasher = Sha256::new();
    hasher.update(format!("{file}:{line}:{column}").as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in &digest[..8] {
        let _ = write!(hex, "{byte:02x}");
    }
    KeySegment::Str(hex)
}

/// What the key stack does when its push/pop discipline is broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDiscipline {
    Ignore,
    Warn,
    Panic,
}

impl Default for KeyDiscipline {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            KeyDiscipline::Panic
        } else {
            KeyDiscipline::Warn
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Scope {
    key: String,
    calls: usize,
}

/// Per-renderer stack of accumulated keys, one entry per manual-key scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStack {
    scopes: Vec<Scope>,
    discipline: KeyDiscipline,
}

impl Default for KeyStack {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStack {
    pub fn new() -> Self {
        Self::with_discipline(KeyDiscipline::default())
    }

    pub fn with_discipline(discipline: KeyDiscipline) -> Self {
        Self {
            scopes: vec![Scope::default()],
            discipline,
        }
    }

    /// A stack whose root scope already carries `top`, for rendering a
    /// subtree on its own with the keys it had inside a larger render.
    pub fn rooted_at(top: impl Into<String>, discipline: KeyDiscipline) -> Self {
        Self {
            scopes: vec![Scope {
                key: top.into(),
                calls: 0,
            }],
            discipline,
        }
    }

    pub fn discipline(&self) -> KeyDiscipline {
        self.discipline
    }

    pub fn set_discipline(&mut self, discipline: KeyDiscipline) {
        self.discipline = discipline;
    }

    /// Number of scopes, the root scope included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn current_top(&self) -> &str {
        self.scopes.last().map_or("", |scope| scope.key.as_str())
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Opens a scope whose accumulated key starts with `segment` alone.
    pub fn push_manual_key(&mut self, segment: &KeySegment) {
        let key = encode(segment);
        log::trace!("push manual key scope {key}");
        self.scopes.push(Scope { key, calls: 0 });
    }

    pub fn pop_scope(&mut self) {
        match self.scopes.len() {
            0 => {
                self.violation(KeyDisciplineError::RootScopePopped);
                return;
            }
            1 => self.violation(KeyDisciplineError::RootScopePopped),
            _ => {}
        }
        let outstanding = self.scopes.last().map_or(0, |scope| scope.calls);
        if outstanding > 0 {
            self.violation(KeyDisciplineError::ScopeWithOutstandingCalls { outstanding });
        }
        self.scopes.pop();
    }

    pub fn pop_manual_key(&mut self) {
        self.pop_scope();
    }

    /// Prepends `segment` to the top entry and returns the previous top so the
    /// caller can restore it with [`KeyStack::pop_call_key`]. With no segment
    /// the top is left as is.
    pub fn push_call_key(&mut self, segment: Option<&KeySegment>) -> String {
        if self.scopes.is_empty() {
            self.scopes.push(Scope::default());
        }
        let scope = self
            .scopes
            .last_mut()
            .expect("key stack has at least one scope");
        scope.calls += 1;
        let previous = scope.key.clone();
        if let Some(segment) = segment {
            let token = encode(segment);
            let mut next = String::with_capacity(token.len() + previous.len());
            next.push_str(&token);
            next.push_str(&previous);
            scope.key = next;
        }
        log::trace!("push call key: {previous:?} -> {:?}", scope.key);
        previous
    }

    pub fn pop_call_key(&mut self, saved: String) {
        let unmatched = match self.scopes.last_mut() {
            Some(scope) if scope.calls > 0 => {
                scope.calls -= 1;
                false
            }
            _ => true,
        };
        if unmatched {
            self.violation(KeyDisciplineError::UnmatchedCallPop);
        }
        match self.scopes.last_mut() {
            Some(scope) => scope.key = saved,
            None => self.scopes.push(Scope {
                key: saved,
                calls: 0,
            }),
        }
        log::trace!("pop call key -> {:?}", self.current_top());
    }

    fn violation(&self, err: KeyDisciplineError) {
        match self.discipline {
            KeyDiscipline::Ignore => {}
            KeyDiscipline::Warn => log::warn!("{}", UsageError::from(err)),
            KeyDiscipline::Panic => panic!("{}", UsageError::from(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_each_discriminator() {
        assert_eq!(encode(&KeySegment::Null), "4_null");
        assert_eq!(encode(&KeySegment::from(12)), "2#12");
        assert_eq!(encode(&KeySegment::from(1.5)), "3#1.5");
        assert_eq!(encode(&KeySegment::from("abc")), "3:abc");
        assert_eq!(encode(&KeySegment::from("")), "0:");
        assert_eq!(encode(&KeySegment::from(None::<&str>)), "4_null");
    }

    #[test]
    fn number_and_string_with_same_text_differ() {
        assert_ne!(
            encode(&KeySegment::from(7)),
            encode(&KeySegment::from("7"))
        );
    }

    #[test]
    fn numbers_stringify_canonically() {
        assert_eq!(KeySegment::from(-0.0).payload(), "0");
        assert_eq!(KeySegment::from(-3).payload(), "-3");
        assert_eq!(KeySegment::from(f64::NAN).payload(), "NaN");
        assert_eq!(KeySegment::from(f64::NEG_INFINITY).payload(), "-Infinity");
        assert_eq!(KeySegment::from(0.25).payload(), "0.25");
    }

    #[test]
    fn length_counts_utf16_units() {
        // U+1F600 takes two UTF-16 code units.
        assert_eq!(encode(&KeySegment::from("\u{1F600}")), "2:\u{1F600}");
        assert_eq!(encode(&KeySegment::from("é")), "1:é");
    }

    #[test]
    fn concatenation_keeps_token_boundaries() {
        let left = encode(&KeySegment::from("1a")) + &encode(&KeySegment::from("b"));
        let right = encode(&KeySegment::from("1")) + &encode(&KeySegment::from("a1:b"));
        assert_eq!(left, "2:1a1:b");
        assert_ne!(left, right);
    }

    #[test]
    fn prefix_matching_is_symmetric() {
        assert!(is_match(Some("1:a"), Some("1:a1:b")));
        assert!(is_match(Some("1:a1:b"), Some("1:a")));
        assert!(!is_match(Some("1:c"), Some("1:b")));
        assert!(is_match(None, None));
        assert!(!is_match(Some("1:a"), None));
    }

    #[test]
    fn matcher_requires_same_type_name() {
        let div = NodeType::element("div");
        let span = NodeType::element("span");
        assert!(matches(0, &div, &div, Some("1:a"), Some("1:a")));
        assert!(!matches(0, &div, &span, Some("1:a"), Some("1:a")));
        assert!(!matches(0, &NodeType::Text, &div, None, None));
    }

    #[test]
    fn call_keys_prepend_most_recent_first() {
        let mut stack = KeyStack::new();
        let outer = stack.push_call_key(Some(&KeySegment::from("a")));
        let inner = stack.push_call_key(Some(&KeySegment::from("b")));
        assert_eq!(stack.current_top(), "1:b1:a");
        stack.pop_call_key(inner);
        assert_eq!(stack.current_top(), "1:a");
        stack.pop_call_key(outer);
        assert_eq!(stack.current_top(), "");
    }

    #[test]
    fn absent_call_key_leaves_top_unchanged() {
        let mut stack = KeyStack::new();
        stack.push_manual_key(&KeySegment::from("k"));
        let saved = stack.push_call_key(None);
        assert_eq!(saved, "1:k");
        assert_eq!(stack.current_top(), "1:k");
        stack.pop_call_key(saved);
        stack.pop_manual_key();
        assert_eq!(stack.current_top(), "");
    }

    #[test]
    fn manual_key_resets_propagation() {
        let mut stack = KeyStack::new();
        let root = stack.push_call_key(Some(&KeySegment::from("root")));
        stack.push_manual_key(&KeySegment::from("k"));
        let call = stack.push_call_key(Some(&KeySegment::from("x")));
        assert_eq!(stack.current_top(), "1:x1:k");
        assert!(!stack.current_top().contains("root"));
        stack.pop_call_key(call);
        stack.pop_manual_key();
        assert_eq!(stack.current_top(), "4:root");
        stack.pop_call_key(root);
    }

    #[test]
    fn empty_scope_starts_blank() {
        let mut stack = KeyStack::new();
        let saved = stack.push_call_key(Some(&KeySegment::from("a")));
        stack.push_scope();
        assert_eq!(stack.current_top(), "");
        assert_eq!(stack.depth(), 2);
        stack.pop_scope();
        stack.pop_call_key(saved);
    }

    #[test]
    #[should_panic(expected = "scope popped while 1 call key(s) are still pushed")]
    fn popping_scope_with_outstanding_call_panics() {
        let mut stack = KeyStack::with_discipline(KeyDiscipline::Panic);
        stack.push_scope();
        let _saved = stack.push_call_key(Some(&KeySegment::from("a")));
        stack.pop_scope();
    }

    #[test]
    #[should_panic(expected = "the root key scope cannot be popped")]
    fn popping_root_scope_panics() {
        let mut stack = KeyStack::with_discipline(KeyDiscipline::Panic);
        stack.pop_scope();
    }

    #[test]
    fn ignored_violations_still_restore_keys() {
        let mut stack = KeyStack::with_discipline(KeyDiscipline::Ignore);
        stack.pop_call_key("3:abc".to_owned());
        assert_eq!(stack.current_top(), "3:abc");
        stack.pop_scope();
        assert_eq!(stack.current_top(), "");
        assert_eq!(stack.depth(), 0);
        let saved = stack.push_call_key(Some(&KeySegment::from("z")));
        assert_eq!(saved, "");
        assert_eq!(stack.current_top(), "1:z");
    }

    #[test]
    fn location_keys_are_stable_per_site() {
        let a = location_key("a.rs", 1, 2);
        assert_eq!(a, location_key("a.rs", 1, 2));
        assert_ne!(a, location_key("a.rs", 1, 3));
    }

    #[test]
    fn location_keys_do_not_depend_on_the_build() {
        // First 8 bytes of sha256("a.rs:1:2").
        assert_eq!(location_key("a.rs", 1, 2), KeySegment::from("0a86e50597eefe8c"));
        assert_eq!(encode(&location_key("a.rs", 1, 2)), "16:0a86e50597eefe8c");
    }
}
