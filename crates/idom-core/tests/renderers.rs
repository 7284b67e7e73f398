//! Renderer variants observed through a recording patcher.

use idom_core::{
    BufferingRenderer, DefaultRenderer, KeySegment, MemoryPatcher, PatchMode, Patcher,
    ProbeRenderer, Renderer, SuppressingRenderer, TemplateRuntime,
};
use idom_testing::{render_to_dump, PatchCall, RecordingPatcher};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Tree {
    Element {
        tag: &'static str,
        key: Option<u8>,
        attrs: Vec<(&'static str, String)>,
        children: Vec<Tree>,
    },
    Text(String),
    Call(String, Vec<Tree>),
}

fn tree_strategy() -> impl Strategy<Value = Vec<Tree>> {
    let tag = prop::sample::select(vec!["div", "span", "li"]);
    let leaf = prop_oneof![
        "[a-z ]{0,5}".prop_map(Tree::Text),
        (tag.clone(), prop::option::of(0u8..4)).prop_map(|(tag, key)| Tree::Element {
            tag,
            key,
            attrs: Vec::new(),
            children: Vec::new(),
        }),
    ];
    let node = leaf.prop_recursive(3, 24, 4, move |inner| {
        let attrs = prop::collection::vec(
            (prop::sample::select(vec!["id", "class", "title"]), "[a-z]{0,3}"),
            0..3,
        );
        prop_oneof![
            (
                tag.clone(),
                prop::option::of(0u8..4),
                attrs,
                prop::collection::vec(inner.clone(), 0..4)
            )
                .prop_map(|(tag, key, attrs, children)| Tree::Element {
                    tag,
                    key,
                    attrs,
                    children,
                }),
            ("[a-z]{1,3}", prop::collection::vec(inner, 0..3))
                .prop_map(|(key, children)| Tree::Call(key, children)),
        ]
    });
    prop::collection::vec(node, 0..5)
}

fn emit(renderer: &mut dyn Renderer, trees: &[Tree]) {
    for tree in trees {
        match tree {
            Tree::Element {
                tag,
                key,
                attrs,
                children,
            } => {
                let key = key.map(KeySegment::from);
                renderer.open(tag, key.as_ref());
                for (name, value) in attrs {
                    renderer.attr(name, value);
                }
                renderer.apply_attrs();
                emit(renderer, children);
                renderer.close();
            }
            Tree::Text(value) => {
                renderer.text(value);
            }
            Tree::Call(key, children) => {
                let saved = renderer.push_call_key(Some(&KeySegment::from(key.as_str())));
                emit(renderer, children);
                renderer.pop_call_key(saved);
            }
        }
    }
}

/// Renders `trees` directly and returns the recorded primitives.
fn direct_calls(trees: &[Tree]) -> Vec<PatchCall> {
    let mut patcher = RecordingPatcher::new(MemoryPatcher::new());
    let root = patcher.inner().root();
    patcher.begin_patch(root, PatchMode::Inner).expect("begin");
    emit(&mut DefaultRenderer::new(&mut patcher), trees);
    patcher.end_patch().expect("end");
    patcher.take_calls()
}

fn has_output(trees: &[Tree]) -> bool {
    trees.iter().any(|tree| match tree {
        Tree::Element { .. } => true,
        Tree::Text(value) => !value.is_empty(),
        Tree::Call(_, children) => has_output(children),
    })
}

proptest! {
    /// Nothing issued through a suppressing renderer reaches the patcher,
    /// yet its key stack moves exactly like the default renderer's.
    #[test]
    fn suppressing_renderer_is_pure(trees in tree_strategy(), outer in "[a-z]{1,3}") {
        let mut patcher = RecordingPatcher::new(MemoryPatcher::new());
        let root = patcher.inner().root();
        patcher.begin_patch(root, PatchMode::Inner).expect("begin");
        {
            let mut renderer = DefaultRenderer::new(&mut patcher);
            let saved = renderer.push_call_key(Some(&KeySegment::from(outer.as_str())));
            let top = renderer.current_top().to_owned();
            let mut suppressing = SuppressingRenderer::new(&mut renderer);
            prop_assert_eq!(suppressing.current_top(), top.as_str());
            let inner = suppressing.push_call_key(Some(&KeySegment::from("x")));
            let suppressed_top = suppressing.current_top().to_owned();
            emit(&mut suppressing, &trees);
            prop_assert_eq!(suppressing.current_top(), suppressed_top.as_str());
            suppressing.pop_call_key(inner);
            prop_assert_eq!(suppressing.current_top(), top.as_str());

            let back = suppressing.to_default_renderer();
            let direct = back.push_call_key(Some(&KeySegment::from("x")));
            prop_assert_eq!(back.current_top(), suppressed_top.as_str());
            back.pop_call_key(direct);
            renderer.pop_call_key(saved);
        }
        patcher.end_patch().expect("end");
        prop_assert!(patcher.calls().is_empty());
        prop_assert!(patcher.inner().children(root).is_empty());
    }

    /// Replaying a buffer issues exactly the primitives direct rendering does.
    #[test]
    fn buffered_replay_matches_direct_rendering(trees in tree_strategy()) {
        let expected = direct_calls(&trees);

        let mut patcher = RecordingPatcher::new(MemoryPatcher::new());
        let root = patcher.inner().root();
        patcher.begin_patch(root, PatchMode::Inner).expect("begin");
        {
            let mut renderer = DefaultRenderer::new(&mut patcher);
            let mut buffer = BufferingRenderer::for_renderer(&renderer);
            emit(&mut buffer, &trees);
            buffer.replay_on(&mut renderer);
        }
        patcher.end_patch().expect("end");
        prop_assert_eq!(patcher.take_calls(), expected);
    }

    /// A probe reports output exactly when something other than empty text
    /// was emitted.
    #[test]
    fn probe_truthiness_follows_output(trees in tree_strategy()) {
        let mut probe = ProbeRenderer::new();
        emit(&mut probe, &trees);
        prop_assert_eq!(probe.did_render(), has_output(&trees));
    }
}

#[test]
fn probe_counts_attributes_even_when_empty() {
    let mut probe = ProbeRenderer::new();
    probe.text("");
    probe.text("");
    assert!(!probe.did_render());
    probe.attr("data-empty", "");
    assert!(probe.did_render());
}

#[test]
fn keyed_children_reorder_without_recreation() {
    let runtime = TemplateRuntime::default();
    let mut patcher = MemoryPatcher::new();
    runtime.attach(&mut patcher);
    let root = patcher.root();
    let list = |order: &'static [&'static str]| {
        move |renderer: &mut dyn Renderer| {
            for item in order {
                renderer.open("li", Some(&KeySegment::from(*item)));
                renderer.text(item);
                renderer.close();
            }
        }
    };

    runtime
        .patch_inner(&mut patcher, root, list(&["a", "b", "c"]))
        .expect("first pass");
    let before = patcher.children(root);
    patcher.reset_stats();
    runtime
        .patch_inner(&mut patcher, root, list(&["c", "b", "a"]))
        .expect("second pass");

    assert_eq!(patcher.children(root), vec![before[2], before[1], before[0]]);
    assert_eq!(patcher.stats().created, 0);
    assert_eq!(patcher.stats().removed, 0);
}

#[test]
fn dump_shows_keys_in_most_recent_first_order() {
    let dump = render_to_dump(|renderer| {
        let saved = renderer.push_call_key(Some(&KeySegment::from("a")));
        let inner = renderer.push_call_key(Some(&KeySegment::from("b")));
        renderer.open("p", None);
        renderer.close();
        renderer.pop_call_key(inner);
        renderer.pop_call_key(saved);
    })
    .expect("render");
    assert_eq!(dump, "<#document>\n  <p key=\"1:b1:a\">\n");
}
