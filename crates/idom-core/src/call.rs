//! Helpers generated template code uses around nested calls.

use std::fmt::Display;

use crate::buffering::BufferingRenderer;
use crate::key::KeySegment;
use crate::logger::VisualElement;
use crate::renderer::{Renderer, SuppressingRenderer};

/// Runs `body` with `segment` prepended to the current key.
pub fn with_call_key<R>(
    renderer: &mut dyn Renderer,
    segment: Option<&KeySegment>,
    body: impl FnOnce(&mut dyn Renderer) -> R,
) -> R {
    let saved = renderer.push_call_key(segment);
    let out = body(&mut *renderer);
    renderer.pop_call_key(saved);
    out
}

/// Runs `body` in a fresh scope keyed by `segment` alone.
pub fn with_manual_key<R>(
    renderer: &mut dyn Renderer,
    segment: &KeySegment,
    body: impl FnOnce(&mut dyn Renderer) -> R,
) -> R {
    renderer.push_manual_key(segment);
    let out = body(&mut *renderer);
    renderer.pop_manual_key();
    out
}

/// Wraps `body` in a `{velog}` region. With `logonly` the body still runs,
/// so the logger sees its nested regions, but nothing reaches the host tree.
///
/// # Panics
///
/// When `logonly` is set and the renderer has no logger.
pub fn with_log_region<R>(
    renderer: &mut dyn Renderer,
    element: &VisualElement,
    logonly: bool,
    body: impl FnOnce(&mut dyn Renderer) -> R,
) -> R {
    renderer.verify_log_only(logonly);
    renderer.enter(element, logonly);
    let out = if logonly {
        let mut suppressing = SuppressingRenderer::new(&mut *renderer);
        let out = body(&mut suppressing);
        suppressing.to_default_renderer();
        out
    } else {
        body(&mut *renderer)
    };
    renderer.exit();
    out
}

/// Renders `body` into a buffer and replays it only if it succeeds. A failed
/// template renders nothing; the error is logged and dropped.
///
/// Returns whether the output was kept.
pub fn call_with_error_fallback<E: Display>(
    renderer: &mut dyn Renderer,
    body: impl FnOnce(&mut dyn Renderer) -> Result<(), E>,
) -> bool {
    let mut buffer = BufferingRenderer::for_renderer(renderer);
    match body(&mut buffer) {
        Ok(()) => {
            buffer.replay_on(renderer);
            true
        }
        Err(err) => {
            log::warn!("template call failed, skipping its output: {err}");
            false
        }
    }
}

/// Calls a nested template under a key derived from the call site.
///
/// ```ignore
/// call!(renderer, |r| header(r, &title));
/// ```
#[macro_export]
macro_rules! call {
    ($renderer:expr, $body:expr) => {
        $crate::call::with_call_key(
            $renderer,
            Some(&$crate::key::location_key(file!(), line!(), column!())),
            $body,
        )
    };
}
