//! Depth-first scene traversal with culling and opacity accumulation.
//!
//! The traversal walks a subtree in depth-sorted order, skips invisible and
//! (optionally) off-camera subtrees, accumulates effective opacity down the
//! tree, and hands each visible node to the collector registered for its
//! kind. It is stateless between frames; per-frame counters live in a
//! caller-owned [`TraversalStats`].

use crate::gpu::Camera;
use crate::registry::{RenderHints, RendererRegistry};
use crate::scene::{NodeId, Scene};

/// Per-frame traversal counters, reset by the caller before each frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TraversalStats {
    /// Visible nodes visited, including ones subsequently culled.
    pub total_objects: u64,
    /// Nodes handed to a registered collector.
    pub rendered_objects: u64,
    /// Subtrees skipped by the camera visibility test (one per subtree root).
    pub culled_objects: u64,
}

impl TraversalStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Options for one traversal pass.
#[derive(Default)]
pub struct TraverseOptions<'a> {
    /// Camera supplying the visibility predicate. Culling without a camera
    /// is a configuration gap, not an error: the test is simply skipped.
    pub camera: Option<&'a dyn Camera>,
    pub enable_culling: bool,
}

/// Walk the subtree rooted at `root`, dispatching visible nodes to the
/// registry's collectors.
///
/// Invisible nodes hide their whole subtree and count toward no stat.
/// Culling is conservative at the subtree level: a culled node's children
/// are never visited. Nodes without a registered collector still have their
/// children traversed.
pub fn traverse_and_collect(
    scene: &mut Scene,
    root: NodeId,
    registry: &mut RendererRegistry,
    options: &TraverseOptions,
    mut stats: Option<&mut TraversalStats>,
) {
    visit(scene, root, registry, options, 1.0, &mut stats);
}

fn visit(
    scene: &mut Scene,
    node: NodeId,
    registry: &mut RendererRegistry,
    options: &TraverseOptions,
    parent_opacity: f32,
    stats: &mut Option<&mut TraversalStats>,
) {
    if !scene.visible(node) {
        return;
    }

    if let Some(s) = stats.as_deref_mut() {
        s.total_objects += 1;
    }

    let hints = scene.hints(node);

    if options.enable_culling && !hints.contains(RenderHints::NO_CULL) {
        if let Some(camera) = options.camera {
            if let Some(bounds) = scene.world_bounds(node) {
                if !camera.is_visible(&bounds) {
                    if let Some(s) = stats.as_deref_mut() {
                        s.culled_objects += 1;
                    }
                    return;
                }
            }
        }
    }

    let effective_opacity = parent_opacity * scene.opacity(node);

    if let Some(collector) = registry.get_mut(scene.kind(node)) {
        collector.collect(scene, node, effective_opacity, hints);
        if let Some(s) = stats.as_deref_mut() {
            s.rendered_objects += 1;
        }
    }

    let children = scene.sorted_children(node).to_vec();
    for child in children {
        visit(scene, child, registry, options, effective_opacity, stats);
    }
}
