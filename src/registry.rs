//! Dispatch from node kinds to their render collectors.

use std::collections::HashMap;

use crate::scene::{NodeId, Scene};

/// Stable small-integer tag identifying a node's concrete kind.
///
/// Built-in kinds occupy the low values; embedders may define their own
/// above [`NodeKind::USER_BASE`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeKind(pub u16);

impl NodeKind {
    pub const GROUP: Self = Self(0);
    pub const SPRITE: Self = Self(1);
    /// First value available for embedder-defined kinds.
    pub const USER_BASE: Self = Self(256);
}

bitflags::bitflags! {
    /// Per-node render hints, passed through the traversal to collectors and
    /// the shader layer. Opaque to the traversal itself.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct RenderHints: u32 {
        /// Snap vertex positions to whole pixels.
        const PIXEL_SNAP = 1 << 0;
        /// Render without alpha blending.
        const OPAQUE = 1 << 1;
        /// Exclude from camera culling even when culling is enabled.
        const NO_CULL = 1 << 2;
    }
}

/// Receives visible nodes during traversal and accumulates their draw data.
pub trait Collector {
    /// Called once per visible node of the registered kind.
    ///
    /// `opacity` is the effective opacity accumulated down the tree.
    fn collect(&mut self, scene: &Scene, node: NodeId, opacity: f32, hints: RenderHints);

    /// Called by the host before traversal starts for a frame.
    fn begin_frame(&mut self) {}

    /// Called by the host after traversal; flush any remaining data here.
    fn end_frame(&mut self) {}
}

/// Lookup from node kind to the collector responsible for it.
///
/// Policy only: kinds without a registered collector are not an error, the
/// traversal still descends into their children.
#[derive(Default)]
pub struct RendererRegistry {
    handlers: HashMap<NodeKind, Box<dyn Collector>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector for a kind, replacing any previous one.
    pub fn register(&mut self, kind: NodeKind, collector: Box<dyn Collector>) {
        self.handlers.insert(kind, collector);
    }

    /// Remove and return the collector for a kind, if any.
    pub fn unregister(&mut self, kind: NodeKind) -> Option<Box<dyn Collector>> {
        self.handlers.remove(&kind)
    }

    pub fn has(&self, kind: NodeKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn get_mut(&mut self, kind: NodeKind) -> Option<&mut dyn Collector> {
        match self.handlers.get_mut(&kind) {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }

    /// Notify every collector that a frame is starting.
    pub fn begin_frame(&mut self) {
        for collector in self.handlers.values_mut() {
            collector.begin_frame();
        }
    }

    /// Ask every collector to flush its remaining data.
    pub fn end_frame(&mut self) {
        for collector in self.handlers.values_mut() {
            collector.end_frame();
        }
    }
}
