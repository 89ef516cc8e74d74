//! A 2D scene-graph rendering core.
//!
//! A [`Scene`](scene::Scene) holds a tree of transform nodes; a frame is
//! produced by traversing it depth-first, culling against a camera, and
//! handing visible nodes to the collector registered for their kind. Sprite
//! collection batches quads per texture; shader effects compose per-sprite
//! fragment snippets into cached programs.
//!
//! The core is GPU-agnostic: it talks to a backend through the traits in
//! [`gpu`]. [`gpu::WgpuBackend`] is the shipped implementation,
//! [`gpu::RecordingBackend`] runs the same pipeline in memory for tests.

pub mod batch;
pub mod effects;
pub mod gpu;
pub mod matrix;
pub mod rect;
pub mod registry;
pub mod scene;
pub mod traversal;

pub mod prelude {
    pub use crate::batch::{SpriteBatch, SpriteVertex};
    pub use crate::effects::{EffectKind, ShaderEffectRegistry};
    pub use crate::gpu::{
        Camera, DrawDevice, GpuContext, ImageKey, RecordingBackend, ShaderCompiler,
        TextureManager, UniformValue, WgpuBackend,
    };
    pub use crate::matrix::Matrix2d;
    pub use crate::rect::Rect;
    pub use crate::registry::{Collector, NodeKind, RenderHints, RendererRegistry};
    pub use crate::scene::{NodeContent, NodeId, Scene, SpriteData, TextureAtlas};
    pub use crate::traversal::{traverse_and_collect, TraversalStats, TraverseOptions};
}
