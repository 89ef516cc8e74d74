//! Vertex format shared by the sprite batch and the GPU backends.

use wgpu::{VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};

/// One corner of a sprite quad: world-space position, UV, effective opacity.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SpriteVertex {
    /// Position in world coordinates (the backend converts to NDC).
    pub position: [f32; 2],
    /// Texture coordinates.
    pub uv: [f32; 2],
    /// Effective opacity accumulated down the scene tree.
    pub opacity: f32,
}

impl SpriteVertex {
    pub fn desc() -> VertexBufferLayout<'static> {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<SpriteVertex>() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: &[
                // position
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x2,
                },
                // uv
                VertexAttribute {
                    offset: 8,
                    shader_location: 1,
                    format: VertexFormat::Float32x2,
                },
                // opacity
                VertexAttribute {
                    offset: 16,
                    shader_location: 2,
                    format: VertexFormat::Float32,
                },
            ],
        }
    }
}

/// Build the static index list for `capacity` quad slots.
///
/// Quad `i` uses vertex base `4*i`; its two triangles share the diagonal:
/// `[4i, 4i+1, 4i+2, 4i+1, 4i+3, 4i+2]`. Built once at batch construction,
/// never regenerated per frame.
pub fn quad_indices(capacity: usize) -> Vec<u16> {
    let mut indices = Vec::with_capacity(capacity * 6);
    for i in 0..capacity {
        let base = (i * 4) as u16;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 1, base + 3, base + 2]);
    }
    indices
}
