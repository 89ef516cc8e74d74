//! Collaborator contracts for GPU resource management.
//!
//! The rendering core never owns GPU resources directly: textures, shader
//! programs, and draw submission are provided by implementations of the
//! traits in this module. [`WgpuBackend`] is the shipped wgpu implementation;
//! [`RecordingBackend`] captures everything in memory for tests and headless
//! tools.

pub mod context;
pub mod recording;
pub mod wgpu_backend;

pub use context::GpuContext;
pub use recording::RecordingBackend;
pub use wgpu_backend::WgpuBackend;

use std::collections::HashMap;

use crate::batch::SpriteVertex;
use crate::rect::Rect;

/// Identifies a source image (the asset-loader key, not a GPU resource).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImageKey(String);

impl ImageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ImageKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque handle to a GPU texture issued by a [`TextureManager`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a compiled shader program.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ProgramHandle(pub u32);

/// Location of a uniform within a program: a byte offset into the program's
/// uniform buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct UniformLocation(pub u32);

/// A resolved texture plus the image dimensions needed to normalize atlas
/// frame rectangles into UV space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureInfo {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
}

/// Scalar/vector types a uniform can hold.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
}

impl UniformType {
    /// WGSL alignment in bytes.
    pub fn align(self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 | UniformType::Vec4 => 16,
        }
    }

    /// Size in bytes.
    pub fn size(self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
        }
    }

    pub fn wgsl(self) -> &'static str {
        match self {
            UniformType::Float => "f32",
            UniformType::Vec2 => "vec2<f32>",
            UniformType::Vec3 => "vec3<f32>",
            UniformType::Vec4 => "vec4<f32>",
            UniformType::Int => "i32",
        }
    }
}

/// A uniform value, type-dispatched when pushed to a program.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Int(_) => UniformType::Int,
        }
    }

    /// Raw little-endian bytes, for writing into a uniform buffer.
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec2(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec3(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec4(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Int(v) => bytemuck::bytes_of(v).to_vec(),
        }
    }
}

/// A uniform slot in a program's buffer layout.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformBinding {
    pub name: String,
    pub ty: UniformType,
    pub location: UniformLocation,
}

/// Everything a [`ShaderCompiler`] needs to build one program.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramDescriptor {
    /// WGSL containing the shared declarations and the vertex entry point.
    pub vertex_source: String,
    /// WGSL containing the fragment entry point.
    pub fragment_source: String,
    /// Uniform layout, offsets already computed.
    pub uniforms: Vec<UniformBinding>,
    /// Total uniform buffer size in bytes (16-byte aligned).
    pub uniform_buffer_size: u32,
}

impl ProgramDescriptor {
    /// The full shader module source.
    pub fn module_source(&self) -> String {
        format!("{}\n{}", self.vertex_source, self.fragment_source)
    }
}

/// A compiled program: the handle plus its uniform-location table.
#[derive(Clone, Debug)]
pub struct CompiledProgram {
    pub handle: ProgramHandle,
    pub uniform_locations: HashMap<String, UniformLocation>,
}

/// Resolves source images to GPU textures.
///
/// Returns `None` (never an error) for images that are unknown or not yet
/// fully loaded; callers skip the affected draw and retry next frame.
pub trait TextureManager {
    fn get_texture(&mut self, image: &ImageKey) -> Option<TextureInfo>;
}

/// Compiles shader programs and pushes uniform values to them.
///
/// `register` is synchronous; this core never registers the same name twice.
pub trait ShaderCompiler {
    fn register(&mut self, name: &str, descriptor: &ProgramDescriptor) -> CompiledProgram;
    fn set_uniform(&mut self, program: ProgramHandle, location: UniformLocation, value: &UniformValue);
}

/// Accepts batched quad geometry as indexed draw submissions.
pub trait DrawDevice {
    /// Submit one indexed draw: `quad_count` quads, 4 vertices and 6 indices
    /// each. `program == None` uses the device's base program.
    fn draw_quads(
        &mut self,
        program: Option<ProgramHandle>,
        texture: TextureHandle,
        vertices: &[SpriteVertex],
        indices: &[u16],
        quad_count: usize,
    );
}

/// Visibility predicate for traversal culling.
pub trait Camera {
    fn is_visible(&self, bounds: &Rect) -> bool;
}
