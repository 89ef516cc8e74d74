//! In-memory backend that records everything submitted to it.
//!
//! Implements all three collaborator traits without touching a GPU, so the
//! frame pipeline can run in unit tests and headless tools. Clones share
//! state: the batch, the effect registry, and the test can each hold a
//! handle to the same recording.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::batch::SpriteVertex;

use super::{
    CompiledProgram, DrawDevice, ImageKey, ProgramDescriptor, ProgramHandle, ShaderCompiler,
    TextureHandle, TextureInfo, TextureManager, UniformLocation, UniformValue,
};

/// One recorded `draw_quads` submission.
#[derive(Clone, Debug)]
pub struct DrawRecord {
    pub program: Option<ProgramHandle>,
    pub texture: TextureHandle,
    pub vertices: Vec<SpriteVertex>,
    pub indices: Vec<u16>,
    pub quad_count: usize,
}

/// One recorded program registration.
#[derive(Clone, Debug)]
pub struct ProgramRecord {
    pub name: String,
    pub descriptor: ProgramDescriptor,
    pub handle: ProgramHandle,
}

enum ImageEntry {
    /// Known to the loader but not yet decoded/uploaded.
    Pending,
    Ready(TextureInfo),
}

#[derive(Default)]
struct RecordingState {
    images: HashMap<ImageKey, ImageEntry>,
    next_texture: u64,
    next_program: u32,
    programs: Vec<ProgramRecord>,
    uniform_writes: Vec<(ProgramHandle, UniformLocation, UniformValue)>,
    draws: Vec<DrawRecord>,
}

/// Cheaply cloneable handle to a shared recording.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    state: Rc<RefCell<RecordingState>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image as fully loaded with the given dimensions.
    pub fn add_image(&self, key: ImageKey, width: u32, height: u32) -> TextureInfo {
        let mut state = self.state.borrow_mut();
        let handle = TextureHandle(state.next_texture);
        state.next_texture += 1;
        let info = TextureInfo {
            handle,
            width,
            height,
        };
        state.images.insert(key, ImageEntry::Ready(info));
        info
    }

    /// Register an image that is known but not yet loaded; `get_texture`
    /// returns `None` for it until `add_image` completes it.
    pub fn add_pending_image(&self, key: ImageKey) {
        self.state
            .borrow_mut()
            .images
            .insert(key, ImageEntry::Pending);
    }

    pub fn draw_count(&self) -> usize {
        self.state.borrow().draws.len()
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.borrow().draws.clone()
    }

    pub fn programs(&self) -> Vec<ProgramRecord> {
        self.state.borrow().programs.clone()
    }

    pub fn uniform_writes(&self) -> Vec<(ProgramHandle, UniformLocation, UniformValue)> {
        self.state.borrow().uniform_writes.clone()
    }

    /// Clear recorded draws and uniform writes, keeping images and programs.
    pub fn clear_recording(&self) {
        let mut state = self.state.borrow_mut();
        state.draws.clear();
        state.uniform_writes.clear();
    }
}

impl TextureManager for RecordingBackend {
    fn get_texture(&mut self, image: &ImageKey) -> Option<TextureInfo> {
        match self.state.borrow().images.get(image) {
            Some(ImageEntry::Ready(info)) => Some(*info),
            Some(ImageEntry::Pending) | None => None,
        }
    }
}

impl ShaderCompiler for RecordingBackend {
    fn register(&mut self, name: &str, descriptor: &ProgramDescriptor) -> CompiledProgram {
        let mut state = self.state.borrow_mut();
        let handle = ProgramHandle(state.next_program);
        state.next_program += 1;
        state.programs.push(ProgramRecord {
            name: name.to_string(),
            descriptor: descriptor.clone(),
            handle,
        });
        CompiledProgram {
            handle,
            uniform_locations: descriptor
                .uniforms
                .iter()
                .map(|u| (u.name.clone(), u.location))
                .collect(),
        }
    }

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        location: UniformLocation,
        value: &UniformValue,
    ) {
        self.state
            .borrow_mut()
            .uniform_writes
            .push((program, location, *value));
    }
}

impl DrawDevice for RecordingBackend {
    fn draw_quads(
        &mut self,
        program: Option<ProgramHandle>,
        texture: TextureHandle,
        vertices: &[SpriteVertex],
        indices: &[u16],
        quad_count: usize,
    ) {
        self.state.borrow_mut().draws.push(DrawRecord {
            program,
            texture,
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
            quad_count,
        });
    }
}
