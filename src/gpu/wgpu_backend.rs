//! wgpu implementation of the GPU collaborator traits.
//!
//! Owns textures, compiled pipelines, and per-program uniform buffers.
//! Draw submissions are recorded during the frame and replayed into a single
//! render pass by [`WgpuBackend::present`]. Clones share state, so the
//! sprite batch, the effect registry, and the host can each hold a handle
//! to the same backend.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use wgpu::{
    BindGroupLayout, Buffer, BufferUsages, Device, Extent3d, Queue, RenderPipeline, Sampler,
    Texture, TextureDimension, TextureFormat, TextureUsages, TextureView,
};

use crate::batch::SpriteVertex;

use super::context::{GpuContext, TARGET_FORMAT};
use super::{
    CompiledProgram, DrawDevice, ImageKey, ProgramDescriptor, ProgramHandle, ShaderCompiler,
    TextureHandle, TextureInfo, TextureManager, UniformLocation, UniformValue,
};

struct LoadedTexture {
    info: TextureInfo,
    // Keeps the GPU resource alive while the view is in use.
    _texture: Texture,
}

struct ProgramEntry {
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    uniform_buffer: Buffer,
    /// CPU-side shadow of the uniform buffer, flushed before presenting.
    staging: Vec<u8>,
    dirty: bool,
}

struct PendingDraw {
    program: ProgramHandle,
    texture: TextureHandle,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

struct WgpuState {
    device: Arc<Device>,
    queue: Arc<Queue>,
    format: TextureFormat,
    sampler: Sampler,
    // None marks a key whose decode failed, so we don't retry every frame.
    images: HashMap<ImageKey, Option<LoadedTexture>>,
    views: HashMap<TextureHandle, TextureView>,
    next_texture: u64,
    programs: HashMap<ProgramHandle, ProgramEntry>,
    next_program: u32,
    base_program: Option<ProgramHandle>,
    pending: Vec<PendingDraw>,
}

/// Cheaply cloneable handle to the shared wgpu state.
#[derive(Clone)]
pub struct WgpuBackend {
    state: Rc<RefCell<WgpuState>>,
}

impl WgpuBackend {
    pub fn new(context: &GpuContext) -> Self {
        Self::with_format(context, TARGET_FORMAT)
    }

    pub fn with_format(context: &GpuContext, format: TextureFormat) -> Self {
        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sprite Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        Self {
            state: Rc::new(RefCell::new(WgpuState {
                device: context.device.clone(),
                queue: context.queue.clone(),
                format,
                sampler,
                images: HashMap::new(),
                views: HashMap::new(),
                next_texture: 0,
                programs: HashMap::new(),
                next_program: 0,
                base_program: None,
                pending: Vec::new(),
            })),
        }
    }

    /// Program used for `draw_quads(None, ..)` submissions.
    pub fn set_base_program(&self, program: ProgramHandle) {
        self.state.borrow_mut().base_program = Some(program);
    }

    /// Decode an image file and upload it under `key`.
    pub fn load_image_file(&self, key: impl Into<ImageKey>, path: &Path) -> Option<TextureInfo> {
        let key = key.into();
        match image::open(path) {
            Ok(img) => self
                .state
                .borrow_mut()
                .upload_rgba(key, &img.to_rgba8()),
            Err(err) => {
                log::warn!("failed to load image '{}': {err}", key.as_str());
                self.state.borrow_mut().images.insert(key, None);
                None
            }
        }
    }

    /// Decode an in-memory encoded image (PNG, JPEG, GIF, WebP) and upload
    /// it under `key`.
    pub fn load_image_bytes(&self, key: impl Into<ImageKey>, bytes: &[u8]) -> Option<TextureInfo> {
        let key = key.into();
        match image::load_from_memory(bytes) {
            Ok(img) => self
                .state
                .borrow_mut()
                .upload_rgba(key, &img.to_rgba8()),
            Err(err) => {
                log::warn!("failed to decode image '{}': {err}", key.as_str());
                self.state.borrow_mut().images.insert(key, None);
                None
            }
        }
    }

    /// Upload raw RGBA8 pixel data under `key`.
    pub fn load_image_rgba(
        &self,
        key: impl Into<ImageKey>,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Option<TextureInfo> {
        let key = key.into();
        let Some(rgba) = image::RgbaImage::from_raw(width, height, pixels.to_vec()) else {
            log::warn!(
                "pixel data for '{}' does not match {width}x{height}",
                key.as_str()
            );
            return None;
        };
        self.state.borrow_mut().upload_rgba(key, &rgba)
    }

    /// Drop the texture for `key`; later lookups return `None` again.
    pub fn unload_image(&self, key: &ImageKey) {
        let mut state = self.state.borrow_mut();
        if let Some(Some(loaded)) = state.images.remove(key) {
            state.views.remove(&loaded.info.handle);
        }
    }

    /// Flush pending uniforms and replay all recorded draws into `target`
    /// in submission order.
    pub fn present(&self, target: &TextureView, clear_color: wgpu::Color) {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;

        for entry in state.programs.values_mut() {
            if entry.dirty {
                state
                    .queue
                    .write_buffer(&entry.uniform_buffer, 0, &entry.staging);
                entry.dirty = false;
            }
        }

        let mut encoder = state
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scena Frame Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scena Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for draw in &state.pending {
                let Some(entry) = state.programs.get(&draw.program) else {
                    log::warn!("draw references unknown program {:?}", draw.program);
                    continue;
                };
                let Some(view) = state.views.get(&draw.texture) else {
                    log::warn!("draw references unknown texture {:?}", draw.texture);
                    continue;
                };

                let bind_group = state.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Sprite Bind Group"),
                    layout: &entry.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&state.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: entry.uniform_buffer.as_entire_binding(),
                        },
                    ],
                });

                render_pass.set_pipeline(&entry.pipeline);
                render_pass.set_bind_group(0, &bind_group, &[]);
                render_pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
                render_pass.set_index_buffer(draw.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        state.queue.submit(std::iter::once(encoder.finish()));
        state.pending.clear();
    }
}

impl WgpuState {
    fn upload_rgba(&mut self, key: ImageKey, rgba: &image::RgbaImage) -> Option<TextureInfo> {
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            log::warn!("image '{}' has zero size", key.as_str());
            self.images.insert(key, None);
            return None;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Sprite Texture"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;

        let info = TextureInfo {
            handle,
            width,
            height,
        };
        self.views.insert(handle, view);
        self.images.insert(
            key,
            Some(LoadedTexture {
                info,
                _texture: texture,
            }),
        );
        Some(info)
    }
}

impl TextureManager for WgpuBackend {
    fn get_texture(&mut self, image: &ImageKey) -> Option<TextureInfo> {
        match self.state.borrow().images.get(image) {
            Some(Some(loaded)) => Some(loaded.info),
            _ => None,
        }
    }
}

impl ShaderCompiler for WgpuBackend {
    fn register(&mut self, name: &str, descriptor: &ProgramDescriptor) -> CompiledProgram {
        let mut state = self.state.borrow_mut();

        let shader = state
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(descriptor.module_source().into()),
            });

        let bind_group_layout =
            state
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Sprite Bind Group Layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

        let pipeline_layout =
            state
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Sprite Pipeline Layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    immediate_size: 0,
                });

        let pipeline = state
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(name),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[SpriteVertex::desc()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: state.format,
                        blend: Some(wgpu::BlendState {
                            color: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::SrcAlpha,
                                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                                operation: wgpu::BlendOperation::Add,
                            },
                            alpha: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::One,
                                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                                operation: wgpu::BlendOperation::Add,
                            },
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        let buffer_size = descriptor.uniform_buffer_size.max(16) as usize;
        let uniform_buffer = state.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sprite Uniform Buffer"),
            size: buffer_size as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let handle = ProgramHandle(state.next_program);
        state.next_program += 1;
        state.programs.insert(
            handle,
            ProgramEntry {
                pipeline,
                bind_group_layout,
                uniform_buffer,
                staging: vec![0u8; buffer_size],
                dirty: false,
            },
        );
        log::debug!("compiled shader program '{name}' as {handle:?}");

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
        let mut state = self.state.borrow_mut();
        let Some(entry) = state.programs.get_mut(&program) else {
            log::warn!("set_uniform on unknown program {program:?}");
            return;
        };
        let bytes = value.bytes();
        let offset = location.0 as usize;
        if offset + bytes.len() > entry.staging.len() {
            log::warn!(
                "uniform write at offset {offset} overruns the {} byte buffer of {program:?}",
                entry.staging.len()
            );
            return;
        }
        entry.staging[offset..offset + bytes.len()].copy_from_slice(&bytes);
        entry.dirty = true;
    }
}

impl DrawDevice for WgpuBackend {
    fn draw_quads(
        &mut self,
        program: Option<ProgramHandle>,
        texture: TextureHandle,
        vertices: &[SpriteVertex],
        indices: &[u16],
        quad_count: usize,
    ) {
        if quad_count == 0 {
            return;
        }
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let Some(program) = program.or(state.base_program) else {
            log::warn!("draw_quads with no program and no base program set, dropping quads");
            return;
        };

        let vertex_buffer = state
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Sprite Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: BufferUsages::VERTEX,
            });
        let index_buffer = state
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Sprite Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: BufferUsages::INDEX,
            });

        state.pending.push(PendingDraw {
            program,
            texture,
            vertex_buffer,
            index_buffer,
            index_count: (quad_count * 6) as u32,
        });
    }
}
