use std::sync::Arc;

use wgpu::{Device, Instance, Queue, Texture, TextureFormat, TextureView};

/// Render target format used for offscreen frames.
pub const TARGET_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Owns the wgpu instance, device, and queue.
///
/// Headless by construction: frames render into offscreen targets, the host
/// decides how to present or read them back.
pub struct GpuContext {
    pub instance: Instance,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
}

impl Default for GpuContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuContext {
    pub fn new() -> Self {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .expect("Failed to find GPU adapter");

        log::info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Scena Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .expect("Failed to create device");

        Self {
            instance,
            device: Arc::new(device),
            queue: Arc::new(queue),
        }
    }

    /// Create an offscreen render target that frames can be drawn into and
    /// copied out of.
    pub fn create_target(&self, width: u32, height: u32) -> RenderTarget {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Scena Render Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        RenderTarget {
            texture,
            view,
            width,
            height,
        }
    }
}

pub struct RenderTarget {
    pub texture: Texture,
    pub view: TextureView,
    pub width: u32,
    pub height: u32,
}
