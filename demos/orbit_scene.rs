//! Renders an orbiting sprite ring into an offscreen target for a few
//! seconds worth of frames, reporting traversal stats along the way.
//!
//! Run with `RUST_LOG=info cargo run --example orbit_scene`.

use scena::effects::BASE_KEY;
use scena::prelude::*;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

struct ViewportCamera {
    viewport: Rect,
}

impl Camera for ViewportCamera {
    fn is_visible(&self, bounds: &Rect) -> bool {
        self.viewport.intersects(bounds)
    }
}

/// 32x32 checkerboard, RGBA8.
fn checker_pixels() -> Vec<u8> {
    let mut pixels = Vec::with_capacity(32 * 32 * 4);
    for y in 0..32 {
        for x in 0..32 {
            let light = (x / 8 + y / 8) % 2 == 0;
            let v = if light { 220 } else { 60 };
            pixels.extend_from_slice(&[v, v, 255, 255]);
        }
    }
    pixels
}

fn main() {
    env_logger::init();

    let context = GpuContext::new();
    let backend = WgpuBackend::new(&context);
    let target = context.create_target(WIDTH, HEIGHT);

    backend.load_image_rgba("checker", 32, 32, &checker_pixels());

    // The base (effect-free) program doubles as the default for plain draws
    let mut effects = ShaderEffectRegistry::new(backend.clone());
    let base = effects.shader_for_effects(&[]).handle;
    backend.set_base_program(base);

    effects.set_uniform(
        "screen_size",
        UniformValue::Vec2([WIDTH as f32, HEIGHT as f32]),
    );
    effects.set_uniform("texel_size", UniformValue::Vec2([1.0 / 32.0, 1.0 / 32.0]));
    effects.set_uniform("tint", UniformValue::Vec4([1.0, 1.0, 1.0, 1.0]));
    effects.set_uniform("effect_params", UniformValue::Vec4([0.0; 4]));
    effects.apply_uniforms(BASE_KEY);

    let mut scene = Scene::new();
    let root = scene.create_node(NodeContent::Group);

    // Hub sits at screen center; satellites are its children, so spinning
    // the hub orbits the whole ring
    let hub = scene.create_node(NodeContent::Group);
    scene.set_position(hub, WIDTH as f32 / 2.0, HEIGHT as f32 / 2.0);
    scene.add_child(root, hub);

    for i in 0..12 {
        let satellite = scene.create_node(NodeContent::Sprite(SpriteData::new(
            ImageKey::from("checker"),
            32.0,
            32.0,
        )));
        let angle = i as f32 / 12.0 * std::f32::consts::TAU;
        // Radius larger than the viewport half-height, so part of the ring
        // is always culled
        scene.set_position(satellite, angle.cos() * 340.0, angle.sin() * 340.0);
        scene.set_pivot(satellite, 16.0, 16.0);
        scene.set_opacity(satellite, 0.9);
        scene.add_child(hub, satellite);
    }

    let mut registry = RendererRegistry::new();
    registry.register(NodeKind::SPRITE, Box::new(SpriteBatch::new(backend.clone())));

    let camera = ViewportCamera {
        viewport: Rect::new(0.0, 0.0, WIDTH as f32, HEIGHT as f32),
    };
    let mut stats = TraversalStats::default();

    for frame in 0..240u32 {
        scene.set_rotation(hub, frame as f32 * 0.02);
        scene.update_world_matrix(root, false);

        stats.reset();
        registry.begin_frame();
        traverse_and_collect(
            &mut scene,
            root,
            &mut registry,
            &TraverseOptions {
                camera: Some(&camera),
                enable_culling: true,
            },
            Some(&mut stats),
        );
        registry.end_frame();

        backend.present(
            &target.view,
            wgpu::Color {
                r: 0.08,
                g: 0.08,
                b: 0.12,
                a: 1.0,
            },
        );

        if frame % 60 == 0 {
            log::info!(
                "frame {frame}: {} visited, {} rendered, {} culled",
                stats.total_objects,
                stats.rendered_objects,
                stats.culled_objects
            );
        }
    }

    log::info!("done");
}
