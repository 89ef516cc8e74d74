//! Sprite batching: the fewest possible draw submissions per frame.
//!
//! The batch accumulates quad geometry from `collect` calls and submits it
//! as indexed draws through the [`DrawDevice`] collaborator. A draw call
//! cannot span textures, so a texture switch forces a flush; so does hitting
//! the fixed sprite capacity the vertex/index buffers were sized for.
//! Sprites whose image is not yet resolvable are dropped silently: partially
//! loaded assets are expected transient state, re-checked every frame.

mod vertex;

pub use vertex::{quad_indices, SpriteVertex};

use crate::gpu::{DrawDevice, ProgramHandle, TextureInfo, TextureManager};
use crate::registry::{Collector, RenderHints};
use crate::scene::{NodeContent, NodeId, Scene};

/// Default sprite capacity per draw (sized so `4 * capacity` fits in `u16`
/// indices with room to spare).
pub const DEFAULT_CAPACITY: usize = 2048;

/// Accumulates sprite quads and flushes them as indexed draws.
///
/// All state except the pre-sized buffers is per-frame: `begin` resets the
/// write cursor and the current-texture marker, `end` flushes the remainder.
pub struct SpriteBatch<D> {
    device: D,
    capacity: usize,
    /// Static index list for the full capacity, built once.
    indices: Vec<u16>,
    vertices: Vec<SpriteVertex>,
    sprite_count: usize,
    /// Texture the pending vertices sample from. Survives a flush so
    /// consecutive same-texture batches do not rebind.
    current_texture: Option<TextureInfo>,
    /// Shader program bound at flush; `None` uses the device's base program.
    program: Option<ProgramHandle>,
}

impl<D: TextureManager + DrawDevice> SpriteBatch<D> {
    pub fn new(device: D) -> Self {
        Self::with_capacity(device, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(device: D, capacity: usize) -> Self {
        assert!(capacity > 0, "sprite batch capacity must be non-zero");
        assert!(
            capacity * 4 <= u16::MAX as usize + 1,
            "sprite batch capacity exceeds 16-bit index range"
        );
        Self {
            indices: quad_indices(capacity),
            vertices: Vec::with_capacity(capacity * 4),
            sprite_count: 0,
            current_texture: None,
            program: None,
            capacity,
            device,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Select the program bound at the next flush.
    pub fn set_program(&mut self, program: Option<ProgramHandle>) {
        self.program = program;
    }

    /// Reset the write cursor and the current-texture marker for a new frame.
    pub fn begin(&mut self) {
        self.vertices.clear();
        self.sprite_count = 0;
        self.current_texture = None;
    }

    /// Append one sprite's quad, flushing first on texture switch or at
    /// capacity. Sprites without a resolvable texture are dropped.
    pub fn add_sprite(&mut self, scene: &Scene, node: NodeId, opacity: f32, hints: RenderHints) {
        let sprite = match scene.content(node) {
            NodeContent::Sprite(sprite) => sprite,
            _ => return,
        };

        // Not-yet-ready images are an ordinary skip, not an error.
        let Some(texture) = self.device.get_texture(&sprite.image) else {
            return;
        };

        if self
            .current_texture
            .is_some_and(|current| current.handle != texture.handle)
        {
            self.flush();
        }
        self.current_texture = Some(texture);

        if self.sprite_count == self.capacity {
            self.flush();
        }

        // UVs: a named atlas frame in pixel coordinates, or the whole image.
        let (u0, v0, u1, v1) = match (&sprite.atlas, &sprite.frame) {
            (Some(atlas), Some(frame)) => match atlas.frame(frame) {
                Some(rect) => {
                    let w = texture.width as f32;
                    let h = texture.height as f32;
                    (
                        rect.x / w,
                        rect.y / h,
                        (rect.x + rect.width) / w,
                        (rect.y + rect.height) / h,
                    )
                }
                None => {
                    log::warn!(
                        "sprite frame '{}' not found in atlas for image '{}'",
                        frame,
                        sprite.image.as_str()
                    );
                    (0.0, 0.0, 1.0, 1.0)
                }
            },
            _ => (0.0, 0.0, 1.0, 1.0),
        };

        let world = scene.world_matrix(node);
        let corners = [
            (0.0, 0.0),
            (sprite.width, 0.0),
            (0.0, sprite.height),
            (sprite.width, sprite.height),
        ];
        let uvs = [[u0, v0], [u1, v0], [u0, v1], [u1, v1]];

        for (&(cx, cy), uv) in corners.iter().zip(uvs) {
            let (mut x, mut y) = world.transform_point(cx, cy);
            if hints.contains(RenderHints::PIXEL_SNAP) {
                x = x.round();
                y = y.round();
            }
            self.vertices.push(SpriteVertex {
                position: [x, y],
                uv,
                opacity,
            });
        }
        self.sprite_count += 1;
    }

    /// Submit pending quads as one indexed draw. No-op when empty.
    ///
    /// The current texture is kept, so a flush forced by capacity does not
    /// cause a rebind for the sprites that follow.
    pub fn flush(&mut self) {
        if self.sprite_count == 0 {
            return;
        }
        let texture = self
            .current_texture
            .expect("pending sprites always have a resolved texture");
        self.device.draw_quads(
            self.program,
            texture.handle,
            &self.vertices[..self.sprite_count * 4],
            &self.indices[..self.sprite_count * 6],
            self.sprite_count,
        );
        self.vertices.clear();
        self.sprite_count = 0;
    }

    /// Flush whatever remains at frame end.
    pub fn end(&mut self) {
        self.flush();
    }

    /// Drop all pending per-frame state. GPU buffers are device-owned and
    /// unaffected.
    pub fn dispose(&mut self) {
        self.vertices.clear();
        self.vertices.shrink_to_fit();
        self.sprite_count = 0;
        self.current_texture = None;
        self.program = None;
    }

    pub fn pending_sprites(&self) -> usize {
        self.sprite_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<D: TextureManager + DrawDevice> Collector for SpriteBatch<D> {
    fn collect(&mut self, scene: &Scene, node: NodeId, opacity: f32, hints: RenderHints) {
        self.add_sprite(scene, node, opacity, hints);
    }

    fn begin_frame(&mut self) {
        self.begin();
    }

    fn end_frame(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{ImageKey, RecordingBackend};
    use crate::rect::Rect;
    use crate::scene::{SpriteData, TextureAtlas};
    use std::rc::Rc;

    fn sprite_node(scene: &mut Scene, image: &str) -> NodeId {
        scene.create_node(NodeContent::Sprite(SpriteData::new(
            ImageKey::from(image),
            16.0,
            16.0,
        )))
    }

    fn ready_scene(images: &[&str]) -> (Scene, RecordingBackend, Vec<NodeId>) {
        let backend = RecordingBackend::new();
        let mut scene = Scene::new();
        let mut nodes = Vec::new();
        for image in images {
            backend.add_image(ImageKey::from(*image), 64, 64);
            let node = sprite_node(&mut scene, image);
            scene.update_world_matrix(node, false);
            nodes.push(node);
        }
        (scene, backend, nodes)
    }

    #[test]
    fn test_flush_on_capacity() {
        let (mut scene, backend, _) = ready_scene(&["tex"]);
        let mut batch = SpriteBatch::with_capacity(backend.clone(), 4);
        let node = sprite_node(&mut scene, "tex");
        scene.update_world_matrix(node, false);

        batch.begin();
        for _ in 0..4 {
            batch.add_sprite(&scene, node, 1.0, RenderHints::empty());
        }
        assert_eq!(backend.draw_count(), 0);

        // The capacity-exceeding sprite triggers exactly one flush first
        batch.add_sprite(&scene, node, 1.0, RenderHints::empty());
        assert_eq!(backend.draw_count(), 1);
        assert_eq!(backend.draws()[0].quad_count, 4);
        assert_eq!(batch.pending_sprites(), 1);

        batch.end();
        assert_eq!(backend.draw_count(), 2);
        assert_eq!(backend.draws()[1].quad_count, 1);
    }

    #[test]
    fn test_flush_on_texture_switch() {
        let (scene, backend, nodes) = ready_scene(&["a", "b"]);
        let mut batch = SpriteBatch::new(backend.clone());

        batch.begin();
        batch.add_sprite(&scene, nodes[0], 1.0, RenderHints::empty());
        assert_eq!(backend.draw_count(), 0);
        batch.add_sprite(&scene, nodes[1], 1.0, RenderHints::empty());
        assert_eq!(backend.draw_count(), 1);
        batch.end();
        assert_eq!(backend.draw_count(), 2);

        let draws = backend.draws();
        assert_ne!(draws[0].texture, draws[1].texture);
    }

    #[test]
    fn test_same_texture_batches_into_one_draw() {
        let (scene, backend, nodes) = ready_scene(&["a"]);
        let mut batch = SpriteBatch::new(backend.clone());

        batch.begin();
        for _ in 0..3 {
            batch.add_sprite(&scene, nodes[0], 1.0, RenderHints::empty());
        }
        batch.end();

        assert_eq!(backend.draw_count(), 1);
        let draw = &backend.draws()[0];
        assert_eq!(draw.quad_count, 3);
        assert_eq!(draw.vertices.len(), 12);
        assert_eq!(draw.indices.len(), 18);
    }

    #[test]
    fn test_missing_image_is_dropped_silently() {
        let backend = RecordingBackend::new();
        let mut scene = Scene::new();
        let node = sprite_node(&mut scene, "not-loaded");
        scene.update_world_matrix(node, false);

        let mut batch = SpriteBatch::new(backend.clone());
        batch.begin();
        batch.add_sprite(&scene, node, 1.0, RenderHints::empty());
        batch.end();

        assert_eq!(backend.draw_count(), 0);
        assert_eq!(batch.pending_sprites(), 0);
    }

    #[test]
    fn test_pending_image_resolves_later() {
        let backend = RecordingBackend::new();
        backend.add_pending_image(ImageKey::from("slow"));
        let mut scene = Scene::new();
        let node = sprite_node(&mut scene, "slow");
        scene.update_world_matrix(node, false);

        let mut batch = SpriteBatch::new(backend.clone());
        batch.begin();
        batch.add_sprite(&scene, node, 1.0, RenderHints::empty());
        batch.end();
        assert_eq!(backend.draw_count(), 0);

        // The image finishes loading; the next frame picks it up
        backend.add_image(ImageKey::from("slow"), 32, 32);
        batch.begin();
        batch.add_sprite(&scene, node, 1.0, RenderHints::empty());
        batch.end();
        assert_eq!(backend.draw_count(), 1);
    }

    #[test]
    fn test_vertex_positions_and_opacity() {
        let (mut scene, backend, nodes) = ready_scene(&["a"]);
        scene.set_position(nodes[0], 100.0, 200.0);
        scene.update_world_matrix(nodes[0], false);

        let mut batch = SpriteBatch::new(backend.clone());
        batch.begin();
        batch.add_sprite(&scene, nodes[0], 0.5, RenderHints::empty());
        batch.end();

        let draws = backend.draws();
        let v = &draws[0].vertices;
        assert_eq!(v[0].position, [100.0, 200.0]);
        assert_eq!(v[1].position, [116.0, 200.0]);
        assert_eq!(v[2].position, [100.0, 216.0]);
        assert_eq!(v[3].position, [116.0, 216.0]);
        assert!(v.iter().all(|v| (v.opacity - 0.5).abs() < 1e-6));
        assert_eq!(v[0].uv, [0.0, 0.0]);
        assert_eq!(v[3].uv, [1.0, 1.0]);
    }

    #[test]
    fn test_atlas_frame_uvs() {
        let backend = RecordingBackend::new();
        backend.add_image(ImageKey::from("sheet"), 128, 64);

        let mut atlas = TextureAtlas::new();
        atlas.add_frame("run_0", Rect::new(32.0, 16.0, 64.0, 32.0));

        let mut scene = Scene::new();
        let node = scene.create_node(NodeContent::Sprite(
            SpriteData::new(ImageKey::from("sheet"), 64.0, 32.0)
                .with_frame(Rc::new(atlas), "run_0"),
        ));
        scene.update_world_matrix(node, false);

        let mut batch = SpriteBatch::new(backend.clone());
        batch.begin();
        batch.add_sprite(&scene, node, 1.0, RenderHints::empty());
        batch.end();

        let draws = backend.draws();
        let v = &draws[0].vertices;
        // Pixel rect (32,16,64,32) in a 128x64 image normalizes to (0.25,0.25)..(0.75,0.75)
        assert_eq!(v[0].uv, [0.25, 0.25]);
        assert_eq!(v[1].uv, [0.75, 0.25]);
        assert_eq!(v[2].uv, [0.25, 0.75]);
        assert_eq!(v[3].uv, [0.75, 0.75]);
    }

    #[test]
    fn test_pixel_snap_hint() {
        let (mut scene, backend, nodes) = ready_scene(&["a"]);
        scene.set_position(nodes[0], 10.4, 10.6);
        scene.update_world_matrix(nodes[0], false);

        let mut batch = SpriteBatch::new(backend.clone());
        batch.begin();
        batch.add_sprite(&scene, nodes[0], 1.0, RenderHints::PIXEL_SNAP);
        batch.end();

        let draws = backend.draws();
        assert_eq!(draws[0].vertices[0].position, [10.0, 11.0]);
    }

    #[test]
    fn test_program_passed_through_on_flush() {
        let (scene, backend, nodes) = ready_scene(&["a"]);
        let mut batch = SpriteBatch::new(backend.clone());
        batch.set_program(Some(ProgramHandle(7)));

        batch.begin();
        batch.add_sprite(&scene, nodes[0], 1.0, RenderHints::empty());
        batch.end();

        assert_eq!(backend.draws()[0].program, Some(ProgramHandle(7)));
    }
}
