//! The public frame API: batched quad drawing over an OpenGL context.
//!
//! A frame looks like this:
//!
//! ```no_run
//! # let (ctx, shader, texture): (std::rc::Rc<quadbatch::DeviceContext>, quadbatch::ShaderProgram, quadbatch::Texture) = unimplemented!();
//! use quadbatch::{Color, Mat4, Rect, Renderer, Vec2, Vec3};
//!
//! let mut renderer = Renderer::new(ctx);
//! renderer.begin_frame(Mat4::IDENTITY);
//! renderer.draw_quad(
//!     Vec3::new(0.0, 0.0, 0.0),
//!     0.0,
//!     Vec2::new(1.0, 1.0),
//!     &shader,
//!     &texture,
//!     Rect::UNIT,
//!     Color::WHITE,
//! );
//! renderer.end_frame();
//! assert_eq!(renderer.stats().batches, 1);
//! ```
//!
//! Draws are composited in flush order, not submission order: commands are
//! grouped by (shader, texture) to minimize device state changes, and only
//! commands within the same group keep their submission order. That is the
//! accepted trade-off for batching transparency-unaware content.

use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3};
use glow::HasContext;

use crate::batch::{BatchSink, Batcher, RenderCommand, ShaderBinding};
use crate::buffer::{UsagePattern, VertexBuffer};
use crate::color::Color;
use crate::context::DeviceContext;
use crate::rect::Rect;
use crate::shader::ShaderProgram;
use crate::texture::Texture;
use crate::vertex::{TriangleIndices, Vertex};

pub use crate::batch::RenderStats;

/// The command queue's fixed capacity; reaching it triggers an early flush.
pub const MAX_COMMANDS_PER_BATCH: usize = 20_000;

/// A batched 2D quad renderer.
///
/// Owns the per-frame command queue, the staging geometry, and the streaming
/// GPU buffer pair. Shaders and textures are only borrowed per draw call; the
/// caller must keep them alive past `end_frame`.
pub struct Renderer {
    ctx: Rc<DeviceContext>,
    buffer: VertexBuffer,
    batcher: Batcher,
}

impl Renderer {
    /// Creates a renderer with streaming buffers sized for
    /// [`MAX_COMMANDS_PER_BATCH`] quads and the wire-exact quad vertex
    /// layout declared.
    ///
    /// # Panics
    ///
    /// Panics if the device-object allocation for the streaming buffers
    /// fails, which only happens without a current context.
    pub fn new(ctx: Rc<DeviceContext>) -> Self {
        let buffer = VertexBuffer::new(
            Rc::clone(&ctx),
            UsagePattern::StreamDraw,
            MAX_COMMANDS_PER_BATCH * 4 * std::mem::size_of::<Vertex>(),
            MAX_COMMANDS_PER_BATCH * 2 * std::mem::size_of::<TriangleIndices>(),
        );
        buffer.set_vertex_attribute_layout(&Vertex::ATTRIBUTES);
        let batcher = Batcher::new(MAX_COMMANDS_PER_BATCH, ctx.texture_slot_capacity());
        Self {
            ctx,
            buffer,
            batcher,
        }
    }

    /// Starts a frame: resets stats and cursors and fixes the
    /// view-projection matrix written to every shader's `projectionMatrix`
    /// uniform during this frame.
    pub fn begin_frame(&mut self, view_projection: Mat4) {
        self.batcher.begin_frame(view_projection);
    }

    /// Queues a quad from translation, z-axis rotation and scale.
    ///
    /// The unit quad spans −1..1 on both axes before the transform applies.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_quad(
        &mut self,
        translation: Vec3,
        rotation_radians: f32,
        scale: Vec2,
        shader: &ShaderProgram,
        texture: &Texture,
        texture_rect: Rect,
        color: Color,
    ) {
        self.draw_quad_with_transform(
            trs_matrix(translation, rotation_radians, scale),
            shader,
            texture,
            texture_rect,
            color,
        );
    }

    /// Queues a quad with a precomputed transform matrix.
    ///
    /// Never fails: a full command queue is flushed before appending.
    pub fn draw_quad_with_transform(
        &mut self,
        transform: Mat4,
        shader: &ShaderProgram,
        texture: &Texture,
        texture_rect: Rect,
        color: Color,
    ) {
        let command = RenderCommand {
            transform,
            texture_rect,
            color,
            shader: shader.binding(),
            texture: texture.native(),
        };
        let mut sink = GlSink {
            ctx: self.ctx.as_ref(),
            buffer: &mut self.buffer,
        };
        self.batcher.draw(command, &mut sink);
    }

    /// Flushes everything still queued and draws it. Idempotent when the
    /// queue is already empty.
    pub fn end_frame(&mut self) {
        let mut sink = GlSink {
            ctx: self.ctx.as_ref(),
            buffer: &mut self.buffer,
        };
        self.batcher.end_frame(&mut sink);
    }

    /// Snapshot of this frame's counters; read it after `end_frame`.
    pub fn stats(&self) -> RenderStats {
        self.batcher.stats()
    }

    /// The device context this renderer draws through.
    pub fn context(&self) -> &Rc<DeviceContext> {
        &self.ctx
    }
}

/// Translation, then rotation around z, then scale in the x/y plane.
fn trs_matrix(translation: Vec3, rotation_radians: f32, scale: Vec2) -> Mat4 {
    Mat4::from_translation(translation)
        * Mat4::from_rotation_z(rotation_radians)
        * Mat4::from_scale(Vec3::new(scale.x, scale.y, 1.0))
}

/// Executes flushed batches against the device.
struct GlSink<'a> {
    ctx: &'a DeviceContext,
    buffer: &'a mut VertexBuffer,
}

impl BatchSink for GlSink<'_> {
    fn begin_run(&mut self, shader: &ShaderBinding, view_projection: &Mat4) {
        self.ctx.bind_program(Some(shader.program));
        match &shader.projection_location {
            Some(location) => unsafe {
                self.ctx.gl().uniform_matrix_4_f32_slice(
                    Some(location),
                    false,
                    &view_projection.to_cols_array(),
                );
            },
            None => {
                log::error!("shader program has no projectionMatrix uniform");
            }
        }
    }

    fn submit(
        &mut self,
        vertices: &[Vertex],
        triangles: &[TriangleIndices],
        textures: &[glow::NativeTexture],
    ) {
        self.buffer.bind();
        self.buffer.submit_vertex_data(vertices);
        self.buffer.submit_index_data(triangles);
        for (slot, &texture) in textures.iter().enumerate() {
            self.ctx.bind_texture(Some(texture), slot as u32);
        }
        unsafe {
            self.ctx.gl().draw_elements(
                glow::TRIANGLES,
                self.buffer.index_count() as i32,
                glow::UNSIGNED_INT,
                0,
            );
        }
    }
}
