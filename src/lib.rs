//! # Quadbatch
//!
//! **A batched 2D quad renderer for OpenGL that gets out of your way.**
//!
//! Issue thousands of textured, colored, transformed quads per frame;
//! quadbatch sorts them by shader and texture, packs them into streaming GPU
//! buffers, and draws them with as few device state changes as the texture
//! units allow.
//!
//! ## Quick Start
//!
//! ```no_run
//! # let gl: glow::Context = unimplemented!();
//! use std::rc::Rc;
//! use quadbatch::*;
//!
//! let ctx = Rc::new(DeviceContext::new(gl));
//! let shader = ShaderProgram::default_program(Rc::clone(&ctx)).unwrap();
//! let texture = Texture::from_fill_color(Rc::clone(&ctx), 1, 1, Color::WHITE).unwrap();
//! let mut renderer = Renderer::new(Rc::clone(&ctx));
//!
//! // Per frame:
//! renderer.begin_frame(Mat4::IDENTITY);
//! renderer.draw_quad(
//!     Vec3::new(0.0, 0.0, 0.0),
//!     0.0,
//!     Vec2::new(0.5, 0.5),
//!     &shader,
//!     &texture,
//!     Rect::UNIT,
//!     Color::rgb(1.0, 0.5, 0.2),
//! );
//! renderer.end_frame();
//! ```
//!
//! ## Philosophy
//!
//! - **Batching is the whole point** — draw calls are grouped by shader,
//!   then by texture; texture slots are deduplicated per sub-batch.
//! - **No hidden globals** — bound-state tracking lives on an explicit
//!   [`DeviceContext`] with the same lifetime as the GL context it wraps.
//! - **Bring your own window** — winit, SDL, glutin: anything that can hand
//!   over a [`glow::Context`] works. The event loop stays yours.
//! - **Escape hatches everywhere** — the raw glow context is one call away
//!   when you need GL state this crate doesn't manage.
//!
//! ## Ordering
//!
//! Quads are composited in batch order, not submission order: only draws
//! with the same shader and texture keep their relative order. Depth-sorted
//! transparency is out of scope.

mod app;
mod batch;
mod buffer;
mod color;
mod context;
mod rect;
mod renderer;
mod shader;
mod texture;
mod vertex;

pub use app::{App, AppRunner};
pub use buffer::{AttributeType, UsagePattern, VertexAttribute, VertexBuffer};
pub use color::Color;
pub use context::{DeviceContext, MAX_TEXTURE_SLOTS};
pub use rect::Rect;
pub use renderer::{MAX_COMMANDS_PER_BATCH, RenderStats, Renderer};
pub use shader::{
    PROJECTION_MATRIX_UNIFORM, ShaderError, ShaderProgram, ShaderStage, uniform_hash,
};
pub use texture::{Filtering, Texture, TextureError};
pub use vertex::{TriangleIndices, Vertex};

// Re-export glam math types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};

// Re-export glow so hosts can build a context without pinning the version
// themselves
pub use glow;
