//! Minimal application skeleton around the renderer.
//!
//! Windowing, input and the event loop stay outside this crate; the host
//! owns them and calls [`AppRunner::frame`] once per loop iteration, between
//! making the GL context current and swapping buffers.

use std::time::Instant;

use crate::renderer::Renderer;

/// The three capability hooks of an application.
///
/// Exactly one implementation is active at a time, so this is a plain trait
/// rather than a variant dispatch. The application itself brackets its draws
/// with [`Renderer::begin_frame`] and [`Renderer::end_frame`].
pub trait App {
    /// Called once, before the first tick. Load shaders and textures here.
    fn initialize(&mut self, renderer: &mut Renderer);

    /// Called once per frame with the seconds elapsed since the last tick.
    fn tick(&mut self, renderer: &mut Renderer, delta_seconds: f32);

    /// Called after `tick`, for debug overlays drawn on top of the frame.
    fn render_overlay(&mut self, renderer: &mut Renderer) {
        let _ = renderer;
    }
}

/// Drives an [`App`] and keeps its frame clock.
pub struct AppRunner<A: App> {
    app: A,
    renderer: Renderer,
    last_frame: Option<Instant>,
}

impl<A: App> AppRunner<A> {
    /// Initializes the application immediately.
    pub fn new(mut app: A, mut renderer: Renderer) -> Self {
        app.initialize(&mut renderer);
        Self {
            app,
            renderer,
            last_frame: None,
        }
    }

    /// Runs one frame: measures the frame delta, ticks the application, then
    /// renders its overlay. The first frame sees a delta of zero.
    pub fn frame(&mut self) {
        let now = Instant::now();
        let delta_seconds = match self.last_frame {
            Some(last) => now.duration_since(last).as_secs_f32(),
            None => 0.0,
        };
        self.last_frame = Some(now);

        self.app.tick(&mut self.renderer, delta_seconds);
        self.app.render_overlay(&mut self.renderer);
    }

    pub fn renderer(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn app(&mut self) -> &mut A {
        &mut self.app
    }
}
