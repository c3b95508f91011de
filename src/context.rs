//! Device context and bound-state tracking.
//!
//! [`DeviceContext`] owns the [`glow::Context`] for one OpenGL context and
//! tracks which program, vertex array, buffers and textures are currently
//! bound, so redundant state changes can be skipped. Keeping the trackers on
//! an explicit object (rather than process-wide statics) ties their lifetime
//! to the rendering context they describe and lets independent contexts and
//! tests coexist.
//!
//! All resources created by this crate hold an `Rc<DeviceContext>`; the
//! context must outlive them and stay current on the calling thread. Nothing
//! here is safe to share across threads or across multiple GL contexts.

use std::cell::{Cell, RefCell};

use glow::HasContext;

use crate::color::Color;

/// Hard cap on concurrently bound textures per sub-batch, regardless of what
/// the hardware reports.
pub const MAX_TEXTURE_SLOTS: usize = 32;

/// One OpenGL context plus its currently-bound-object trackers.
///
/// Create it once the GL function loader is available, then share it between
/// resources via [`Rc`](std::rc::Rc):
///
/// ```no_run
/// # let gl: glow::Context = unimplemented!();
/// use std::rc::Rc;
/// use quadbatch::DeviceContext;
///
/// let ctx = Rc::new(DeviceContext::new(gl));
/// ```
pub struct DeviceContext {
    gl: glow::Context,
    bound_program: Cell<Option<glow::NativeProgram>>,
    bound_vertex_array: Cell<Option<glow::NativeVertexArray>>,
    bound_array_buffer: Cell<Option<glow::NativeBuffer>>,
    bound_element_buffer: Cell<Option<glow::NativeBuffer>>,
    bound_textures: RefCell<Vec<Option<glow::NativeTexture>>>,
    texture_unit_count: usize,
}

impl DeviceContext {
    /// Wraps a glow context and queries the device's texture-unit count.
    pub fn new(gl: glow::Context) -> Self {
        let texture_unit_count =
            unsafe { gl.get_parameter_i32(glow::MAX_TEXTURE_IMAGE_UNITS) }.max(0) as usize;
        log::info!("device can bind {texture_unit_count} textures at a time");
        let tracked_units = texture_unit_count.min(MAX_TEXTURE_SLOTS);
        Self {
            gl,
            bound_program: Cell::new(None),
            bound_vertex_array: Cell::new(None),
            bound_array_buffer: Cell::new(None),
            bound_element_buffer: Cell::new(None),
            bound_textures: RefCell::new(vec![None; tracked_units]),
            texture_unit_count,
        }
    }

    /// Direct access to the underlying glow context.
    ///
    /// Raw GL calls made through this handle bypass the bound-state trackers;
    /// mixing them with tracked bindings is the caller's responsibility.
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    /// The number of texture units the device can bind at once.
    pub fn texture_unit_count(&self) -> usize {
        self.texture_unit_count
    }

    /// The texture-slot capacity of one sub-batch: the hardware unit count
    /// capped at [`MAX_TEXTURE_SLOTS`].
    pub fn texture_slot_capacity(&self) -> usize {
        self.texture_unit_count.min(MAX_TEXTURE_SLOTS)
    }

    pub(crate) fn bind_program(&self, program: Option<glow::NativeProgram>) {
        if self.bound_program.get() != program {
            unsafe { self.gl.use_program(program) };
            self.bound_program.set(program);
        }
    }

    pub(crate) fn bound_program(&self) -> Option<glow::NativeProgram> {
        self.bound_program.get()
    }

    pub(crate) fn bind_vertex_array(&self, vertex_array: Option<glow::NativeVertexArray>) {
        if self.bound_vertex_array.get() != vertex_array {
            unsafe { self.gl.bind_vertex_array(vertex_array) };
            self.bound_vertex_array.set(vertex_array);
        }
    }

    pub(crate) fn bind_array_buffer(&self, buffer: Option<glow::NativeBuffer>) {
        if self.bound_array_buffer.get() != buffer {
            unsafe { self.gl.bind_buffer(glow::ARRAY_BUFFER, buffer) };
            self.bound_array_buffer.set(buffer);
        }
    }

    /// Element buffer binding is part of vertex-array state, so the tracker
    /// only elides repeats while the same vertex array stays bound.
    pub(crate) fn bind_element_buffer(&self, buffer: Option<glow::NativeBuffer>) {
        if self.bound_element_buffer.get() != buffer {
            unsafe { self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, buffer) };
            self.bound_element_buffer.set(buffer);
        }
    }

    /// Binds `texture` to the given unit, skipping the call if that unit
    /// already holds it.
    pub(crate) fn bind_texture(&self, texture: Option<glow::NativeTexture>, unit: u32) {
        let mut bound = self.bound_textures.borrow_mut();
        if let Some(slot) = bound.get_mut(unit as usize) {
            if *slot == texture {
                return;
            }
            *slot = texture;
        }
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, texture);
        }
    }

    /// Forgets a tracked binding after its object has been deleted.
    pub(crate) fn invalidate_texture(&self, texture: glow::NativeTexture) {
        for slot in self.bound_textures.borrow_mut().iter_mut() {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
    }

    /// Clears the selected buffers of the default framebuffer.
    ///
    /// At least one of the two flags must be set.
    pub fn clear(&self, color_buffer: bool, depth_buffer: bool) {
        debug_assert!(color_buffer || depth_buffer, "nothing selected to clear");
        let mut mask = 0;
        if color_buffer {
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if depth_buffer {
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        unsafe { self.gl.clear(mask) };
    }

    /// Sets the color used by [`clear`](Self::clear) for the color buffer.
    pub fn set_clear_color(&self, color: Color) {
        unsafe { self.gl.clear_color(color.r, color.g, color.b, color.a) };
    }
}
