//! Growable vertex/index buffer pair with a streaming submission policy.
//!
//! [`VertexBuffer`] owns a vertex array object plus one vertex and one index
//! buffer. Submissions either reallocate (when the incoming data outgrows the
//! allocated capacity) or update the submitted byte range in place, leaving
//! the tail untouched. The tail is never drawn because the draw call's
//! element count always matches the last index submission.

use std::rc::Rc;

use glow::HasContext;

use crate::context::DeviceContext;

/// Buffer allocation hint passed to the driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UsagePattern {
    /// Contents are rewritten every frame and drawn a few times at most.
    StreamDraw,
    /// Contents are written once and drawn many times.
    StaticDraw,
    /// Contents are rewritten occasionally.
    DynamicDraw,
}

impl UsagePattern {
    fn to_gl(self) -> u32 {
        match self {
            UsagePattern::StreamDraw => glow::STREAM_DRAW,
            UsagePattern::StaticDraw => glow::STATIC_DRAW,
            UsagePattern::DynamicDraw => glow::DYNAMIC_DRAW,
        }
    }
}

/// The component type of one vertex attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttributeType {
    Float,
    UnsignedInt,
}

impl AttributeType {
    fn to_gl(self) -> u32 {
        match self {
            AttributeType::Float => glow::FLOAT,
            AttributeType::UnsignedInt => glow::UNSIGNED_INT,
        }
    }

    const fn size_in_bytes(self) -> usize {
        // Both current component types are 4 bytes wide.
        4
    }

    /// Integral attributes must be declared with an integer attribute
    /// pointer, or the driver converts them to floats.
    const fn is_integral(self) -> bool {
        matches!(self, AttributeType::UnsignedInt)
    }
}

/// One entry of a vertex attribute layout, e.g. `3 × Float` for a position.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub count: i32,
    pub ty: AttributeType,
    pub normalized: bool,
}

impl VertexAttribute {
    pub const fn new(count: i32, ty: AttributeType) -> Self {
        Self {
            count,
            ty,
            normalized: false,
        }
    }

    /// The byte size this attribute occupies inside one vertex.
    pub const fn size_in_bytes(&self) -> usize {
        self.ty.size_in_bytes() * self.count as usize
    }
}

/// Computes the tightly packed stride of an attribute list.
fn layout_stride(attributes: &[VertexAttribute]) -> usize {
    attributes.iter().map(VertexAttribute::size_in_bytes).sum()
}

/// A vertex array object with its vertex and index buffers.
///
/// Vertex and index capacities are tracked independently; either region grows
/// to exactly the submitted size when it overflows.
pub struct VertexBuffer {
    ctx: Rc<DeviceContext>,
    vertex_array: glow::NativeVertexArray,
    vertex_buffer: glow::NativeBuffer,
    index_buffer: glow::NativeBuffer,
    usage: UsagePattern,
    vertex_capacity_in_bytes: usize,
    index_capacity_in_bytes: usize,
    index_count: usize,
}

impl VertexBuffer {
    /// Creates the GL objects and optionally pre-allocates both regions.
    ///
    /// # Panics
    ///
    /// Panics if the driver refuses to allocate the buffer or vertex-array
    /// objects, which only happens without a current context.
    pub fn new(
        ctx: Rc<DeviceContext>,
        usage: UsagePattern,
        initial_vertex_capacity_in_bytes: usize,
        initial_index_capacity_in_bytes: usize,
    ) -> Self {
        let gl = ctx.gl();
        let (vertex_array, vertex_buffer, index_buffer) = unsafe {
            (
                gl.create_vertex_array()
                    .expect("failed to create vertex array object"),
                gl.create_buffer().expect("failed to create vertex buffer"),
                gl.create_buffer().expect("failed to create index buffer"),
            )
        };
        let buffer = Self {
            ctx,
            vertex_array,
            vertex_buffer,
            index_buffer,
            usage,
            vertex_capacity_in_bytes: initial_vertex_capacity_in_bytes,
            index_capacity_in_bytes: initial_index_capacity_in_bytes,
            index_count: 0,
        };
        buffer.bind();
        unsafe {
            let gl = buffer.ctx.gl();
            if initial_vertex_capacity_in_bytes > 0 {
                buffer.ctx.bind_array_buffer(Some(vertex_buffer));
                gl.buffer_data_size(
                    glow::ARRAY_BUFFER,
                    initial_vertex_capacity_in_bytes as i32,
                    usage.to_gl(),
                );
            }
            if initial_index_capacity_in_bytes > 0 {
                buffer.ctx.bind_element_buffer(Some(index_buffer));
                gl.buffer_data_size(
                    glow::ELEMENT_ARRAY_BUFFER,
                    initial_index_capacity_in_bytes as i32,
                    usage.to_gl(),
                );
            }
        }
        buffer
    }

    /// Binds the vertex array (and with it the attached index buffer).
    pub fn bind(&self) {
        self.ctx.bind_vertex_array(Some(self.vertex_array));
    }

    /// The number of indices available to draw after the last index
    /// submission.
    pub fn index_count(&self) -> usize {
        self.index_count
    }

    /// Uploads vertex data, growing the vertex region if it doesn't fit.
    pub fn submit_vertex_data<T: bytemuck::Pod>(&mut self, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.ctx.bind_array_buffer(Some(self.vertex_buffer));
        unsafe {
            let gl = self.ctx.gl();
            if bytes.len() > self.vertex_capacity_in_bytes {
                gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytes, self.usage.to_gl());
                self.vertex_capacity_in_bytes = bytes.len();
            } else {
                gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, bytes);
            }
        }
    }

    /// Uploads `u32` index data, growing the index region if it doesn't fit,
    /// and records the new index count.
    pub fn submit_index_data<T: bytemuck::Pod>(&mut self, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.bind();
        self.ctx.bind_element_buffer(Some(self.index_buffer));
        unsafe {
            let gl = self.ctx.gl();
            if bytes.len() > self.index_capacity_in_bytes {
                gl.buffer_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, bytes, self.usage.to_gl());
                self.index_capacity_in_bytes = bytes.len();
            } else {
                gl.buffer_sub_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, 0, bytes);
            }
        }
        self.index_count = bytes.len() / std::mem::size_of::<u32>();
    }

    /// Declares the attribute layout of the vertex region.
    ///
    /// Offsets and the stride are computed from the declaration order. Must
    /// be called again whenever the stride changes.
    pub fn set_vertex_attribute_layout(&self, attributes: &[VertexAttribute]) {
        let stride = layout_stride(attributes) as i32;
        self.bind();
        self.ctx.bind_array_buffer(Some(self.vertex_buffer));
        self.ctx.bind_element_buffer(Some(self.index_buffer));
        let gl = self.ctx.gl();
        let mut offset = 0usize;
        for (location, attribute) in attributes.iter().enumerate() {
            let location = location as u32;
            unsafe {
                gl.enable_vertex_attrib_array(location);
                if attribute.ty.is_integral() {
                    gl.vertex_attrib_pointer_i32(
                        location,
                        attribute.count,
                        attribute.ty.to_gl(),
                        stride,
                        offset as i32,
                    );
                } else {
                    gl.vertex_attrib_pointer_f32(
                        location,
                        attribute.count,
                        attribute.ty.to_gl(),
                        attribute.normalized,
                        stride,
                        offset as i32,
                    );
                }
            }
            log::debug!(
                "enabled vertex attribute {location} (count {}, type {:?}, normalized {}, \
                 stride {stride}, offset {offset})",
                attribute.count,
                attribute.ty,
                attribute.normalized,
            );
            offset += attribute.size_in_bytes();
        }
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        self.ctx.bind_vertex_array(None);
        self.ctx.bind_array_buffer(None);
        self.ctx.bind_element_buffer(None);
        let gl = self.ctx.gl();
        unsafe {
            gl.delete_vertex_array(self.vertex_array);
            gl.delete_buffer(self.vertex_buffer);
            gl.delete_buffer(self.index_buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::Vertex;

    #[test]
    fn attribute_sizes() {
        assert_eq!(VertexAttribute::new(3, AttributeType::Float).size_in_bytes(), 12);
        assert_eq!(
            VertexAttribute::new(1, AttributeType::UnsignedInt).size_in_bytes(),
            4
        );
    }

    #[test]
    fn quad_vertex_layout_stride_is_40_bytes() {
        assert_eq!(layout_stride(&Vertex::ATTRIBUTES), 40);
    }

    #[test]
    fn offsets_accumulate_in_declaration_order() {
        let offsets: Vec<usize> = Vertex::ATTRIBUTES
            .iter()
            .scan(0usize, |offset, attribute| {
                let current = *offset;
                *offset += attribute.size_in_bytes();
                Some(current)
            })
            .collect();
        assert_eq!(offsets, [0, 12, 28, 36]);
    }
}
