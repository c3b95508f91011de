use crate::buffer::{AttributeType, VertexAttribute};

/// One vertex of a batched quad, in the exact layout the GPU sees.
///
/// Tightly packed, 40-byte stride: position, color, texture coordinates and
/// the slot index of the texture to sample within the current sub-batch.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub tex_coords: [f32; 2],
    pub tex_index: u32,
}

impl Vertex {
    /// The attribute layout matching this struct, in declaration order.
    ///
    /// Attribute 3 is integral; [`VertexBuffer`](crate::VertexBuffer) declares
    /// it with an integer attribute pointer so the shader receives a `uint`.
    pub const ATTRIBUTES: [VertexAttribute; 4] = [
        VertexAttribute::new(3, AttributeType::Float),
        VertexAttribute::new(4, AttributeType::Float),
        VertexAttribute::new(2, AttributeType::Float),
        VertexAttribute::new(1, AttributeType::UnsignedInt),
    ];
}

/// Three `u32` indices forming one triangle.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TriangleIndices {
    pub i0: u32,
    pub i1: u32,
    pub i2: u32,
}

impl TriangleIndices {
    pub const fn new(i0: u32, i1: u32, i2: u32) -> Self {
        Self { i0, i1, i2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 40);
        assert_eq!(std::mem::align_of::<Vertex>(), 4);
        assert_eq!(std::mem::size_of::<[Vertex; 2]>(), 80);
    }

    #[test]
    fn triangle_indices_are_three_u32() {
        assert_eq!(std::mem::size_of::<TriangleIndices>(), 12);
        assert_eq!(std::mem::align_of::<TriangleIndices>(), 4);
    }

    #[test]
    fn attribute_layout_matches_struct() {
        let stride: usize = Vertex::ATTRIBUTES.iter().map(|a| a.size_in_bytes()).sum();
        assert_eq!(stride, std::mem::size_of::<Vertex>());
    }
}
