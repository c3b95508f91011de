/// An axis-aligned rectangle in normalized texture coordinates.
///
/// Used to select the sub-image of a texture a quad samples from. The unit
/// rectangle covers the whole texture.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Rect {
    /// The full-texture rectangle, `(0, 0)` to `(1, 1)`.
    pub const UNIT: Rect = Rect {
        left: 0.0,
        bottom: 0.0,
        right: 1.0,
        top: 1.0,
    };

    pub const fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }
}
