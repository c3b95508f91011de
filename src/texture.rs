//! 2D texture resources.

use std::path::Path;
use std::rc::Rc;

use glow::HasContext;

use crate::color::Color;
use crate::context::DeviceContext;

/// Texture sampling filter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Filtering {
    Linear,
    Nearest,
}

/// Errors that can occur when creating a texture.
#[derive(Debug)]
pub enum TextureError {
    /// The image file could not be decoded.
    Image(image::ImageError),
    /// The driver refused to create the texture object.
    ResourceCreation(String),
    /// The pixel data didn't match the stated dimensions and channel count.
    SizeMismatch {
        expected_bytes: usize,
        actual_bytes: usize,
    },
    /// Only 1, 2, 3 or 4 channels per pixel are supported.
    UnsupportedChannelCount(u32),
}

impl std::fmt::Display for TextureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextureError::Image(e) => write!(f, "image error: {}", e),
            TextureError::ResourceCreation(msg) => {
                write!(f, "failed to create texture object: {}", msg)
            }
            TextureError::SizeMismatch {
                expected_bytes,
                actual_bytes,
            } => write!(
                f,
                "pixel data size mismatch: expected {} bytes, got {}",
                expected_bytes, actual_bytes
            ),
            TextureError::UnsupportedChannelCount(channels) => {
                write!(f, "unsupported channel count: {}", channels)
            }
        }
    }
}

impl std::error::Error for TextureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TextureError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<image::ImageError> for TextureError {
    fn from(e: image::ImageError) -> Self {
        TextureError::Image(e)
    }
}

/// A device-resident 2D image that can be bound to a texture unit.
pub struct Texture {
    ctx: Rc<DeviceContext>,
    texture: glow::NativeTexture,
    width: u32,
    height: u32,
    channels: u32,
}

impl Texture {
    /// Uploads raw 8-bit pixel data.
    ///
    /// `data` must hold exactly `width * height * channels` bytes, rows
    /// tightly packed bottom-up, with 1 to 4 channels per pixel.
    pub fn from_memory(
        ctx: Rc<DeviceContext>,
        width: u32,
        height: u32,
        channels: u32,
        data: &[u8],
    ) -> Result<Self, TextureError> {
        let (internal_format, format) = match channels {
            1 => (glow::R8, glow::RED),
            2 => (glow::RG8, glow::RG),
            3 => (glow::RGB8, glow::RGB),
            4 => (glow::RGBA8, glow::RGBA),
            other => return Err(TextureError::UnsupportedChannelCount(other)),
        };
        let expected_bytes = width as usize * height as usize * channels as usize;
        if data.len() != expected_bytes {
            return Err(TextureError::SizeMismatch {
                expected_bytes,
                actual_bytes: data.len(),
            });
        }

        let texture =
            unsafe { ctx.gl().create_texture() }.map_err(TextureError::ResourceCreation)?;
        ctx.bind_texture(Some(texture), 0);
        let gl = ctx.gl();
        unsafe {
            // Rows are tightly packed for any channel count.
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal_format as i32,
                width as i32,
                height as i32,
                0,
                format,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(data)),
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::LINEAR as i32,
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::REPEAT as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::REPEAT as i32);
        }
        Ok(Self {
            ctx,
            texture,
            width,
            height,
            channels,
        })
    }

    /// Loads a texture from an image file, decoding to RGBA8.
    ///
    /// The image is flipped vertically so row zero ends up at the bottom,
    /// matching the renderer's texture-coordinate convention.
    pub fn from_file(ctx: Rc<DeviceContext>, path: impl AsRef<Path>) -> Result<Self, TextureError> {
        let img = image::open(path)?.flipv().to_rgba8();
        let (width, height) = img.dimensions();
        Self::from_memory(ctx, width, height, 4, &img)
    }

    /// Loads a texture from encoded image bytes, decoding to RGBA8.
    pub fn from_bytes(ctx: Rc<DeviceContext>, bytes: &[u8]) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes)?.flipv().to_rgba8();
        let (width, height) = img.dimensions();
        Self::from_memory(ctx, width, height, 4, &img)
    }

    /// Creates a single-color RGBA texture, e.g. a white 1×1 stand-in for
    /// untextured quads.
    pub fn from_fill_color(
        ctx: Rc<DeviceContext>,
        width: u32,
        height: u32,
        fill_color: Color,
    ) -> Result<Self, TextureError> {
        let pixel = fill_color
            .to_array()
            .map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8);
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&pixel);
        }
        Self::from_memory(ctx, width, height, 4, &data)
    }

    /// Binds this texture to the given texture unit.
    ///
    /// A no-op at the device level if the unit already holds this texture.
    pub fn bind(&self, unit: u32) {
        self.ctx.bind_texture(Some(self.texture), unit);
    }

    /// Changes the min/mag filtering mode. Callers don't need to rebind
    /// afterwards.
    pub fn set_filtering(&self, filtering: Filtering) {
        let mode = match filtering {
            Filtering::Linear => glow::LINEAR,
            Filtering::Nearest => glow::NEAREST,
        } as i32;
        self.ctx.bind_texture(Some(self.texture), 0);
        let gl = self.ctx.gl();
        unsafe {
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, mode);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, mode);
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Width divided by height.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// The device identity the batcher sorts and deduplicates by.
    pub(crate) fn native(&self) -> glow::NativeTexture {
        self.texture
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.ctx.invalidate_texture(self.texture);
        unsafe { self.ctx.gl().delete_texture(self.texture) };
    }
}
