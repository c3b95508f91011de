//! Shader program compilation and uniform-location caching.
//!
//! Compiling a [`ShaderProgram`] eagerly walks the program's active uniforms
//! and caches each location under an FNV-1a hash of the uniform's name, so
//! setting a uniform later is a single map lookup instead of a name-string
//! query against the driver.
//!
//! Compile and link failures are expected inputs (a rejected source file is
//! not exceptional), so they surface as [`ShaderError`] values carrying the
//! driver's info log verbatim.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use glam::Mat4;
use glow::HasContext;

use crate::batch::ShaderBinding;
use crate::context::DeviceContext;

/// Hashes a uniform name the way the location cache expects.
///
/// FNV-1a, 64 bit. `const`, so well-known names can be hashed once at compile
/// time:
///
/// ```
/// use quadbatch::uniform_hash;
///
/// const TINT: u64 = uniform_hash("tintColor");
/// ```
pub const fn uniform_hash(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

/// Every shader used with the batch renderer must expose this `mat4` uniform;
/// it receives the frame's view-projection matrix.
pub const PROJECTION_MATRIX_UNIFORM: u64 = uniform_hash("projectionMatrix");

/// The pipeline stage a compile error came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Errors that can occur while building a shader program.
#[derive(Debug)]
pub enum ShaderError {
    /// A source file could not be read.
    Io(std::io::Error),
    /// The driver refused to create a shader or program object.
    ResourceCreation(String),
    /// A stage failed to compile; the driver's info log is included verbatim.
    Compile { stage: ShaderStage, log: String },
    /// The program failed to link; the driver's info log is included verbatim.
    Link(String),
}

impl std::fmt::Display for ShaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderError::Io(e) => write!(f, "IO error: {}", e),
            ShaderError::ResourceCreation(msg) => {
                write!(f, "failed to create shader object: {}", msg)
            }
            ShaderError::Compile { stage, log } => {
                write!(f, "failed to compile {} shader: {}", stage, log)
            }
            ShaderError::Link(log) => write!(f, "failed to link shader program: {}", log),
        }
    }
}

impl std::error::Error for ShaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShaderError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ShaderError {
    fn from(e: std::io::Error) -> Self {
        ShaderError::Io(e)
    }
}

/// A compiled and linked vertex + fragment program.
///
/// Construction *is* compilation: a value of this type always refers to a
/// successfully linked program, so "drawing with an uncompiled shader" is
/// unrepresentable.
pub struct ShaderProgram {
    ctx: Rc<DeviceContext>,
    program: glow::NativeProgram,
    uniform_locations: HashMap<u64, glow::NativeUniformLocation>,
}

impl ShaderProgram {
    /// Compiles and links a program from the two stage sources.
    ///
    /// On failure, any partially created device objects are released before
    /// the error is returned.
    pub fn compile(
        ctx: Rc<DeviceContext>,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let gl = ctx.gl();

        let vertex_shader =
            compile_stage(gl, ShaderStage::Vertex, glow::VERTEX_SHADER, vertex_source)?;
        let fragment_shader = match compile_stage(
            gl,
            ShaderStage::Fragment,
            glow::FRAGMENT_SHADER,
            fragment_source,
        ) {
            Ok(shader) => shader,
            Err(e) => {
                unsafe { gl.delete_shader(vertex_shader) };
                return Err(e);
            }
        };

        let link_result = link_program(gl, vertex_shader, fragment_shader);
        unsafe {
            gl.delete_shader(vertex_shader);
            gl.delete_shader(fragment_shader);
        }
        let program = link_result?;

        let uniform_locations = cache_uniform_locations(gl, program);
        log::info!("linked shader program with {} active uniforms", uniform_locations.len());
        Ok(Self {
            ctx,
            program,
            uniform_locations,
        })
    }

    /// Reads both stage sources from disk and compiles them.
    pub fn from_files(
        ctx: Rc<DeviceContext>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self, ShaderError> {
        let vertex_source = std::fs::read_to_string(vertex_path)?;
        let fragment_source = std::fs::read_to_string(fragment_path)?;
        Self::compile(ctx, &vertex_source, &fragment_source)
    }

    /// Compiles the built-in batch shader.
    ///
    /// It consumes the full quad vertex layout, multiplies positions with
    /// `projectionMatrix`, samples from a 32-entry texture array indexed by
    /// the per-vertex texture slot, and discards fully transparent fragments.
    pub fn default_program(ctx: Rc<DeviceContext>) -> Result<Self, ShaderError> {
        Self::compile(ctx, DEFAULT_VERTEX_SHADER, DEFAULT_FRAGMENT_SHADER)
    }

    /// Makes this the active program, skipping the call if it already is.
    pub fn bind(&self) {
        self.ctx.bind_program(Some(self.program));
    }

    /// Returns whether a uniform with the given name survived compilation.
    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniform_locations.contains_key(&uniform_hash(name))
    }

    /// Binds the program and writes a `mat4` uniform by name hash.
    ///
    /// A missing uniform is logged and ignored: shader compilers routinely
    /// optimize unused uniforms away, and the caller can't act on that.
    pub fn set_uniform_mat4(&self, name_hash: u64, matrix: &Mat4) {
        self.bind();
        match self.uniform_locations.get(&name_hash) {
            Some(location) => unsafe {
                self.ctx.gl().uniform_matrix_4_f32_slice(
                    Some(location),
                    false,
                    &matrix.to_cols_array(),
                );
            },
            None => {
                log::error!("could not set uniform with name hash {name_hash:#x}: not found");
            }
        }
    }

    /// The identity and pre-resolved `projectionMatrix` location the batcher
    /// stores per command.
    pub(crate) fn binding(&self) -> ShaderBinding {
        ShaderBinding {
            program: self.program,
            projection_location: self
                .uniform_locations
                .get(&PROJECTION_MATRIX_UNIFORM)
                .cloned(),
        }
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        if self.ctx.bound_program() == Some(self.program) {
            self.ctx.bind_program(None);
        }
        unsafe { self.ctx.gl().delete_program(self.program) };
    }
}

fn compile_stage(
    gl: &glow::Context,
    stage: ShaderStage,
    stage_type: u32,
    source: &str,
) -> Result<glow::NativeShader, ShaderError> {
    unsafe {
        let shader = gl.create_shader(stage_type).map_err(ShaderError::ResourceCreation)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(ShaderError::Compile { stage, log });
        }
        Ok(shader)
    }
}

fn link_program(
    gl: &glow::Context,
    vertex_shader: glow::NativeShader,
    fragment_shader: glow::NativeShader,
) -> Result<glow::NativeProgram, ShaderError> {
    unsafe {
        let program = gl.create_program().map_err(ShaderError::ResourceCreation)?;
        gl.attach_shader(program, vertex_shader);
        gl.attach_shader(program, fragment_shader);
        gl.link_program(program);
        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(ShaderError::Link(log));
        }
        Ok(program)
    }
}

fn cache_uniform_locations(
    gl: &glow::Context,
    program: glow::NativeProgram,
) -> HashMap<u64, glow::NativeUniformLocation> {
    let mut locations = HashMap::new();
    unsafe {
        for index in 0..gl.get_active_uniforms(program) {
            let Some(uniform) = gl.get_active_uniform(program, index) else {
                continue;
            };
            if let Some(location) = gl.get_uniform_location(program, &uniform.name) {
                log::debug!("uniform location for {:?}: cached", uniform.name);
                locations.insert(uniform_hash(&uniform.name), location);
            }
        }
    }
    locations
}

const DEFAULT_VERTEX_SHADER: &str = r"#version 450 core

layout (location = 0) in vec3 aPos;
layout (location = 1) in vec4 aColor;
layout (location = 2) in vec2 aTexCoords;
layout (location = 3) in uint aTexIndex;

out vec4 fragmentColor;
out vec2 texCoords;
flat out uint texIndex;

uniform mat4 projectionMatrix;

void main() {
    fragmentColor = aColor;
    texCoords = aTexCoords;
    texIndex = aTexIndex;
    gl_Position = projectionMatrix * vec4(aPos, 1.0);
}
";

const DEFAULT_FRAGMENT_SHADER: &str = r"#version 450 core

in vec4 fragmentColor;
in vec2 texCoords;
flat in uint texIndex;

out vec4 FragColor;

layout (binding = 0) uniform sampler2D uTextures[32];

void main() {
    vec4 color = texture(uTextures[texIndex], texCoords) * fragmentColor;
    if (color.a == 0.0) {
        discard;
    }
    FragColor = color;
}
";
