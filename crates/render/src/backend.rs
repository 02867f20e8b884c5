use crate::value::UniformValue;
use glam::Vec4;
use glint_ecs::{DrawMode, ShaderProgramSpec, ShaderStage};

macro_rules! handle {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

handle!(
    ShaderHandle,
    ProgramHandle,
    BufferHandle,
    TextureHandle,
    AttributeLocation,
    UniformLocation,
);

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{stage} shader compilation failed: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("program link failed: {log}")]
    ProgramLink { log: String },

    #[error("out of memory allocating {0}")]
    OutOfMemory(&'static str),

    #[error("invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },

    #[error("no {0} bound")]
    NothingBound(&'static str),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("validation error: {0}")]
    Validation(String),
}

/// The GPU surface the renderer drives. Mirrors a classic immediate-mode
/// graphics API: bind state, then draw.
///
/// Strides and offsets are counted in floats.
pub trait GraphicsBackend {
    fn name(&self) -> &'static str;

    // Programs
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, BackendError>;
    fn delete_shader(&mut self, shader: ShaderHandle);
    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        spec: &ShaderProgramSpec,
    ) -> Result<ProgramHandle, BackendError>;
    fn delete_program(&mut self, program: ProgramHandle);
    fn use_program(&mut self, program: ProgramHandle) -> Result<(), BackendError>;
    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<AttributeLocation>;
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    // Vertex buffers
    fn create_buffer(&mut self) -> Result<BufferHandle, BackendError>;
    fn delete_buffer(&mut self, buffer: BufferHandle);
    fn bind_buffer(&mut self, buffer: BufferHandle) -> Result<(), BackendError>;
    /// Replaces the contents of the bound buffer.
    fn upload_buffer(&mut self, data: &[f32]) -> Result<(), BackendError>;
    fn enable_attribute(&mut self, location: AttributeLocation, size: usize, stride: usize, offset: usize);
    fn disable_attribute(&mut self, location: AttributeLocation);

    // Textures
    fn create_texture(&mut self) -> Result<TextureHandle, BackendError>;
    fn delete_texture(&mut self, texture: TextureHandle);
    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<(), BackendError>;
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> Result<(), BackendError>;

    // Drawing
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) -> Result<(), BackendError>;
    fn draw_arrays(&mut self, mode: DrawMode, first: usize, count: usize) -> Result<(), BackendError>;
    fn begin_frame(&mut self, clear: Vec4) -> Result<(), BackendError>;
    fn end_frame(&mut self) -> Result<(), BackendError>;
}
