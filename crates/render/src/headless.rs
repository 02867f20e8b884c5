use crate::backend::{
    AttributeLocation, BackendError, BufferHandle, GraphicsBackend, ProgramHandle, ShaderHandle,
    TextureHandle, UniformLocation,
};
use crate::value::UniformValue;
use glam::Vec4;
use glint_ecs::{DrawMode, ShaderProgramSpec, ShaderStage};
use std::collections::{BTreeMap, BTreeSet};

/// One call made against the headless backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CompileShader { stage: ShaderStage, shader: ShaderHandle },
    DeleteShader(ShaderHandle),
    LinkProgram { program: ProgramHandle, name: String },
    DeleteProgram(ProgramHandle),
    UseProgram(ProgramHandle),
    CreateBuffer(BufferHandle),
    DeleteBuffer(BufferHandle),
    BindBuffer(BufferHandle),
    UploadBuffer { buffer: BufferHandle, len: usize },
    EnableAttribute { location: AttributeLocation, size: usize, stride: usize, offset: usize },
    DisableAttribute(AttributeLocation),
    CreateTexture(TextureHandle),
    DeleteTexture(TextureHandle),
    UploadTexture { texture: TextureHandle, width: u32, height: u32 },
    BindTexture { unit: u32, texture: TextureHandle },
    SetUniform { location: UniformLocation, value: UniformValue },
    DrawArrays { mode: DrawMode, first: usize, count: usize },
    BeginFrame,
    EndFrame,
}

#[derive(Debug)]
struct LinkedProgram {
    attributes: BTreeMap<String, AttributeLocation>,
    uniforms: BTreeMap<String, UniformLocation>,
}

/// Backend that performs no GPU work and records every call.
///
/// Used by tests and the CLI. Failures can be injected to exercise the
/// renderer's cleanup paths.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    calls: Vec<BackendCall>,
    next_id: u32,
    shaders: BTreeSet<ShaderHandle>,
    programs: BTreeMap<ProgramHandle, LinkedProgram>,
    uniform_names: BTreeMap<UniformLocation, String>,
    buffers: BTreeMap<BufferHandle, Vec<f32>>,
    textures: BTreeMap<TextureHandle, (u32, u32)>,
    bound_buffer: Option<BufferHandle>,
    current_program: Option<ProgramHandle>,
    fail_compile_marker: Option<String>,
    fail_link: BTreeSet<String>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails compilation of any shader whose source contains `marker`.
    pub fn fail_compile_containing(&mut self, marker: impl Into<String>) {
        self.fail_compile_marker = Some(marker.into());
    }

    pub fn fail_link_of(&mut self, program: impl Into<String>) {
        self.fail_link.insert(program.into());
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// `(mode, first, count)` of every recorded draw.
    pub fn draw_calls(&self) -> Vec<(DrawMode, usize, usize)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::DrawArrays { mode, first, count } => Some((*mode, *first, *count)),
                _ => None,
            })
            .collect()
    }

    pub fn buffer_uploads(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, BackendCall::UploadBuffer { .. }))
            .count()
    }

    /// Values written to the uniform named `name`, in call order.
    pub fn uniform_uploads(&self, name: &str) -> Vec<UniformValue> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::SetUniform { location, value }
                    if self.uniform_names.get(location).is_some_and(|n| n == name) =>
                {
                    Some(*value)
                }
                _ => None,
            })
            .collect()
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[f32]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).copied()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, BackendError> {
        if let Some(marker) = &self.fail_compile_marker {
            if source.contains(marker.as_str()) {
                return Err(BackendError::ShaderCompile {
                    stage,
                    log: format!("syntax error near '{marker}'"),
                });
            }
        }
        let shader = ShaderHandle(self.next());
        self.shaders.insert(shader);
        self.calls.push(BackendCall::CompileShader { stage, shader });
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader);
        self.calls.push(BackendCall::DeleteShader(shader));
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        spec: &ShaderProgramSpec,
    ) -> Result<ProgramHandle, BackendError> {
        for shader in [vertex, fragment] {
            if !self.shaders.contains(&shader) {
                return Err(BackendError::InvalidHandle {
                    kind: "shader",
                    id: shader.0,
                });
            }
        }
        if self.fail_link.contains(&spec.name) {
            return Err(BackendError::ProgramLink {
                log: format!("varying mismatch in '{}'", spec.name),
            });
        }

        let attributes = spec
            .vertex
            .attributes
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), AttributeLocation(i as u32)))
            .collect();
        let mut uniforms = BTreeMap::new();
        for uniform in spec.uniforms() {
            let location = UniformLocation(self.next());
            self.uniform_names.insert(location, uniform.name.clone());
            uniforms.insert(uniform.name.clone(), location);
        }

        let program = ProgramHandle(self.next());
        self.programs.insert(program, LinkedProgram { attributes, uniforms });
        self.calls.push(BackendCall::LinkProgram {
            program,
            name: spec.name.clone(),
        });
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if let Some(linked) = self.programs.remove(&program) {
            for location in linked.uniforms.values() {
                self.uniform_names.remove(location);
            }
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.calls.push(BackendCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramHandle) -> Result<(), BackendError> {
        if !self.programs.contains_key(&program) {
            return Err(BackendError::InvalidHandle {
                kind: "program",
                id: program.0,
            });
        }
        self.current_program = Some(program);
        self.calls.push(BackendCall::UseProgram(program));
        Ok(())
    }

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<AttributeLocation> {
        self.programs.get(&program)?.attributes.get(name).copied()
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program)?.uniforms.get(name).copied()
    }

    fn create_buffer(&mut self) -> Result<BufferHandle, BackendError> {
        let buffer = BufferHandle(self.next());
        self.buffers.insert(buffer, Vec::new());
        self.calls.push(BackendCall::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        if self.bound_buffer == Some(buffer) {
            self.bound_buffer = None;
        }
        self.calls.push(BackendCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&mut self, buffer: BufferHandle) -> Result<(), BackendError> {
        if !self.buffers.contains_key(&buffer) {
            return Err(BackendError::InvalidHandle {
                kind: "buffer",
                id: buffer.0,
            });
        }
        self.bound_buffer = Some(buffer);
        self.calls.push(BackendCall::BindBuffer(buffer));
        Ok(())
    }

    fn upload_buffer(&mut self, data: &[f32]) -> Result<(), BackendError> {
        let buffer = self.bound_buffer.ok_or(BackendError::NothingBound("buffer"))?;
        let slot = self
            .buffers
            .get_mut(&buffer)
            .ok_or(BackendError::InvalidHandle {
                kind: "buffer",
                id: buffer.0,
            })?;
        slot.clear();
        slot.extend_from_slice(data);
        self.calls.push(BackendCall::UploadBuffer {
            buffer,
            len: data.len(),
        });
        Ok(())
    }

    fn enable_attribute(&mut self, location: AttributeLocation, size: usize, stride: usize, offset: usize) {
        self.calls.push(BackendCall::EnableAttribute {
            location,
            size,
            stride,
            offset,
        });
    }

    fn disable_attribute(&mut self, location: AttributeLocation) {
        self.calls.push(BackendCall::DisableAttribute(location));
    }

    fn create_texture(&mut self) -> Result<TextureHandle, BackendError> {
        let texture = TextureHandle(self.next());
        self.textures.insert(texture, (0, 0));
        self.calls.push(BackendCall::CreateTexture(texture));
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.calls.push(BackendCall::DeleteTexture(texture));
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<(), BackendError> {
        if rgba.len() != (width * height * 4) as usize {
            return Err(BackendError::Validation(format!(
                "texture {width}x{height} needs {} bytes, got {}",
                width * height * 4,
                rgba.len()
            )));
        }
        let size = self.textures.get_mut(&texture).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        *size = (width, height);
        self.calls.push(BackendCall::UploadTexture {
            texture,
            width,
            height,
        });
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> Result<(), BackendError> {
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            });
        }
        self.calls.push(BackendCall::BindTexture { unit, texture });
        Ok(())
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) -> Result<(), BackendError> {
        if self.current_program.is_none() {
            return Err(BackendError::NothingBound("program"));
        }
        self.calls.push(BackendCall::SetUniform {
            location,
            value: *value,
        });
        Ok(())
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: usize, count: usize) -> Result<(), BackendError> {
        if self.current_program.is_none() {
            return Err(BackendError::NothingBound("program"));
        }
        if self.bound_buffer.is_none() {
            return Err(BackendError::NothingBound("buffer"));
        }
        self.calls.push(BackendCall::DrawArrays { mode, first, count });
        Ok(())
    }

    fn begin_frame(&mut self, _clear: Vec4) -> Result<(), BackendError> {
        self.calls.push(BackendCall::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        self.calls.push(BackendCall::EndFrame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_ecs::{FragmentShaderSpec, UniformType, Variation, VertexShaderSpec};

    fn spec() -> ShaderProgramSpec {
        ShaderProgramSpec::new(
            "basic",
            VertexShaderSpec::new("vs")
                .attribute("a_Position", 2)
                .uniform("u_Projection", UniformType::Mat4, Variation::Static),
            FragmentShaderSpec::new("fs"),
        )
    }

    #[test]
    fn link_assigns_locations() {
        let mut backend = HeadlessBackend::new();
        let vs = backend.compile_shader(ShaderStage::Vertex, "vs").unwrap();
        let fs = backend.compile_shader(ShaderStage::Fragment, "fs").unwrap();
        let program = backend.link_program(vs, fs, &spec()).unwrap();

        assert_eq!(backend.attribute_location(program, "a_Position"), Some(AttributeLocation(0)));
        assert!(backend.uniform_location(program, "u_Projection").is_some());
        assert!(backend.uniform_location(program, "u_Missing").is_none());
    }

    #[test]
    fn injected_failures() {
        let mut backend = HeadlessBackend::new();
        backend.fail_compile_containing("BROKEN");
        backend.fail_link_of("basic");
        assert!(backend.compile_shader(ShaderStage::Vertex, "BROKEN code").is_err());

        let vs = backend.compile_shader(ShaderStage::Vertex, "vs").unwrap();
        let fs = backend.compile_shader(ShaderStage::Fragment, "fs").unwrap();
        assert!(matches!(
            backend.link_program(vs, fs, &spec()),
            Err(BackendError::ProgramLink { .. })
        ));
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn draw_requires_bound_state() {
        let mut backend = HeadlessBackend::new();
        assert!(backend.draw_arrays(DrawMode::Triangles, 0, 3).is_err());
        assert!(backend.upload_buffer(&[1.0]).is_err());

        let buffer = backend.create_buffer().unwrap();
        backend.bind_buffer(buffer).unwrap();
        backend.upload_buffer(&[1.0, 2.0]).unwrap();
        assert_eq!(backend.buffer_data(buffer), Some(&[1.0, 2.0][..]));
        assert_eq!(backend.buffer_uploads(), 1);
    }
}
