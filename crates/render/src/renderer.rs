use crate::atlas::TextureAtlas;
use crate::backend::{
    AttributeLocation, BackendError, BufferHandle, GraphicsBackend, ProgramHandle, TextureHandle,
    UniformLocation,
};
use crate::error::RenderError;
use crate::loader::{LoadResult, TextureLoader};
use crate::resolver::ShaderVariableResolver;
use crate::value::RenderContext;
use crate::vbo::Vbo;
use glam::Vec4;
use glint_ecs::{Entity, ShaderProgramSpec, ShaderStage, UniformType, Variation};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Bound in place of an atlas until its image has been decoded.
pub const PLACEHOLDER_RGBA: [u8; 4] = [255, 0, 255, 255];

/// Counters for the current frame, reset by `begin_frame`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: usize,
    pub vertices: usize,
    pub buffer_uploads: usize,
    pub uniform_uploads: usize,
    pub program_switches: usize,
    pub texture_switches: usize,
}

/// One draw request: a compiled vertex buffer, the program and optional
/// atlas to draw it with, and the entities whose vertices it holds, in
/// buffer order.
#[derive(Debug, Clone, Copy)]
pub struct RendererConfig<'a> {
    pub vbo: &'a Vbo,
    pub shader_program_name: &'a str,
    pub texture_atlas_name: Option<&'a str>,
    pub entities: &'a [&'a Entity],
}

#[derive(Debug)]
struct UniformSlot {
    name: String,
    ty: UniformType,
    location: UniformLocation,
}

#[derive(Debug)]
struct ProgramRecord {
    spec: Arc<ShaderProgramSpec>,
    handle: ProgramHandle,
    attributes: Vec<(AttributeLocation, usize)>,
    static_uniforms: Vec<UniformSlot>,
    entity_uniforms: Vec<UniformSlot>,
}

#[derive(Debug)]
struct TextureRecord {
    handle: TextureHandle,
    unit: u32,
    width: u32,
    height: u32,
    loaded: bool,
}

/// GPU-facing state machine.
///
/// Owns every backend object it creates and remembers which program, vertex
/// buffer and texture are active so repeated draws skip redundant state
/// changes. Knows nothing about entity managers.
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    resolver: ShaderVariableResolver,
    programs: BTreeMap<String, ProgramRecord>,
    buffers: BTreeMap<String, BufferHandle>,
    textures: BTreeMap<String, TextureRecord>,
    texture_base_unit: u32,
    texture_count: u32,
    loader: TextureLoader,
    active_program: Option<String>,
    active_vbo: Option<String>,
    active_texture: Option<String>,
    enabled_attributes: Vec<AttributeLocation>,
    stats: FrameStats,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(backend: B, resolver: ShaderVariableResolver) -> Self {
        Self {
            backend,
            resolver,
            programs: BTreeMap::new(),
            buffers: BTreeMap::new(),
            textures: BTreeMap::new(),
            texture_base_unit: 0,
            texture_count: 0,
            loader: TextureLoader::new(),
            active_program: None,
            active_vbo: None,
            active_texture: None,
            enabled_attributes: Vec::new(),
            stats: FrameStats::default(),
        }
    }

    /// First texture unit handed out to atlases.
    pub fn with_texture_base_unit(mut self, unit: u32) -> Self {
        self.texture_base_unit = unit;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn resolver(&self) -> &ShaderVariableResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut ShaderVariableResolver {
        &mut self.resolver
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn program_names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn program_spec(&self, name: &str) -> Option<&Arc<ShaderProgramSpec>> {
        self.programs.get(name).map(|p| &p.spec)
    }

    pub fn has_vbo(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    pub fn vbo_names(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    pub fn texture_names(&self) -> impl Iterator<Item = &str> {
        self.textures.keys().map(String::as_str)
    }

    pub fn texture_unit(&self, name: &str) -> Option<u32> {
        self.textures.get(name).map(|t| t.unit)
    }

    pub fn texture_loaded(&self, name: &str) -> bool {
        self.textures.get(name).is_some_and(|t| t.loaded)
    }

    pub fn pending_textures(&self) -> usize {
        self.loader.pending()
    }

    /// Compiles and links `spec`, then looks up every attribute and uniform
    /// location once. On failure nothing created along the way survives.
    pub fn create_shader_program(&mut self, spec: Arc<ShaderProgramSpec>) -> Result<(), RenderError> {
        if self.programs.contains_key(&spec.name) {
            return Err(RenderError::DuplicateProgram(spec.name.clone()));
        }

        let vertex = self
            .backend
            .compile_shader(ShaderStage::Vertex, &spec.vertex.source)
            .map_err(|e| compile_error(&spec.name, e))?;
        let fragment = match self
            .backend
            .compile_shader(ShaderStage::Fragment, &spec.fragment.source)
        {
            Ok(fragment) => fragment,
            Err(e) => {
                self.backend.delete_shader(vertex);
                return Err(compile_error(&spec.name, e));
            }
        };

        let linked = self.backend.link_program(vertex, fragment, &spec);
        self.backend.delete_shader(vertex);
        self.backend.delete_shader(fragment);
        let handle = linked.map_err(|e| match e {
            BackendError::ProgramLink { log } => RenderError::ProgramLink {
                program: spec.name.clone(),
                log,
            },
            other => other.into(),
        })?;

        let record = match self.locate(handle, &spec) {
            Ok(record) => record,
            Err(e) => {
                self.backend.delete_program(handle);
                return Err(e);
            }
        };

        tracing::info!(
            program = %spec.name,
            attributes = record.attributes.len(),
            static_uniforms = record.static_uniforms.len(),
            entity_uniforms = record.entity_uniforms.len(),
            "shader program created"
        );
        self.programs.insert(spec.name.clone(), record);
        Ok(())
    }

    fn locate(&self, handle: ProgramHandle, spec: &Arc<ShaderProgramSpec>) -> Result<ProgramRecord, RenderError> {
        let missing = |variable: &str| RenderError::MissingLocation {
            program: spec.name.clone(),
            variable: variable.to_string(),
        };

        let mut attributes = Vec::with_capacity(spec.vertex.attributes.len());
        for attribute in &spec.vertex.attributes {
            let location = self
                .backend
                .attribute_location(handle, &attribute.name)
                .ok_or_else(|| missing(&attribute.name))?;
            attributes.push((location, attribute.size));
        }

        let mut static_uniforms = Vec::new();
        let mut entity_uniforms = Vec::new();
        for uniform in spec.uniforms() {
            let location = self
                .backend
                .uniform_location(handle, &uniform.name)
                .ok_or_else(|| missing(&uniform.name))?;
            let slot = UniformSlot {
                name: uniform.name.clone(),
                ty: uniform.ty,
                location,
            };
            match uniform.variation {
                Variation::Static => static_uniforms.push(slot),
                Variation::Entity => entity_uniforms.push(slot),
            }
        }

        Ok(ProgramRecord {
            spec: Arc::clone(spec),
            handle,
            attributes,
            static_uniforms,
            entity_uniforms,
        })
    }

    pub fn delete_shader_program(&mut self, name: &str) -> Result<(), RenderError> {
        let record = self.programs.remove(name).ok_or_else(|| RenderError::UnknownProgram {
            context: "Renderer::delete_shader_program",
            name: name.to_string(),
        })?;
        if self.active_program.as_deref() == Some(name) {
            self.active_program = None;
            self.active_vbo = None;
        }
        self.backend.delete_program(record.handle);
        Ok(())
    }

    pub fn create_vbo(&mut self, name: &str) -> Result<(), RenderError> {
        if self.buffers.contains_key(name) {
            return Err(RenderError::DuplicateVbo(name.to_string()));
        }
        let buffer = self.backend.create_buffer()?;
        self.buffers.insert(name.to_string(), buffer);
        tracing::debug!(vbo = name, "vbo created");
        Ok(())
    }

    /// Releases the buffer and disables the attribute arrays the active
    /// program had enabled.
    pub fn delete_vbo(&mut self, name: &str) -> Result<(), RenderError> {
        let buffer = self.buffers.remove(name).ok_or_else(|| RenderError::UnknownVbo {
            context: "Renderer::delete_vbo",
            name: name.to_string(),
        })?;
        for location in self.enabled_attributes.drain(..) {
            self.backend.disable_attribute(location);
        }
        if self.active_vbo.as_deref() == Some(name) {
            self.active_vbo = None;
        }
        self.backend.delete_buffer(buffer);
        tracing::debug!(vbo = name, "vbo deleted");
        Ok(())
    }

    /// Reserves the next texture unit for `atlas`, binds a magenta
    /// placeholder there and starts decoding the real image in the
    /// background. Returns the unit.
    pub fn create_texture(&mut self, atlas: &TextureAtlas) -> Result<u32, RenderError> {
        let name = atlas.name();
        if self.textures.contains_key(name) {
            return Err(RenderError::DuplicateTexture(name.to_string()));
        }
        let unit = self.texture_base_unit + self.texture_count;
        let handle = self.backend.create_texture()?;
        self.backend.upload_texture(handle, 1, 1, &PLACEHOLDER_RGBA)?;
        self.backend.bind_texture(unit, handle)?;
        self.texture_count += 1;
        self.textures.insert(
            name.to_string(),
            TextureRecord {
                handle,
                unit,
                width: atlas.width(),
                height: atlas.height(),
                loaded: false,
            },
        );
        self.loader.request(name, atlas.source());
        tracing::info!(texture = name, unit, "texture placeholder bound, image loading");
        Ok(unit)
    }

    /// Applies every image decode that has finished. Returns how many.
    pub fn poll_textures(&mut self) -> Result<usize, RenderError> {
        let done = self.loader.poll();
        self.apply_loads(done)
    }

    /// Blocks until all pending images are decoded, then applies them.
    pub fn finish_texture_loads(&mut self, timeout: Duration) -> Result<usize, RenderError> {
        let done = self.loader.wait(timeout);
        self.apply_loads(done)
    }

    fn apply_loads(&mut self, done: Vec<LoadResult>) -> Result<usize, RenderError> {
        let count = done.len();
        for LoadResult { name, image } in done {
            let Some(record) = self.textures.get_mut(&name) else {
                tracing::debug!(texture = %name, "image decoded for a deleted texture");
                continue;
            };
            let image = image.map_err(|reason| RenderError::TextureDecode {
                name: name.clone(),
                reason,
            })?;
            if (image.width, image.height) != (record.width, record.height) {
                tracing::warn!(
                    texture = %name,
                    expected = %format!("{}x{}", record.width, record.height),
                    actual = %format!("{}x{}", image.width, image.height),
                    "atlas image size differs from its declared size"
                );
            }
            self.backend
                .upload_texture(record.handle, image.width, image.height, &image.pixels)?;
            self.backend.bind_texture(record.unit, record.handle)?;
            record.loaded = true;
            tracing::info!(texture = %name, unit = record.unit, "texture loaded");
        }
        Ok(count)
    }

    pub fn begin_frame(&mut self, clear: Vec4) -> Result<(), RenderError> {
        self.stats = FrameStats::default();
        self.poll_textures()?;
        self.backend.begin_frame(clear)?;
        Ok(())
    }

    pub fn end_frame(&mut self) -> Result<(), RenderError> {
        self.backend.end_frame()?;
        Ok(())
    }

    /// Draws the entities of one vertex buffer.
    ///
    /// State changes are skipped when already current. The buffer is
    /// re-uploaded only while its `changed` flag is set. Static uniforms are
    /// written once; if the program has entity uniforms every entity gets its
    /// own draw, preceded by its uniform uploads, otherwise one draw covers
    /// the whole buffer.
    pub fn render(&mut self, config: &RendererConfig<'_>, ctx: &RenderContext) -> Result<(), RenderError> {
        const CONTEXT: &str = "Renderer::render";
        if config.entities.is_empty() {
            return Ok(());
        }

        let name = config.shader_program_name;
        let program = self.programs.get(name).ok_or_else(|| RenderError::UnknownProgram {
            context: CONTEXT,
            name: name.to_string(),
        })?;

        if self.active_program.as_deref() != Some(name) {
            self.backend.use_program(program.handle)?;
            self.active_program = Some(name.to_string());
            self.active_vbo = None;
            self.stats.program_switches += 1;
        }

        let vbo = config.vbo;
        let vertex_size = program.spec.vertex_size();
        if vbo.vertex_size != vertex_size {
            return Err(RenderError::AttributeSizeMismatch {
                context: CONTEXT,
                variable: vbo.name.clone(),
                expected: vertex_size,
                per_vertex: vertex_size * vbo.vertex_count,
                found: vbo.vertex_size,
            });
        }

        if self.active_vbo.as_deref() != Some(vbo.name.as_str()) || vbo.changed {
            let buffer = *self.buffers.get(&vbo.name).ok_or_else(|| RenderError::UnknownVbo {
                context: CONTEXT,
                name: vbo.name.clone(),
            })?;
            self.backend.bind_buffer(buffer)?;
            if vbo.changed {
                self.backend.upload_buffer(&vbo.data)?;
                self.stats.buffer_uploads += 1;
            }
            for location in self.enabled_attributes.drain(..) {
                self.backend.disable_attribute(location);
            }
            let mut offset = 0;
            for &(location, size) in &program.attributes {
                self.backend.enable_attribute(location, size, vertex_size, offset);
                self.enabled_attributes.push(location);
                offset += size;
            }
            self.active_vbo = Some(vbo.name.clone());
        }

        let mut ctx = *ctx;
        ctx.texture_unit = None;
        if let Some(texture_name) = config.texture_atlas_name {
            let texture = self.textures.get(texture_name).ok_or_else(|| RenderError::UnknownTexture {
                context: CONTEXT,
                name: texture_name.to_string(),
            })?;
            if self.active_texture.as_deref() != Some(texture_name) {
                self.backend.bind_texture(texture.unit, texture.handle)?;
                self.active_texture = Some(texture_name.to_string());
                self.stats.texture_switches += 1;
            }
            ctx.texture_unit = Some(texture.unit);
        } else if program.spec.uses_sampler() {
            return Err(RenderError::MissingTextureAtlas {
                context: CONTEXT,
                program: name.to_string(),
            });
        }

        for slot in &program.static_uniforms {
            let value = self.resolver.resolve_static_uniform(&slot.name, &ctx, slot.ty)?;
            self.backend.set_uniform(slot.location, &value)?;
            self.stats.uniform_uploads += 1;
        }

        let per_entity = vbo.vertex_count;
        if program.entity_uniforms.is_empty() {
            let count = per_entity * config.entities.len();
            self.backend.draw_arrays(vbo.draw_mode, 0, count)?;
            self.stats.draw_calls += 1;
            self.stats.vertices += count;
        } else {
            let mut first = 0;
            for entity in config.entities {
                for slot in &program.entity_uniforms {
                    let value = self.resolver.resolve_entity_uniform(&slot.name, entity, slot.ty)?;
                    self.backend.set_uniform(slot.location, &value)?;
                    self.stats.uniform_uploads += 1;
                }
                self.backend.draw_arrays(vbo.draw_mode, first, per_entity)?;
                self.stats.draw_calls += 1;
                self.stats.vertices += per_entity;
                first += per_entity;
            }
        }
        tracing::trace!(program = name, vbo = %vbo.name, entities = config.entities.len(), "rendered");
        Ok(())
    }
}

fn compile_error(program: &str, err: BackendError) -> RenderError {
    match err {
        BackendError::ShaderCompile { stage, log } => RenderError::ShaderCompile {
            program: program.to_string(),
            stage,
            log,
        },
        other => other.into(),
    }
}
