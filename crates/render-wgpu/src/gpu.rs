use crate::layout::{TEXTURE_GROUP, UNIFORM_GROUP, UniformBlock, write_value};
use glam::Vec4;
use glint_ecs::{DrawMode, ShaderProgramSpec, ShaderStage, UniformType};
use glint_render::{
    AttributeLocation, BackendError, BufferHandle, GraphicsBackend, ProgramHandle, ShaderHandle,
    TextureHandle, UniformLocation, UniformValue,
};
use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::sync::Arc;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const INITIAL_UNIFORM_CAPACITY: u64 = 64 * 1024;
const FLOAT: usize = std::mem::size_of::<f32>();

struct ShaderRecord {
    stage: ShaderStage,
    module: Arc<wgpu::ShaderModule>,
}

/// Vertex layout and topology a pipeline was built for. Sizes, strides and
/// offsets are in floats.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PipelineKey {
    mode: u8,
    stride: usize,
    attributes: Vec<(u32, usize, usize)>,
}

struct ProgramRecord {
    name: String,
    vertex: Arc<wgpu::ShaderModule>,
    fragment: Arc<wgpu::ShaderModule>,
    attributes: BTreeMap<String, AttributeLocation>,
    uniforms: BTreeMap<String, UniformLocation>,
    block: UniformBlock,
    /// Current uniform values, laid out as `block`.
    values: Vec<u8>,
    textured: bool,
    sampler_unit: Option<u32>,
    uniform_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_bind_group: Option<wgpu::BindGroup>,
    pipelines: BTreeMap<PipelineKey, wgpu::RenderPipeline>,
}

#[derive(Debug, Clone, Copy)]
enum UniformSlot {
    Field { program: ProgramHandle, offset: usize },
    Sampler { program: ProgramHandle },
}

struct TextureRecord {
    bind_group: Option<wgpu::BindGroup>,
}

struct DrawCommand {
    program: ProgramHandle,
    pipeline: PipelineKey,
    buffer: BufferHandle,
    uniform_offset: u32,
    texture: Option<TextureHandle>,
    first: u32,
    count: u32,
}

struct Target {
    view: wgpu::TextureView,
    size: (u32, u32),
}

fn mode_index(mode: DrawMode) -> u8 {
    match mode {
        DrawMode::Points => 0,
        DrawMode::Lines => 1,
        DrawMode::LineStrip => 2,
        DrawMode::Triangles => 3,
        DrawMode::TriangleStrip => 4,
    }
}

fn topology(index: u8) -> wgpu::PrimitiveTopology {
    match index {
        0 => wgpu::PrimitiveTopology::PointList,
        1 => wgpu::PrimitiveTopology::LineList,
        2 => wgpu::PrimitiveTopology::LineStrip,
        3 => wgpu::PrimitiveTopology::TriangleList,
        _ => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn vertex_format(size: usize) -> Option<wgpu::VertexFormat> {
    match size {
        1 => Some(wgpu::VertexFormat::Float32),
        2 => Some(wgpu::VertexFormat::Float32x2),
        3 => Some(wgpu::VertexFormat::Float32x3),
        4 => Some(wgpu::VertexFormat::Float32x4),
        _ => None,
    }
}

fn entry_point(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vs_main",
        ShaderStage::Fragment => "fs_main",
    }
}

/// [`GraphicsBackend`] over wgpu.
///
/// wgpu has no bind-then-draw state machine, so this backend keeps one: bound
/// buffer, enabled attributes, current program and its uniform values,
/// texture units. Each `draw_arrays` snapshots that state into a command,
/// building the render pipeline for the (program, vertex layout, topology)
/// on first use. `end_frame` copies every snapshot's uniforms into one buffer
/// addressed with dynamic offsets and replays the commands in a single render
/// pass onto the target set with [`set_target`](Self::set_target).
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    next_id: u32,

    shaders: BTreeMap<ShaderHandle, ShaderRecord>,
    programs: BTreeMap<ProgramHandle, ProgramRecord>,
    uniform_slots: BTreeMap<UniformLocation, UniformSlot>,
    buffers: BTreeMap<BufferHandle, Option<wgpu::Buffer>>,
    textures: BTreeMap<TextureHandle, TextureRecord>,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    current_program: Option<ProgramHandle>,
    bound_buffer: Option<BufferHandle>,
    enabled: BTreeMap<AttributeLocation, (usize, usize)>,
    stride: usize,
    units: BTreeMap<u32, TextureHandle>,

    target: Option<Target>,
    depth: Option<(wgpu::TextureView, (u32, u32))>,
    clear: Vec4,
    commands: Vec<DrawCommand>,
    uniform_arena: Vec<u8>,
    uniform_buffer: wgpu::Buffer,
    uniform_alignment: usize,
    last_frame_draws: usize,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, surface_format: wgpu::TextureFormat) -> Self {
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("atlas_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("atlas_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let uniform_buffer = Self::create_uniform_buffer(&device, INITIAL_UNIFORM_CAPACITY);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;

        Self {
            device,
            queue,
            surface_format,
            next_id: 0,
            shaders: BTreeMap::new(),
            programs: BTreeMap::new(),
            uniform_slots: BTreeMap::new(),
            buffers: BTreeMap::new(),
            textures: BTreeMap::new(),
            texture_layout,
            sampler,
            current_program: None,
            bound_buffer: None,
            enabled: BTreeMap::new(),
            stride: 0,
            units: BTreeMap::new(),
            target: None,
            depth: None,
            clear: Vec4::ZERO,
            commands: Vec::new(),
            uniform_arena: Vec::new(),
            uniform_buffer,
            uniform_alignment: uniform_alignment.max(1),
            last_frame_draws: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    pub fn last_frame_draws(&self) -> usize {
        self.last_frame_draws
    }

    /// Sets the view the next frame renders into. The depth buffer follows
    /// the target size.
    pub fn set_target(&mut self, view: wgpu::TextureView, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        if self.depth.as_ref().is_none_or(|(_, s)| *s != size) {
            self.depth = Some((Self::create_depth_view(&self.device, size), size));
        }
        self.target = Some(Target { view, size });
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn create_uniform_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform_arena"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_depth_view(device: &wgpu::Device, (width, height): (u32, u32)) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }

    /// Runs `f` inside a validation error scope and returns its first error.
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<String>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error.map(|e| e.to_string()))
    }

    fn current_key(&self, mode: DrawMode) -> Result<PipelineKey, BackendError> {
        let mut attributes = Vec::with_capacity(self.enabled.len());
        for (location, &(size, offset)) in &self.enabled {
            if vertex_format(size).is_none() {
                return Err(BackendError::Validation(format!(
                    "attribute {} has {size} components; 1 to 4 are supported",
                    location.0
                )));
            }
            attributes.push((location.0, size, offset));
        }
        Ok(PipelineKey {
            mode: mode_index(mode),
            stride: self.stride,
            attributes,
        })
    }

    fn ensure_pipeline(&mut self, program: ProgramHandle, key: &PipelineKey) -> Result<(), BackendError> {
        let record = self.programs.get(&program).ok_or(BackendError::InvalidHandle {
            kind: "program",
            id: program.0,
        })?;
        if record.pipelines.contains_key(key) {
            return Ok(());
        }
        let format = self.surface_format;
        let (pipeline, error) = self.scoped(|device| build_pipeline(device, record, key, format));
        if let Some(log) = error {
            return Err(BackendError::Validation(format!("pipeline for '{}': {log}", record.name)));
        }
        tracing::debug!(program = %record.name, stride = key.stride, "render pipeline created");
        if let Some(record) = self.programs.get_mut(&program) {
            record.pipelines.insert(key.clone(), pipeline);
        }
        Ok(())
    }

    fn push_uniforms(&mut self, program: ProgramHandle) -> Result<u32, BackendError> {
        let record = self.programs.get(&program).ok_or(BackendError::InvalidHandle {
            kind: "program",
            id: program.0,
        })?;
        let offset = self.uniform_arena.len().div_ceil(self.uniform_alignment) * self.uniform_alignment;
        self.uniform_arena.resize(offset, 0);
        self.uniform_arena.extend_from_slice(&record.values);
        u32::try_from(offset).map_err(|_| BackendError::OutOfMemory("uniform arena"))
    }

    /// Grows the uniform buffer to hold this frame's arena and creates the
    /// per-program bind groups that point into it.
    fn prepare_uniforms(&mut self) {
        let needed = self.uniform_arena.len() as u64;
        if needed > self.uniform_buffer.size() {
            let size = needed.next_power_of_two();
            self.uniform_buffer = Self::create_uniform_buffer(&self.device, size);
            for record in self.programs.values_mut() {
                record.uniform_bind_group = None;
            }
            tracing::debug!(bytes = size, "uniform buffer grown");
        }
        if needed > 0 {
            self.queue.write_buffer(&self.uniform_buffer, 0, &self.uniform_arena);
        }
        for command in &self.commands {
            let Some(record) = self.programs.get_mut(&command.program) else {
                continue;
            };
            if record.uniform_bind_group.is_none() {
                record.uniform_bind_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&record.name),
                    layout: &record.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &self.uniform_buffer,
                            offset: 0,
                            size: NonZeroU64::new(record.block.size() as u64),
                        }),
                    }],
                }));
            }
        }
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    program: &ProgramRecord,
    key: &PipelineKey,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let attributes: Vec<wgpu::VertexAttribute> = key
        .attributes
        .iter()
        .filter_map(|&(location, size, offset)| {
            Some(wgpu::VertexAttribute {
                format: vertex_format(size)?,
                offset: (offset * FLOAT) as u64,
                shader_location: location,
            })
        })
        .collect();
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&program.name),
        layout: Some(&program.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &program.vertex,
            entry_point: Some(entry_point(ShaderStage::Vertex)),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: (key.stride * FLOAT) as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }],
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.fragment,
            entry_point: Some(entry_point(ShaderStage::Fragment)),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: topology(key.mode),
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: Default::default(),
        multiview: None,
        cache: None,
    })
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, BackendError> {
        let entry = entry_point(stage);
        if !source.contains(&format!("fn {entry}(")) {
            return Err(BackendError::ShaderCompile {
                stage,
                log: format!("entry point '{entry}' not found"),
            });
        }
        let (module, error) = self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(entry),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(log) = error {
            return Err(BackendError::ShaderCompile { stage, log });
        }
        let handle = ShaderHandle(self.next());
        self.shaders.insert(
            handle,
            ShaderRecord {
                stage,
                module: Arc::new(module),
            },
        );
        Ok(handle)
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader);
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        spec: &ShaderProgramSpec,
    ) -> Result<ProgramHandle, BackendError> {
        let mut modules = Vec::with_capacity(2);
        for (handle, stage) in [(vertex, ShaderStage::Vertex), (fragment, ShaderStage::Fragment)] {
            let record = self.shaders.get(&handle).ok_or(BackendError::InvalidHandle {
                kind: "shader",
                id: handle.0,
            })?;
            if record.stage != stage {
                return Err(BackendError::ProgramLink {
                    log: format!("shader {} is a {} shader, expected {stage}", handle.0, record.stage),
                });
            }
            modules.push(Arc::clone(&record.module));
        }
        let (vertex_module, fragment_module) = (Arc::clone(&modules[0]), Arc::clone(&modules[1]));

        let block = UniformBlock::of(spec);
        let textured = spec.uses_sampler();
        let uniform_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&spec.name),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(block.size() as u64),
                },
                count: None,
            }],
        });
        let mut layouts = vec![&uniform_layout];
        if textured {
            layouts.push(&self.texture_layout);
        }
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&spec.name),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });

        let handle = ProgramHandle(self.next());
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
            let slot = if uniform.ty == UniformType::Sampler {
                UniformSlot::Sampler { program: handle }
            } else {
                let offset = block.field(&uniform.name).map(|f| f.offset).unwrap_or_default();
                UniformSlot::Field { program: handle, offset }
            };
            self.uniform_slots.insert(location, slot);
            uniforms.insert(uniform.name.clone(), location);
        }

        let mut record = ProgramRecord {
            name: spec.name.clone(),
            vertex: vertex_module,
            fragment: fragment_module,
            attributes,
            uniforms,
            values: vec![0; block.size()],
            block,
            textured,
            sampler_unit: None,
            uniform_layout,
            pipeline_layout,
            uniform_bind_group: None,
            pipelines: BTreeMap::new(),
        };

        // Build the tightly packed triangle pipeline now so interface
        // mismatches between the stages surface as link errors.
        let mut offset = 0;
        let mut packed = Vec::new();
        for (i, attribute) in spec.vertex.attributes.iter().enumerate() {
            packed.push((i as u32, attribute.size, offset));
            offset += attribute.size;
        }
        let key = PipelineKey {
            mode: mode_index(DrawMode::Triangles),
            stride: offset,
            attributes: packed,
        };
        let format = self.surface_format;
        let (pipeline, error) = self.scoped(|device| build_pipeline(device, &record, &key, format));
        if let Some(log) = error {
            self.uniform_slots.retain(|_, slot| match slot {
                UniformSlot::Field { program, .. } | UniformSlot::Sampler { program } => *program != handle,
            });
            return Err(BackendError::ProgramLink { log });
        }
        record.pipelines.insert(key, pipeline);
        self.programs.insert(handle, record);
        tracing::info!(program = %spec.name, "wgpu program linked");
        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.uniform_slots.retain(|_, slot| match slot {
            UniformSlot::Field { program: p, .. } | UniformSlot::Sampler { program: p } => *p != program,
        });
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: ProgramHandle) -> Result<(), BackendError> {
        if !self.programs.contains_key(&program) {
            return Err(BackendError::InvalidHandle {
                kind: "program",
                id: program.0,
            });
        }
        self.current_program = Some(program);
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
        self.buffers.insert(buffer, None);
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if let Some(Some(gpu)) = self.buffers.remove(&buffer) {
            gpu.destroy();
        }
        if self.bound_buffer == Some(buffer) {
            self.bound_buffer = None;
        }
    }

    fn bind_buffer(&mut self, buffer: BufferHandle) -> Result<(), BackendError> {
        if !self.buffers.contains_key(&buffer) {
            return Err(BackendError::InvalidHandle {
                kind: "buffer",
                id: buffer.0,
            });
        }
        self.bound_buffer = Some(buffer);
        Ok(())
    }

    fn upload_buffer(&mut self, data: &[f32]) -> Result<(), BackendError> {
        let handle = self.bound_buffer.ok_or(BackendError::NothingBound("buffer"))?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let slot = self.buffers.get_mut(&handle).ok_or(BackendError::InvalidHandle {
            kind: "buffer",
            id: handle.0,
        })?;
        let fits = slot.as_ref().is_some_and(|b| b.size() >= bytes.len() as u64);
        if !fits {
            if let Some(old) = slot.take() {
                old.destroy();
            }
            *slot = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("vertex_buffer"),
                size: (bytes.len() as u64).max(FLOAT as u64),
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        if let (Some(buffer), false) = (slot.as_ref(), bytes.is_empty()) {
            self.queue.write_buffer(buffer, 0, bytes);
        }
        Ok(())
    }

    fn enable_attribute(&mut self, location: AttributeLocation, size: usize, stride: usize, offset: usize) {
        self.enabled.insert(location, (size, offset));
        self.stride = stride;
    }

    fn disable_attribute(&mut self, location: AttributeLocation) {
        self.enabled.remove(&location);
    }

    fn create_texture(&mut self) -> Result<TextureHandle, BackendError> {
        let texture = TextureHandle(self.next());
        self.textures.insert(
            texture,
            TextureRecord { bind_group: None },
        );
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.units.retain(|_, bound| *bound != texture);
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<(), BackendError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(BackendError::Validation(format!(
                "texture {}: {} bytes for {width}x{height} RGBA",
                texture.0,
                rgba.len()
            )));
        }
        let record = self.textures.get_mut(&texture).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let gpu = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("atlas_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = gpu.create_view(&Default::default());
        record.bind_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("atlas_bind_group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        }));
        tracing::debug!(texture = texture.0, width, height, "texture uploaded");
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> Result<(), BackendError> {
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            });
        }
        self.units.insert(unit, texture);
        Ok(())
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) -> Result<(), BackendError> {
        let current = self.current_program.ok_or(BackendError::NothingBound("program"))?;
        let slot = *self.uniform_slots.get(&location).ok_or(BackendError::InvalidHandle {
            kind: "uniform",
            id: location.0,
        })?;
        let record = self.programs.get_mut(&current).ok_or(BackendError::NothingBound("program"))?;
        match slot {
            UniformSlot::Field { program, offset } if program == current => {
                if !write_value(&mut record.values, offset, value) {
                    return Err(BackendError::Validation(format!(
                        "uniform {} does not fit the block of '{}'",
                        location.0, record.name
                    )));
                }
            }
            UniformSlot::Sampler { program } if program == current => match value {
                UniformValue::Int(unit) if *unit >= 0 => record.sampler_unit = Some(*unit as u32),
                other => {
                    return Err(BackendError::Validation(format!(
                        "sampler of '{}' takes a texture unit, got {other:?}",
                        record.name
                    )));
                }
            },
            _ => {
                return Err(BackendError::InvalidHandle {
                    kind: "uniform",
                    id: location.0,
                });
            }
        }
        Ok(())
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: usize, count: usize) -> Result<(), BackendError> {
        let program = self.current_program.ok_or(BackendError::NothingBound("program"))?;
        let buffer = self.bound_buffer.ok_or(BackendError::NothingBound("buffer"))?;
        if count == 0 {
            return Ok(());
        }
        let key = self.current_key(mode)?;
        self.ensure_pipeline(program, &key)?;

        let (textured, sampler_unit) = self
            .programs
            .get(&program)
            .map(|p| (p.textured, p.sampler_unit))
            .unwrap_or_default();
        let texture = if textured {
            let unit = sampler_unit.ok_or(BackendError::NothingBound("sampler unit"))?;
            Some(*self.units.get(&unit).ok_or(BackendError::NothingBound("texture"))?)
        } else {
            None
        };
        let uniform_offset = self.push_uniforms(program)?;
        let to_u32 = |v: usize| u32::try_from(v).map_err(|_| BackendError::Validation(format!("draw range {v} too large")));
        self.commands.push(DrawCommand {
            program,
            pipeline: key,
            buffer,
            uniform_offset,
            texture,
            first: to_u32(first)?,
            count: to_u32(count)?,
        });
        Ok(())
    }

    fn begin_frame(&mut self, clear: Vec4) -> Result<(), BackendError> {
        if self.target.is_none() {
            return Err(BackendError::Surface("no render target set for this frame".into()));
        }
        self.clear = clear;
        self.commands.clear();
        self.uniform_arena.clear();
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let target = self
            .target
            .take()
            .ok_or_else(|| BackendError::Surface("no render target set for this frame".into()))?;
        self.prepare_uniforms();

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });
        {
            let depth = self.depth.as_ref().filter(|(_, size)| *size == target.size);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: self.clear.x as f64,
                            g: self.clear.y as f64,
                            b: self.clear.z as f64,
                            a: self.clear.w as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth.map(|(view, _)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for command in &self.commands {
                let Some(program) = self.programs.get(&command.program) else {
                    tracing::warn!(program = command.program.0, "program deleted mid-frame, draw skipped");
                    continue;
                };
                let (Some(pipeline), Some(uniforms)) = (
                    program.pipelines.get(&command.pipeline),
                    program.uniform_bind_group.as_ref(),
                ) else {
                    continue;
                };
                let Some(Some(buffer)) = self.buffers.get(&command.buffer) else {
                    tracing::warn!(buffer = command.buffer.0, "vertex buffer missing, draw skipped");
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(UNIFORM_GROUP, uniforms, &[command.uniform_offset]);
                if let Some(texture) = command.texture {
                    match self.textures.get(&texture).and_then(|t| t.bind_group.as_ref()) {
                        Some(group) => pass.set_bind_group(TEXTURE_GROUP, group, &[]),
                        None => continue,
                    }
                }
                pass.set_vertex_buffer(0, buffer.slice(..));
                pass.draw(command.first..command.first + command.count, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.last_frame_draws = self.commands.len();
        self.commands.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_draw_mode_has_a_topology() {
        let modes = [
            (DrawMode::Points, wgpu::PrimitiveTopology::PointList),
            (DrawMode::Lines, wgpu::PrimitiveTopology::LineList),
            (DrawMode::LineStrip, wgpu::PrimitiveTopology::LineStrip),
            (DrawMode::Triangles, wgpu::PrimitiveTopology::TriangleList),
            (DrawMode::TriangleStrip, wgpu::PrimitiveTopology::TriangleStrip),
        ];
        for (mode, expected) in modes {
            assert_eq!(topology(mode_index(mode)), expected);
        }
    }

    #[test]
    fn attribute_sizes_map_to_float_formats() {
        assert_eq!(vertex_format(2), Some(wgpu::VertexFormat::Float32x2));
        assert_eq!(vertex_format(4), Some(wgpu::VertexFormat::Float32x4));
        assert_eq!(vertex_format(0), None);
        assert_eq!(vertex_format(16), None);
    }

    #[test]
    fn pipeline_keys_order_by_layout() {
        let a = PipelineKey {
            mode: mode_index(DrawMode::Triangles),
            stride: 4,
            attributes: vec![(0, 2, 0), (1, 2, 2)],
        };
        let mut b = a.clone();
        b.stride = 6;
        assert!(a < b);
        assert_ne!(a, b);
    }
}
