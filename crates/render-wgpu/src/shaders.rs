//! Built-in WGSL programs.
//!
//! Each program declares its attributes and uniforms once; the uniform block
//! and texture bindings are generated from that declaration and prepended to
//! both stage sources, so the WGSL always matches what the backend uploads.

use crate::layout::UniformBlock;
use glint_ecs::{
    FragmentShaderSpec, ShaderProgramSpec, ShaderStage, UniformType, Variation, VertexShaderSpec,
};
use std::sync::Arc;

pub const FLAT: &str = "flat";
pub const COLORED: &str = "colored";
pub const SPRITE: &str = "sprite";
pub const SOLID: &str = "solid";

/// Single color per entity, planar geometry. One draw per entity.
const FLAT_VS: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.u_Projection * uniforms.u_View * uniforms.u_Transform
        * vec4<f32>(position, 0.0, 1.0);
    return out;
}
"#;

const FLAT_FS: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return uniforms.u_Color;
}
"#;

/// World-space positions and colors baked into the vertex buffer, so a whole
/// group draws in one call.
const COLORED_VS: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) color: vec4<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.u_Projection * uniforms.u_View * vec4<f32>(position, 0.0, 1.0);
    out.color = color;
    return out;
}
"#;

const COLORED_FS: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

/// Atlas cell sampled per entity. Coordinates arrive already mapped into
/// image space by the atlas.
const SPRITE_VS: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.u_Projection * uniforms.u_View * uniforms.u_Transform
        * vec4<f32>(position, 0.0, 1.0);
    out.uv = uv;
    return out;
}
"#;

const SPRITE_FS: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(atlas_texture, atlas_sampler, in.uv);
    if texel.a < 0.01 {
        discard;
    }
    return texel;
}
"#;

/// Spatial geometry with a flat color and simple depth shading.
const SOLID_VS: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) depth: f32,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    let view_pos = uniforms.u_View * uniforms.u_Transform * vec4<f32>(position, 1.0);
    out.clip_position = uniforms.u_Projection * view_pos;
    out.depth = -view_pos.z;
    return out;
}
"#;

const SOLID_FS: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) depth: f32,
};

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let shade = clamp(1.2 - in.depth * 0.02, 0.35, 1.0);
    return vec4<f32>(uniforms.u_Color.rgb * shade, uniforms.u_Color.a);
}
"#;

struct Uniform {
    name: &'static str,
    ty: UniformType,
    variation: Variation,
    stage: ShaderStage,
}

const fn uniform(name: &'static str, ty: UniformType, variation: Variation, stage: ShaderStage) -> Uniform {
    Uniform {
        name,
        ty,
        variation,
        stage,
    }
}

const PROJECTION: Uniform = uniform("u_Projection", UniformType::Mat4, Variation::Static, ShaderStage::Vertex);
const VIEW: Uniform = uniform("u_View", UniformType::Mat4, Variation::Static, ShaderStage::Vertex);
const TRANSFORM: Uniform = uniform("u_Transform", UniformType::Mat4, Variation::Entity, ShaderStage::Vertex);
const COLOR: Uniform = uniform("u_Color", UniformType::Vec4, Variation::Entity, ShaderStage::Fragment);
const TEXTURE: Uniform = uniform("u_Texture", UniformType::Sampler, Variation::Static, ShaderStage::Fragment);

fn build(
    name: &str,
    attributes: &[(&str, usize)],
    uniforms: &[Uniform],
    vs_body: &str,
    fs_body: &str,
) -> Arc<ShaderProgramSpec> {
    let mut vertex = VertexShaderSpec::new(String::new());
    for (attribute, size) in attributes {
        vertex = vertex.attribute(*attribute, *size);
    }
    let mut fragment = FragmentShaderSpec::new(String::new());
    for u in uniforms {
        match u.stage {
            ShaderStage::Vertex => vertex = vertex.uniform(u.name, u.ty, u.variation),
            ShaderStage::Fragment => fragment = fragment.uniform(u.name, u.ty, u.variation),
        }
    }
    let mut spec = ShaderProgramSpec::new(name, vertex, fragment);
    let prelude = UniformBlock::of(&spec).wgsl_prelude(spec.uses_sampler());
    spec.vertex.source = format!("{prelude}{vs_body}");
    spec.fragment.source = format!("{prelude}{fs_body}");
    Arc::new(spec)
}

pub fn flat() -> Arc<ShaderProgramSpec> {
    build(FLAT, &[("a_Position", 2)], &[PROJECTION, VIEW, TRANSFORM, COLOR], FLAT_VS, FLAT_FS)
}

pub fn colored() -> Arc<ShaderProgramSpec> {
    build(
        COLORED,
        &[("a_WorldPosition", 2), ("a_Color", 4)],
        &[PROJECTION, VIEW],
        COLORED_VS,
        COLORED_FS,
    )
}

pub fn sprite() -> Arc<ShaderProgramSpec> {
    build(
        SPRITE,
        &[("a_Position", 2), ("a_TexCoord", 2)],
        &[PROJECTION, VIEW, TRANSFORM, TEXTURE],
        SPRITE_VS,
        SPRITE_FS,
    )
}

pub fn solid() -> Arc<ShaderProgramSpec> {
    build(SOLID, &[("a_Position", 3)], &[PROJECTION, VIEW, TRANSFORM, COLOR], SOLID_VS, SOLID_FS)
}

/// Every built-in program, ready for `Renderer::create_shader_program`.
pub fn builtin_programs() -> Vec<Arc<ShaderProgramSpec>> {
    vec![flat(), colored(), sprite(), solid()]
}
