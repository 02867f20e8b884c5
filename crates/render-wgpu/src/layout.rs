use glint_ecs::{ShaderProgramSpec, UniformType};
use glint_render::UniformValue;

/// Bind group holding the per-program uniform block.
pub const UNIFORM_GROUP: u32 = 0;
/// Bind group holding the sampled texture and its sampler.
pub const TEXTURE_GROUP: u32 = 1;

/// Placeholder member for programs without non-sampler uniforms; WGSL structs
/// cannot be empty.
const PADDING_MEMBER: &str = "_padding";

#[derive(Debug, Clone, PartialEq)]
pub struct UniformField {
    pub name: String,
    pub ty: UniformType,
    pub offset: usize,
}

/// Layout of a program's uniforms in the WGSL uniform address space.
///
/// Members follow the program's uniform order. Samplers are not part of the
/// block; they live in [`TEXTURE_GROUP`].
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    fields: Vec<UniformField>,
    size: usize,
}

/// `(align, size)` in bytes.
fn align_and_size(ty: UniformType) -> (usize, usize) {
    match ty {
        UniformType::Float | UniformType::Int | UniformType::Sampler => (4, 4),
        UniformType::Vec2 => (8, 8),
        UniformType::Vec3 => (16, 12),
        UniformType::Vec4 => (16, 16),
        UniformType::Mat3 => (16, 48),
        UniformType::Mat4 => (16, 64),
    }
}

fn wgsl_type(ty: UniformType) -> &'static str {
    match ty {
        UniformType::Float => "f32",
        UniformType::Int | UniformType::Sampler => "i32",
        UniformType::Vec2 => "vec2<f32>",
        UniformType::Vec3 => "vec3<f32>",
        UniformType::Vec4 => "vec4<f32>",
        UniformType::Mat3 => "mat3x3<f32>",
        UniformType::Mat4 => "mat4x4<f32>",
    }
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

impl UniformBlock {
    pub fn of(spec: &ShaderProgramSpec) -> Self {
        let mut fields = Vec::new();
        let mut cursor = 0;
        for uniform in spec.uniforms() {
            if uniform.ty == UniformType::Sampler {
                continue;
            }
            let (align, size) = align_and_size(uniform.ty);
            let offset = round_up(cursor, align);
            fields.push(UniformField {
                name: uniform.name.clone(),
                ty: uniform.ty,
                offset,
            });
            cursor = offset + size;
        }
        Self {
            fields,
            size: round_up(cursor, 16).max(16),
        }
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Block size in bytes, a multiple of 16.
    pub fn size(&self) -> usize {
        self.size
    }

    /// WGSL declaration of the block and, when `textured`, the texture and
    /// sampler bindings. Shader sources are written against this prelude.
    pub fn wgsl_prelude(&self, textured: bool) -> String {
        let mut out = String::from("struct Uniforms {\n");
        if self.fields.is_empty() {
            out.push_str(&format!("    {PADDING_MEMBER}: vec4<f32>,\n"));
        }
        for field in &self.fields {
            out.push_str(&format!("    {}: {},\n", field.name, wgsl_type(field.ty)));
        }
        out.push_str("};\n\n");
        out.push_str(&format!(
            "@group({UNIFORM_GROUP}) @binding(0)\nvar<uniform> uniforms: Uniforms;\n"
        ));
        if textured {
            out.push_str(&format!(
                "\n@group({TEXTURE_GROUP}) @binding(0)\nvar atlas_texture: texture_2d<f32>;\n\
                 @group({TEXTURE_GROUP}) @binding(1)\nvar atlas_sampler: sampler;\n"
            ));
        }
        out
    }
}

/// Writes `value` into `block` at `offset` using the uniform address space
/// layout: matrix columns are padded to 16 bytes.
pub fn write_value(block: &mut [u8], offset: usize, value: &UniformValue) -> bool {
    match value {
        UniformValue::Float(v) => put(block, offset, bytemuck::bytes_of(v)),
        UniformValue::Vec2(v) => put(block, offset, bytemuck::cast_slice(&v.to_array())),
        UniformValue::Vec3(v) => put(block, offset, bytemuck::cast_slice(&v.to_array())),
        UniformValue::Vec4(v) => put(block, offset, bytemuck::cast_slice(&v.to_array())),
        UniformValue::Mat4(m) => put(block, offset, bytemuck::cast_slice(&m.to_cols_array())),
        UniformValue::Mat3(m) => m
            .to_cols_array_2d()
            .iter()
            .enumerate()
            .all(|(i, col)| put(block, offset + i * 16, bytemuck::cast_slice(col))),
        UniformValue::Int(v) => put(block, offset, bytemuck::bytes_of(v)),
    }
}

fn put(block: &mut [u8], at: usize, bytes: &[u8]) -> bool {
    match block.get_mut(at..at + bytes.len()) {
        Some(dst) => {
            dst.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat3, Vec3};
    use glint_ecs::{FragmentShaderSpec, Variation, VertexShaderSpec};

    fn spec(uniforms: &[(&str, UniformType)]) -> ShaderProgramSpec {
        let mut vertex = VertexShaderSpec::new("");
        for (name, ty) in uniforms {
            vertex = vertex.uniform(*name, *ty, Variation::Static);
        }
        ShaderProgramSpec::new("p", vertex, FragmentShaderSpec::new(""))
    }

    #[test]
    fn members_are_aligned() {
        let block = UniformBlock::of(&spec(&[
            ("u_Time", UniformType::Float),
            ("u_Offset", UniformType::Vec3),
            ("u_Scale", UniformType::Float),
            ("u_Projection", UniformType::Mat4),
            ("u_Texture", UniformType::Sampler),
        ]));
        let offsets: Vec<_> = block.fields().iter().map(|f| (f.name.as_str(), f.offset)).collect();
        assert_eq!(
            offsets,
            vec![("u_Time", 0), ("u_Offset", 16), ("u_Scale", 28), ("u_Projection", 32)]
        );
        assert_eq!(block.size(), 96);
    }

    #[test]
    fn empty_block_is_padded() {
        let block = UniformBlock::of(&spec(&[("u_Texture", UniformType::Sampler)]));
        assert!(block.fields().is_empty());
        assert_eq!(block.size(), 16);
        let prelude = block.wgsl_prelude(true);
        assert!(prelude.contains("_padding: vec4<f32>"));
        assert!(prelude.contains("texture_2d<f32>"));
    }

    #[test]
    fn prelude_lists_members_in_order() {
        let block = UniformBlock::of(&spec(&[
            ("u_Projection", UniformType::Mat4),
            ("u_Color", UniformType::Vec4),
        ]));
        let prelude = block.wgsl_prelude(false);
        let p = prelude.find("u_Projection: mat4x4<f32>").unwrap();
        let c = prelude.find("u_Color: vec4<f32>").unwrap();
        assert!(p < c);
        assert!(!prelude.contains("sampler"));
    }

    #[test]
    fn mat3_columns_are_padded() {
        let mut block = vec![0u8; 48];
        let m = Mat3::from_cols(Vec3::X, Vec3::Y, Vec3::Z);
        assert!(write_value(&mut block, 0, &UniformValue::Mat3(m)));
        let floats: Vec<f32> = block
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[4..7], &[0.0, 1.0, 0.0]);
        assert_eq!(floats[3], 0.0);
    }

    #[test]
    fn out_of_range_write_fails() {
        let mut block = vec![0u8; 16];
        assert!(!write_value(&mut block, 8, &UniformValue::Vec4(glam::Vec4::ONE)));
    }
}
