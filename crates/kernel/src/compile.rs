use glam::Vec2;
use glint_ecs::{
    Entity, ShaderProgramSpec, TEX_COORD_VARIABLE, Texture, normalize_variable_name,
};
use glint_render::{RenderError, ShaderVariableResolver, TextureAtlas};

const CONTEXT: &str = "EntityManager::compile_vertices";

/// Builds the interleaved vertex data for `entities`, all drawn with
/// `program` and sharing a model of `vertex_count` vertices.
///
/// Each attribute is resolved once per entity. A value of exactly `size`
/// floats is repeated on every vertex; a value of `size * vertex_count`
/// floats is sliced per vertex. Texture coordinates are remapped through the
/// atlas using the entity's [`Texture`] cell.
pub fn compile_vertices(
    resolver: &ShaderVariableResolver,
    atlas: Option<&TextureAtlas>,
    program: &ShaderProgramSpec,
    vertex_count: usize,
    entities: &[&Entity],
) -> Result<Vec<f32>, RenderError> {
    let vertex_size = program.vertex_size();
    let stride = vertex_count * vertex_size;
    let mut data = vec![0.0f32; entities.len() * stride];

    if program.uses_texture_coordinates() && atlas.is_none() {
        return Err(RenderError::MissingTextureAtlas {
            context: CONTEXT,
            program: program.name.clone(),
        });
    }

    for (e, entity) in entities.iter().enumerate() {
        let base = e * stride;
        let mut offset = 0;
        for attribute in &program.vertex.attributes {
            let size = attribute.size;
            let value = resolver.resolve_attribute(&attribute.name, entity)?;
            let floats = value.as_floats();

            let per_vertex = match floats.len() {
                n if n == size || n == 1 => false,
                n if n == size * vertex_count => true,
                found => {
                    return Err(RenderError::AttributeSizeMismatch {
                        context: CONTEXT,
                        variable: attribute.name.clone(),
                        expected: size,
                        per_vertex: size * vertex_count,
                        found,
                    });
                }
            };

            let tex_cell = if normalize_variable_name(&attribute.name) == TEX_COORD_VARIABLE {
                if size != 2 {
                    return Err(RenderError::AttributeSizeMismatch {
                        context: CONTEXT,
                        variable: attribute.name.clone(),
                        expected: 2,
                        per_vertex: 2 * vertex_count,
                        found: size,
                    });
                }
                Some(*entity.require::<Texture>(CONTEXT)?)
            } else {
                None
            };

            for v in 0..vertex_count {
                let at = base + v * vertex_size + offset;
                let out = &mut data[at..at + size];
                let src: &[f32] = if per_vertex {
                    &floats[v * size..(v + 1) * size]
                } else {
                    &floats
                };
                match (tex_cell, atlas) {
                    (Some(cell), Some(atlas)) => {
                        let uv = match src {
                            [u, w, ..] => Vec2::new(*u, *w),
                            _ => Vec2::splat(src[0]),
                        };
                        let uv = atlas.resolve_for(&cell, uv);
                        out.copy_from_slice(&uv.to_array());
                    }
                    _ if src.len() == 1 => out.fill(src[0]),
                    _ => out.copy_from_slice(src),
                }
            }
            offset += size;
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};
    use glint_ecs::{
        FlatColor, FragmentShaderSpec, Geometry, Model, MultiColor, Transform, VertexShaderSpec,
    };
    use glint_render::ShaderValue;

    fn program(attributes: &[(&str, usize)]) -> ShaderProgramSpec {
        let mut vertex = VertexShaderSpec::new("vs");
        for (name, size) in attributes {
            vertex = vertex.attribute(*name, *size);
        }
        ShaderProgramSpec::new("p", vertex, FragmentShaderSpec::new("fs"))
    }

    fn square(tag: &str, color: Vec4) -> Entity {
        Entity::new(
            tag,
            [
                Model::new("square", Geometry::square()).into(),
                FlatColor(color).into(),
                Transform::default().into(),
            ],
        )
    }

    #[test]
    fn interleaves_constant_and_per_vertex_values() {
        let resolver = ShaderVariableResolver::with_builtins();
        let spec = program(&[("a_Position", 2), ("a_Color", 4)]);
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        let a = square("a", red);
        let data = compile_vertices(&resolver, None, &spec, 4, &[&a]).unwrap();

        assert_eq!(data.len(), 4 * 6);
        // Vertex 1: position (1, -1), then the flat color.
        assert_eq!(&data[6..12], &[1.0, -1.0, 1.0, 0.0, 0.0, 1.0]);
        for v in 0..4 {
            assert_eq!(&data[v * 6 + 2..v * 6 + 6], &red.to_array());
        }
    }

    #[test]
    fn entities_are_laid_out_back_to_back() {
        let resolver = ShaderVariableResolver::with_builtins();
        let spec = program(&[("a_WorldPosition", 2)]);
        let a = square("a", Vec4::ONE);
        let mut b = square("b", Vec4::ONE);
        b.add_component(Transform::from_position(Vec3::new(10.0, 0.0, 0.0)));

        let data = compile_vertices(&resolver, None, &spec, 4, &[&a, &b]).unwrap();
        assert_eq!(data.len(), 16);
        assert_eq!(&data[0..2], &[-1.0, -1.0]);
        assert_eq!(&data[8..10], &[9.0, -1.0]);
    }

    #[test]
    fn per_vertex_colors() {
        let resolver = ShaderVariableResolver::with_builtins();
        let spec = program(&[("a_Color", 4)]);
        let colors: Vec<Vec4> = (0..4).map(|i| Vec4::splat(i as f32)).collect();
        let e = Entity::new(
            "rainbow",
            [
                Model::new("square", Geometry::square()).into(),
                MultiColor::new(colors).into(),
            ],
        );
        let data = compile_vertices(&resolver, None, &spec, 4, &[&e]).unwrap();
        assert_eq!(&data[12..16], &[3.0; 4]);
    }

    #[test]
    fn scalar_fills_attribute() {
        let mut resolver = ShaderVariableResolver::new();
        resolver
            .register_entity("a_Weight", |_| Ok(ShaderValue::Scalar(0.5)))
            .unwrap();
        let spec = program(&[("a_Weight", 3)]);
        let e = square("a", Vec4::ONE);
        let data = compile_vertices(&resolver, None, &spec, 4, &[&e]).unwrap();
        assert!(data.iter().all(|v| *v == 0.5));
    }

    #[test]
    fn wrong_length_is_a_mismatch() {
        let resolver = ShaderVariableResolver::with_builtins();
        let spec = program(&[("a_Position", 3)]);
        let e = square("a", Vec4::ONE);
        assert!(matches!(
            compile_vertices(&resolver, None, &spec, 4, &[&e]),
            Err(RenderError::AttributeSizeMismatch { found: 8, .. })
        ));
    }

    #[test]
    fn tex_coords_go_through_atlas() {
        let resolver = ShaderVariableResolver::with_builtins();
        let spec = program(&[("a_Position", 2), ("a_TexCoord", 2)]);
        let atlas = TextureAtlas::from_rgba("tiles", 4, 4, vec![0u8; 64], 2, 2).unwrap();
        let mut e = square("a", Vec4::ONE);
        e.add_component(Texture::cell(1, 1));

        let data = compile_vertices(&resolver, Some(&atlas), &spec, 4, &[&e]).unwrap();
        // Vertex 2 has uv (0, 1): top-left of cell (1, 1).
        let expected = atlas.resolve_texture_coordinates(Vec2::new(0.0, 1.0), 1, 1, 1, 1);
        assert_eq!(&data[2 * 4 + 2..2 * 4 + 4], &expected.to_array());
        assert!((expected.x - (0.5 + 0.125)).abs() < 1e-6);
    }

    #[test]
    fn tex_coords_need_atlas_and_cell() {
        let resolver = ShaderVariableResolver::with_builtins();
        let spec = program(&[("a_Position", 2), ("a_TexCoord", 2)]);
        let e = square("plain", Vec4::ONE);
        assert!(matches!(
            compile_vertices(&resolver, None, &spec, 4, &[&e]),
            Err(RenderError::MissingTextureAtlas { .. })
        ));

        let atlas = TextureAtlas::from_rgba("tiles", 4, 4, vec![0u8; 64], 2, 2).unwrap();
        let err = compile_vertices(&resolver, Some(&atlas), &spec, 4, &[&e]).unwrap_err();
        assert!(err.to_string().contains("plain"));
    }
}
