use crate::error::RenderError;
use crate::value::{RenderContext, ShaderValue, UniformValue};
use glam::{Vec2, Vec3};
use glint_ecs::{
    ComponentKind, EcsError, Entity, FlatColor, Model, MultiColor, Transform, UniformType,
    normalize_variable_name,
};
use std::collections::BTreeMap;

type StaticResolver = Box<dyn Fn(&RenderContext) -> Result<UniformValue, RenderError>>;
type EntityResolver = Box<dyn for<'e> Fn(&'e Entity) -> Result<ShaderValue<'e>, RenderError>>;

/// Maps shader variable names to the functions that produce their values.
///
/// Two registries are kept apart: static variables read render-global state
/// once per draw call, entity variables read one entity and feed both vertex
/// attributes and per-entity uniforms. Keys are normalized names, so
/// `a_Color` and `u_Color` both resolve through `Color`.
#[derive(Default)]
pub struct ShaderVariableResolver {
    statics: BTreeMap<String, StaticResolver>,
    entities: BTreeMap<String, EntityResolver>,
}

impl ShaderVariableResolver {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the engine's standard variables.
    pub fn with_builtins() -> Self {
        let mut resolver = Self::new();
        let entity: [(&str, fn(&Entity) -> Result<ShaderValue<'_>, RenderError>); 5] = [
            ("Position", model_position),
            ("WorldPosition", world_position),
            ("TexCoord", tex_coord),
            ("Color", color),
            ("Transform", transform),
        ];
        for (name, f) in entity {
            resolver.entities.insert(name.to_string(), Box::new(f));
        }
        let statics: [(&str, fn(&RenderContext) -> Result<UniformValue, RenderError>); 5] = [
            ("Projection", |ctx| Ok(UniformValue::Mat4(ctx.projection))),
            ("View", |ctx| Ok(UniformValue::Mat4(ctx.view))),
            ("Texture", texture_unit),
            ("Time", |ctx| Ok(UniformValue::Float(ctx.elapsed_ms / 1000.0))),
            ("Resolution", |ctx| {
                Ok(UniformValue::Vec2(Vec2::new(
                    ctx.viewport.width as f32,
                    ctx.viewport.height as f32,
                )))
            }),
        ];
        for (name, f) in statics {
            resolver.statics.insert(name.to_string(), Box::new(f));
        }
        resolver
    }

    pub fn register_static<F>(&mut self, name: &str, f: F) -> Result<(), RenderError>
    where
        F: Fn(&RenderContext) -> Result<UniformValue, RenderError> + 'static,
    {
        let key = normalize_variable_name(name);
        if self.statics.contains_key(key) {
            return Err(RenderError::VariableAlreadyRegistered(key.to_string()));
        }
        self.statics.insert(key.to_string(), Box::new(f));
        Ok(())
    }

    pub fn register_entity<F>(&mut self, name: &str, f: F) -> Result<(), RenderError>
    where
        F: for<'e> Fn(&'e Entity) -> Result<ShaderValue<'e>, RenderError> + 'static,
    {
        let key = normalize_variable_name(name);
        if self.entities.contains_key(key) {
            return Err(RenderError::VariableAlreadyRegistered(key.to_string()));
        }
        self.entities.insert(key.to_string(), Box::new(f));
        Ok(())
    }

    pub fn override_static<F>(&mut self, name: &str, f: F) -> Result<(), RenderError>
    where
        F: Fn(&RenderContext) -> Result<UniformValue, RenderError> + 'static,
    {
        let key = normalize_variable_name(name);
        let slot = self
            .statics
            .get_mut(key)
            .ok_or_else(|| RenderError::VariableNotRegistered(key.to_string()))?;
        *slot = Box::new(f);
        Ok(())
    }

    pub fn override_entity<F>(&mut self, name: &str, f: F) -> Result<(), RenderError>
    where
        F: for<'e> Fn(&'e Entity) -> Result<ShaderValue<'e>, RenderError> + 'static,
    {
        let key = normalize_variable_name(name);
        let slot = self
            .entities
            .get_mut(key)
            .ok_or_else(|| RenderError::VariableNotRegistered(key.to_string()))?;
        *slot = Box::new(f);
        Ok(())
    }

    pub fn has_static(&self, name: &str) -> bool {
        self.statics.contains_key(normalize_variable_name(name))
    }

    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.contains_key(normalize_variable_name(name))
    }

    pub fn resolve_attribute<'e>(&self, name: &str, entity: &'e Entity) -> Result<ShaderValue<'e>, RenderError> {
        let f = self.entity_resolver("ShaderVariableResolver::resolve_attribute", name)?;
        f(entity)
    }

    pub fn resolve_static_uniform(
        &self,
        name: &str,
        ctx: &RenderContext,
        ty: UniformType,
    ) -> Result<UniformValue, RenderError> {
        let f = self
            .statics
            .get(normalize_variable_name(name))
            .ok_or_else(|| RenderError::UnknownVariable {
                context: "ShaderVariableResolver::resolve_static_uniform",
                name: name.to_string(),
            })?;
        let value = f(ctx)?;
        if !value.fits(ty) {
            return Err(RenderError::UniformTypeMismatch {
                context: "ShaderVariableResolver::resolve_static_uniform",
                variable: name.to_string(),
                expected: ty,
                found: format!("{:?}", value.ty()),
            });
        }
        Ok(value)
    }

    pub fn resolve_entity_uniform(
        &self,
        name: &str,
        entity: &Entity,
        ty: UniformType,
    ) -> Result<UniformValue, RenderError> {
        const CONTEXT: &str = "ShaderVariableResolver::resolve_entity_uniform";
        let f = self.entity_resolver(CONTEXT, name)?;
        let resolved = f(entity)?;
        let value = match &resolved {
            ShaderValue::Uniform(value) if value.fits(ty) => Some(*value),
            ShaderValue::Uniform(_) => None,
            other => UniformValue::from_floats(ty, &other.as_floats()),
        };
        value.ok_or_else(|| RenderError::UniformTypeMismatch {
            context: CONTEXT,
            variable: name.to_string(),
            expected: ty,
            found: describe(&resolved),
        })
    }

    fn entity_resolver(&self, context: &'static str, name: &str) -> Result<&EntityResolver, RenderError> {
        self.entities
            .get(normalize_variable_name(name))
            .ok_or_else(|| RenderError::UnknownVariable {
                context,
                name: name.to_string(),
            })
    }
}

fn describe(value: &ShaderValue<'_>) -> String {
    match value {
        ShaderValue::Scalar(_) => "a scalar".to_string(),
        ShaderValue::Floats(floats) => format!("{} floats", floats.len()),
        ShaderValue::Uniform(v) => format!("{:?}", v.ty()),
    }
}

fn model_position(entity: &Entity) -> Result<ShaderValue<'_>, RenderError> {
    let model = entity.require::<Model>("resolve Position")?;
    Ok(ShaderValue::borrowed(model.geometry.vertices()))
}

/// Geometry positions with the entity's transform applied on the CPU, for
/// batched programs that draw without a per-entity transform.
fn world_position(entity: &Entity) -> Result<ShaderValue<'_>, RenderError> {
    let model = entity.require::<Model>("resolve WorldPosition")?;
    let Some(transform) = entity.get::<Transform>() else {
        return Ok(ShaderValue::borrowed(model.geometry.vertices()));
    };
    let matrix = transform.matrix();
    let size = model.geometry.vertex_size();
    let mut out = Vec::with_capacity(model.geometry.vertices().len());
    for vertex in model.geometry.vertices().chunks_exact(size) {
        let mut p = Vec3::ZERO;
        for (i, v) in vertex.iter().take(3).enumerate() {
            p[i] = *v;
        }
        let world = matrix.transform_point3(p);
        out.extend_from_slice(&world.to_array()[..size.min(3)]);
        out.extend(vertex.iter().skip(3));
    }
    Ok(ShaderValue::owned(out))
}

fn tex_coord(entity: &Entity) -> Result<ShaderValue<'_>, RenderError> {
    let model = entity.require::<Model>("resolve TexCoord")?;
    model
        .geometry
        .tex_coords()
        .map(ShaderValue::borrowed)
        .ok_or_else(|| RenderError::MissingTextureCoordinates {
            context: "ShaderVariableResolver::resolve_attribute",
            variable: "TexCoord".to_string(),
            tag: entity.tag().to_string(),
        })
}

/// A flat color is one vec4 for the whole entity; a multi color is one vec4
/// per vertex.
fn color(entity: &Entity) -> Result<ShaderValue<'_>, RenderError> {
    if let Some(flat) = entity.get::<FlatColor>() {
        return Ok(ShaderValue::owned(flat.0.to_array().to_vec()));
    }
    if let Some(multi) = entity.get::<MultiColor>() {
        let floats = multi.colors().iter().flat_map(|c| c.to_array()).collect();
        return Ok(ShaderValue::owned(floats));
    }
    Err(EcsError::MissingComponent {
        context: "resolve Color",
        kind: ComponentKind::FlatColor,
        tag: entity.tag().to_string(),
    }
    .into())
}

fn transform(entity: &Entity) -> Result<ShaderValue<'_>, RenderError> {
    let transform = entity.require::<Transform>("resolve Transform")?;
    Ok(ShaderValue::Uniform(UniformValue::Mat4(transform.matrix())))
}

fn texture_unit(ctx: &RenderContext) -> Result<UniformValue, RenderError> {
    ctx.texture_unit
        .map(|unit| UniformValue::Int(unit as i32))
        .ok_or(RenderError::MissingTextureAtlas {
            context: "resolve Texture",
            program: "(no texture bound)".to_string(),
        })
}
