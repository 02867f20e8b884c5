use crate::compile::compile_vertices;
use crate::error::EngineError;
use crate::filter::{FilterCache, FilterKey};
use glint_ecs::{
    ComponentKind, ComponentMask, Entity, EntityCommands, EntityId, Model, Shader, TickContext,
};
use glint_render::{GraphicsBackend, RenderContext, Renderer, RendererConfig, TextureAtlas, Vbo};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A (program, model) bucket. Every entity in one bucket shares a vertex
/// layout and is drawn from one vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub program: String,
    pub model: String,
}

impl PairKey {
    fn of(entity: &Entity) -> Option<Self> {
        let shader = entity.get::<Shader>()?;
        let model = entity.get::<Model>()?;
        Some(Self {
            program: shader.name().to_string(),
            model: model.name.clone(),
        })
    }
}

/// Owns the entities of one domain (world, ui, text, ...) and everything
/// derived from them: renderable buckets, vertex buffers, filter results.
///
/// Additions and removals are staged and only take effect at the next
/// [`tick`](Self::tick), so systems can queue changes while iterating.
/// Renderability is decided when an entity is added.
pub struct EntityManager {
    name: String,
    atlas: Option<TextureAtlas>,
    entities: BTreeMap<EntityId, Entity>,
    order: Vec<EntityId>,
    add_queue: Vec<Entity>,
    remove_queue: Vec<EntityId>,
    renderables: BTreeMap<String, BTreeMap<String, Vec<EntityId>>>,
    placements: BTreeMap<EntityId, PairKey>,
    vbos: BTreeMap<PairKey, Vbo>,
    filters: FilterCache,
    commands: EntityCommands,
}

impl EntityManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            atlas: None,
            entities: BTreeMap::new(),
            order: Vec::new(),
            add_queue: Vec::new(),
            remove_queue: Vec::new(),
            renderables: BTreeMap::new(),
            placements: BTreeMap::new(),
            vbos: BTreeMap::new(),
            filters: FilterCache::default(),
            commands: EntityCommands::default(),
        }
    }

    pub fn with_atlas(mut self, atlas: TextureAtlas) -> Self {
        self.atlas = Some(atlas);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn atlas(&self) -> Option<&TextureAtlas> {
        self.atlas.as_ref()
    }

    // --- Membership ---

    /// Stages `entity` for addition at the next tick.
    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        let id = entity.id();
        self.add_queue.push(entity);
        id
    }

    pub fn add_entities(&mut self, entities: impl IntoIterator<Item = Entity>) {
        self.add_queue.extend(entities);
    }

    /// Stages `id` for removal at the next tick. Ids that are not active by
    /// then are skipped.
    pub fn remove_entity(&mut self, id: EntityId) {
        self.remove_queue.push(id);
    }

    pub fn remove_entities(&mut self, ids: impl IntoIterator<Item = EntityId>) {
        self.remove_queue.extend(ids);
    }

    /// Removes every active entity right away, releasing their vertex buffers.
    /// Staged additions stay staged.
    pub fn clear_entities<B: GraphicsBackend>(&mut self, renderer: &mut Renderer<B>) -> Result<(), EngineError> {
        self.remove_queue.extend(self.order.iter().copied());
        let (touched, changed) = self.apply_removals();
        self.refresh(renderer, touched, changed)?;
        tracing::debug!(manager = %self.name, "entities cleared");
        Ok(())
    }

    /// Applies staged additions then removals, rebuilds the vertex buffers of
    /// every bucket that changed, then ticks each active entity in insertion
    /// order. Spawns and removals requested by behaviors are staged for the
    /// following tick.
    pub fn tick<B: GraphicsBackend>(&mut self, renderer: &mut Renderer<B>, delta_ms: f32) -> Result<(), EngineError> {
        let (mut touched, added) = self.apply_additions();
        let (removed_from, removed) = self.apply_removals();
        touched.extend(removed_from);
        self.refresh(renderer, touched, added || removed)?;

        for id in &self.order {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.tick(&mut TickContext::new(delta_ms, &mut self.commands))?;
            }
        }
        self.add_queue.extend(self.commands.take_spawns());
        self.remove_queue.extend(self.commands.take_removals());
        Ok(())
    }

    fn apply_additions(&mut self) -> (BTreeSet<PairKey>, bool) {
        let mut touched = BTreeSet::new();
        let mut changed = false;
        for entity in std::mem::take(&mut self.add_queue) {
            let id = entity.id();
            if self.entities.contains_key(&id) {
                tracing::warn!(manager = %self.name, entity = %id, "entity already active, addition skipped");
                continue;
            }
            if let Some(key) = PairKey::of(&entity) {
                self.renderables
                    .entry(key.program.clone())
                    .or_default()
                    .entry(key.model.clone())
                    .or_default()
                    .push(id);
                self.placements.insert(id, key.clone());
                touched.insert(key);
            }
            self.order.push(id);
            self.entities.insert(id, entity);
            changed = true;
        }
        (touched, changed)
    }

    fn apply_removals(&mut self) -> (BTreeSet<PairKey>, bool) {
        let mut touched = BTreeSet::new();
        let mut removed = BTreeSet::new();
        for id in std::mem::take(&mut self.remove_queue) {
            if self.entities.remove(&id).is_none() {
                tracing::warn!(manager = %self.name, entity = %id, "entity not active, removal skipped");
                continue;
            }
            removed.insert(id);
            let Some(key) = self.placements.remove(&id) else {
                continue;
            };
            if let Some(models) = self.renderables.get_mut(&key.program) {
                if let Some(ids) = models.get_mut(&key.model) {
                    ids.retain(|e| *e != id);
                    if ids.is_empty() {
                        models.remove(&key.model);
                    }
                }
                if models.is_empty() {
                    self.renderables.remove(&key.program);
                }
            }
            touched.insert(key);
        }
        if !removed.is_empty() {
            self.order.retain(|id| !removed.contains(id));
        }
        (touched, !removed.is_empty())
    }

    fn refresh<B: GraphicsBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        touched: BTreeSet<PairKey>,
        membership_changed: bool,
    ) -> Result<(), EngineError> {
        if membership_changed {
            self.filters.invalidate();
        }
        for key in touched {
            self.compile_pair(renderer, key)?;
        }
        Ok(())
    }

    /// Rebuilds the vertex buffer of one bucket, or deletes it once the
    /// bucket is empty.
    fn compile_pair<B: GraphicsBackend>(&mut self, renderer: &mut Renderer<B>, key: PairKey) -> Result<(), EngineError> {
        const CONTEXT: &str = "EntityManager::compile_pair";
        let name = self.vbo_name(&key);
        let members: Vec<&Entity> = self
            .renderables
            .get(&key.program)
            .and_then(|models| models.get(&key.model))
            .map(|ids| ids.iter().filter_map(|id| self.entities.get(id)).collect())
            .unwrap_or_default();

        let Some(first) = members.first() else {
            if self.vbos.remove(&key).is_some() {
                renderer.delete_vbo(&name)?;
            }
            return Ok(());
        };

        let program = Arc::clone(&first.require::<Shader>(CONTEXT)?.program);
        let geometry = Arc::clone(&first.require::<Model>(CONTEXT)?.geometry);
        let vertex_count = geometry.vertex_count();
        let data = compile_vertices(
            renderer.resolver(),
            self.atlas.as_ref(),
            &program,
            vertex_count,
            &members,
        )?;
        let entity_count = members.len();

        if !self.vbos.contains_key(&key) {
            renderer.create_vbo(&name)?;
        }
        tracing::debug!(
            manager = %self.name,
            vbo = %name,
            entities = entity_count,
            floats = data.len(),
            "vertex buffer compiled"
        );
        let vbo = Vbo::new(name, data, program.vertex_size(), vertex_count, geometry.draw_mode());
        self.vbos.insert(key, vbo);
        Ok(())
    }

    fn vbo_name(&self, key: &PairKey) -> String {
        format!("{}_{}_{}", self.name, key.program, key.model)
    }

    /// Issues one renderer call per non-empty bucket, then marks every vertex
    /// buffer as uploaded.
    pub fn render<B: GraphicsBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        ctx: &RenderContext,
    ) -> Result<(), EngineError> {
        for (program, models) in &self.renderables {
            let textured = renderer
                .program_spec(program)
                .is_some_and(|spec| spec.uses_sampler() || spec.uses_texture_coordinates());
            let texture_atlas_name = self.atlas.as_ref().filter(|_| textured).map(TextureAtlas::name);

            for (model, ids) in models {
                let key = PairKey {
                    program: program.clone(),
                    model: model.clone(),
                };
                let Some(vbo) = self.vbos.get(&key) else {
                    continue;
                };
                let entities: Vec<&Entity> = ids.iter().filter_map(|id| self.entities.get(id)).collect();
                if entities.is_empty() {
                    continue;
                }
                renderer.render(
                    &RendererConfig {
                        vbo,
                        shader_program_name: program,
                        texture_atlas_name,
                        entities: &entities,
                    },
                    ctx,
                )?;
            }
        }
        for vbo in self.vbos.values_mut() {
            vbo.changed = false;
        }
        Ok(())
    }

    // --- Queries ---

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn pending_additions(&self) -> usize {
        self.add_queue.len()
    }

    pub fn pending_removals(&self) -> usize {
        self.remove_queue.len()
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Mutable access to an active entity. Component changes made here do
    /// not move the entity between buckets or invalidate cached filters.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Active entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// `(program, model, entities)` for every non-empty bucket.
    pub fn buckets(&self) -> impl Iterator<Item = (&str, &str, &[EntityId])> {
        self.renderables.iter().flat_map(|(program, models)| {
            models
                .iter()
                .map(move |(model, ids)| (program.as_str(), model.as_str(), ids.as_slice()))
        })
    }

    pub fn vbo(&self, program: &str, model: &str) -> Option<&Vbo> {
        self.vbos.get(&PairKey {
            program: program.to_string(),
            model: model.to_string(),
        })
    }

    pub fn vbos(&self) -> impl Iterator<Item = &Vbo> {
        self.vbos.values()
    }

    // --- Filters ---

    pub fn filter_by_component(&mut self, kind: ComponentKind) -> Arc<[EntityId]> {
        self.filter_by_components(&[kind])
    }

    /// Active entities holding every kind in `kinds`, in insertion order.
    pub fn filter_by_components(&mut self, kinds: &[ComponentKind]) -> Arc<[EntityId]> {
        let mask = ComponentMask::of(kinds);
        let (entities, order) = (&self.entities, &self.order);
        self.filters
            .get_or_insert_with(FilterKey::Components(kinds.to_vec()), || {
                select_by_mask(entities, order, mask)
            })
    }

    pub fn filter_by_tag(&mut self, tag: &str) -> Arc<[EntityId]> {
        self.filter_by_tags(&[tag])
    }

    /// Active entities whose tag is any of `tags`, in insertion order.
    pub fn filter_by_tags(&mut self, tags: &[&str]) -> Arc<[EntityId]> {
        let (entities, order) = (&self.entities, &self.order);
        self.filters.get_or_insert_with(tag_key(tags), || {
            select_by_tags(entities, order, tags)
        })
    }

    /// Like [`filter_by_components`](Self::filter_by_components) but over
    /// `source` only, cached under `filter_id`.
    pub fn filter_by_components_from(
        &mut self,
        source: &[EntityId],
        filter_id: &str,
        kinds: &[ComponentKind],
    ) -> Arc<[EntityId]> {
        let mask = ComponentMask::of(kinds);
        let entities = &self.entities;
        self.filters.get_or_insert_scoped_with(
            filter_id,
            FilterKey::Components(kinds.to_vec()),
            || select_by_mask(entities, source, mask),
        )
    }

    pub fn filter_by_tags_from(&mut self, source: &[EntityId], filter_id: &str, tags: &[&str]) -> Arc<[EntityId]> {
        let entities = &self.entities;
        self.filters
            .get_or_insert_scoped_with(filter_id, tag_key(tags), || {
                select_by_tags(entities, source, tags)
            })
    }

    pub fn cached_filters(&self) -> usize {
        self.filters.len()
    }

    pub fn filter_stats(&self) -> (u64, u64) {
        (self.filters.hits(), self.filters.misses())
    }

    pub fn invalidate_filters(&mut self) {
        self.filters.invalidate();
    }
}

fn tag_key(tags: &[&str]) -> FilterKey {
    FilterKey::Tags(tags.iter().map(|t| t.to_string()).collect())
}

fn select_by_mask(entities: &BTreeMap<EntityId, Entity>, ids: &[EntityId], mask: ComponentMask) -> Vec<EntityId> {
    ids.iter()
        .filter(|id| entities.get(id).is_some_and(|e| e.mask().contains_all(mask)))
        .copied()
        .collect()
}

fn select_by_tags(entities: &BTreeMap<EntityId, Entity>, ids: &[EntityId], tags: &[&str]) -> Vec<EntityId> {
    ids.iter()
        .filter(|id| entities.get(id).is_some_and(|e| tags.iter().any(|t| *t == e.tag())))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};
    use glint_ecs::{
        EcsError, FlatColor, FragmentShaderSpec, Geometry, ShaderProgramSpec, Texture, Transform,
        UniformType, Variation, VertexShaderSpec,
    };
    use glint_render::{HeadlessBackend, RenderError, ShaderVariableResolver, UniformValue};

    fn basic(entity_color: bool) -> Arc<ShaderProgramSpec> {
        let mut vertex = VertexShaderSpec::new("vs").attribute("a_Position", 2);
        if entity_color {
            vertex = vertex.uniform("u_Color", UniformType::Vec4, Variation::Entity);
        }
        Arc::new(ShaderProgramSpec::new("basic", vertex, FragmentShaderSpec::new("fs")))
    }

    fn textured() -> Arc<ShaderProgramSpec> {
        Arc::new(ShaderProgramSpec::new(
            "textured",
            VertexShaderSpec::new("vs")
                .attribute("a_Position", 2)
                .attribute("a_TexCoord", 2),
            FragmentShaderSpec::new("fs"),
        ))
    }

    fn setup(programs: &[&Arc<ShaderProgramSpec>]) -> Renderer<HeadlessBackend> {
        let mut renderer = Renderer::new(HeadlessBackend::new(), ShaderVariableResolver::with_builtins());
        for p in programs {
            renderer.create_shader_program(Arc::clone(p)).unwrap();
        }
        renderer
    }

    fn sprite(tag: &str, program: &Arc<ShaderProgramSpec>, model: &str, color: Vec4) -> Entity {
        Entity::new(
            tag,
            [
                Model::new(model, Geometry::square()).into(),
                Shader::new(Arc::clone(program)).into(),
                Transform::default().into(),
                FlatColor(color).into(),
            ],
        )
    }

    #[test]
    fn batches_three_squares_into_one_draw() {
        let program = basic(false);
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        for i in 0..3 {
            world.add_entity(sprite(&format!("s{i}"), &program, "square", Vec4::ONE));
        }
        world.tick(&mut renderer, 16.0).unwrap();

        let vbo = world.vbo("basic", "square").unwrap();
        assert_eq!(vbo.name, "world_basic_square");
        assert_eq!(vbo.data.len(), 24);
        assert!(renderer.has_vbo("world_basic_square"));

        world.render(&mut renderer, &RenderContext::default()).unwrap();
        assert_eq!(
            renderer.backend().draw_calls(),
            vec![(glint_ecs::DrawMode::TriangleStrip, 0, 12)]
        );
    }

    #[test]
    fn entity_uniforms_draw_each_entity() {
        let program = basic(true);
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        let colors: Vec<Vec4> = (0..3).map(|i| Vec4::new(i as f32, 1.0, 0.0, 1.0)).collect();
        for (i, c) in colors.iter().enumerate() {
            world.add_entity(sprite(&format!("s{i}"), &program, "square", *c));
        }
        world.tick(&mut renderer, 16.0).unwrap();
        world.render(&mut renderer, &RenderContext::default()).unwrap();

        let draws = renderer.backend().draw_calls();
        assert_eq!(draws.len(), 3);
        assert!(draws.iter().all(|(_, _, count)| *count == 4));
        let uploads = renderer.backend().uniform_uploads("u_Color");
        let expected: Vec<_> = colors.into_iter().map(UniformValue::Vec4).collect();
        assert_eq!(uploads, expected);
    }

    #[test]
    fn buckets_follow_program_and_model() {
        let flat = basic(false);
        let mut renderer = setup(&[&flat]);
        let mut world = EntityManager::new("world");
        let a = world.add_entity(sprite("a", &flat, "square", Vec4::ONE));
        let b = world.add_entity(sprite("b", &flat, "tile", Vec4::ONE));
        let c = world.add_entity(sprite("c", &flat, "square", Vec4::ONE));
        let plain = world.add_entity(Entity::new("plain", [Transform::default().into()]));
        world.tick(&mut renderer, 16.0).unwrap();

        let buckets: Vec<_> = world
            .buckets()
            .map(|(p, m, ids)| (p.to_string(), m.to_string(), ids.to_vec()))
            .collect();
        assert_eq!(
            buckets,
            vec![
                ("basic".to_string(), "square".to_string(), vec![a, c]),
                ("basic".to_string(), "tile".to_string(), vec![b]),
            ]
        );
        assert!(world.contains(plain));
        assert_eq!(world.len(), 4);

        world.remove_entity(b);
        world.tick(&mut renderer, 16.0).unwrap();
        assert_eq!(world.buckets().count(), 1);
        assert!(world.vbo("basic", "tile").is_none());
        assert!(!renderer.has_vbo("world_basic_tile"));
    }

    #[test]
    fn changes_are_deferred_until_tick() {
        let program = basic(false);
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        let id = world.add_entity(sprite("a", &program, "square", Vec4::ONE));
        assert!(world.is_empty());
        assert_eq!(world.pending_additions(), 1);
        assert!(world.vbo("basic", "square").is_none());

        world.tick(&mut renderer, 16.0).unwrap();
        assert!(world.contains(id));

        world.remove_entity(id);
        assert!(world.contains(id));
        world.tick(&mut renderer, 16.0).unwrap();
        assert!(!world.contains(id));
        assert!(world.vbo("basic", "square").is_none());
    }

    #[test]
    fn double_removal_is_skipped() {
        let program = basic(false);
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        let id = world.add_entity(sprite("a", &program, "square", Vec4::ONE));
        world.tick(&mut renderer, 16.0).unwrap();

        world.remove_entities([id, id, EntityId::new()]);
        world.tick(&mut renderer, 16.0).unwrap();
        assert!(world.is_empty());
        assert_eq!(world.pending_removals(), 0);
    }

    #[test]
    fn unchanged_buffers_upload_once() {
        let program = basic(false);
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        world.add_entity(sprite("a", &program, "square", Vec4::ONE));
        world.tick(&mut renderer, 16.0).unwrap();

        for _ in 0..3 {
            world.render(&mut renderer, &RenderContext::default()).unwrap();
            world.tick(&mut renderer, 16.0).unwrap();
        }
        assert_eq!(renderer.backend().buffer_uploads(), 1);
        assert!(!world.vbo("basic", "square").unwrap().changed);

        world.add_entity(sprite("b", &program, "square", Vec4::ONE));
        world.tick(&mut renderer, 16.0).unwrap();
        assert!(world.vbo("basic", "square").unwrap().changed);
        world.render(&mut renderer, &RenderContext::default()).unwrap();
        assert_eq!(renderer.backend().buffer_uploads(), 2);
    }

    #[test]
    fn filters_are_cached_until_membership_changes() {
        let program = basic(false);
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        let a = world.add_entity(sprite("enemy", &program, "square", Vec4::ONE));
        let b = world.add_entity(Entity::new("enemy", [Transform::default().into()]));
        world.add_entity(Entity::new("ally", []));
        world.tick(&mut renderer, 16.0).unwrap();

        let first = world.filter_by_components(&[ComponentKind::Transform, ComponentKind::Model]);
        let second = world.filter_by_components(&[ComponentKind::Transform, ComponentKind::Model]);
        assert_eq!(&*first, &[a]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&*world.filter_by_tag("enemy"), &[a, b]);
        assert_eq!(world.filter_by_tags(&["ally", "enemy"]).len(), 3);

        let c = world.add_entity(sprite("enemy", &program, "square", Vec4::ONE));
        // Still cached until the staged addition is applied.
        assert_eq!(world.filter_by_tag("enemy").len(), 2);
        world.tick(&mut renderer, 16.0).unwrap();
        assert_eq!(&*world.filter_by_tag("enemy"), &[a, b, c]);
        let third = world.filter_by_components(&[ComponentKind::Transform, ComponentKind::Model]);
        assert_eq!(&*third, &[a, c]);
    }

    #[test]
    fn scoped_filters_use_their_source() {
        let program = basic(false);
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        let a = world.add_entity(sprite("enemy", &program, "square", Vec4::ONE));
        let b = world.add_entity(sprite("enemy", &program, "square", Vec4::ONE));
        world.tick(&mut renderer, 16.0).unwrap();

        let scoped = world.filter_by_tags_from(&[b], "picked", &["enemy"]);
        assert_eq!(&*scoped, &[b]);
        let global = world.filter_by_tags(&["enemy"]);
        assert_eq!(&*global, &[a, b]);
        let scoped_components =
            world.filter_by_components_from(&[a], "picked", &[ComponentKind::Shader]);
        assert_eq!(&*scoped_components, &[a]);
        assert_eq!(world.cached_filters(), 3);
    }

    #[test]
    fn textured_program_without_atlas_fails_at_tick() {
        let program = textured();
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        let mut e = sprite("tile", &program, "square", Vec4::ONE);
        e.add_component(Texture::cell(0, 0));
        world.add_entity(e);
        assert!(matches!(
            world.tick(&mut renderer, 16.0),
            Err(EngineError::Render(RenderError::MissingTextureAtlas { .. }))
        ));
    }

    #[test]
    fn textured_program_binds_manager_atlas() {
        let program = textured();
        let mut renderer = setup(&[&program]);
        let atlas = TextureAtlas::from_rgba("tiles", 4, 4, vec![0u8; 64], 2, 2).unwrap();
        renderer.create_texture(&atlas).unwrap();
        let mut world = EntityManager::new("world").with_atlas(atlas);
        let mut e = sprite("tile", &program, "square", Vec4::ONE);
        e.add_component(Texture::cell(1, 0));
        world.add_entity(e);

        world.tick(&mut renderer, 16.0).unwrap();
        world.render(&mut renderer, &RenderContext::default()).unwrap();
        assert_eq!(renderer.stats().texture_switches, 1);
        assert_eq!(world.vbo("textured", "square").unwrap().data.len(), 16);
    }

    #[test]
    fn clear_entities_releases_buffers() {
        let program = basic(false);
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        world.add_entity(sprite("a", &program, "square", Vec4::ONE));
        world.tick(&mut renderer, 16.0).unwrap();
        world.add_entity(sprite("b", &program, "square", Vec4::ONE));

        world.clear_entities(&mut renderer).unwrap();
        assert!(world.is_empty());
        assert_eq!(world.vbos().count(), 0);
        assert_eq!(renderer.backend().live_buffers(), 0);
        assert_eq!(world.pending_additions(), 1);
    }

    struct Spawner {
        remaining: usize,
    }

    impl glint_ecs::Behavior for Spawner {
        fn tick(&mut self, entity: &mut Entity, ctx: &mut TickContext<'_>) -> Result<(), EcsError> {
            if self.remaining > 0 {
                self.remaining -= 1;
                ctx.spawn(Entity::new("spawned", [Transform::default().into()]));
            } else {
                ctx.remove(entity.id());
            }
            Ok(())
        }
    }

    #[test]
    fn behavior_commands_apply_next_tick() {
        let program = basic(false);
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        let spawner = world.add_entity(Entity::new("spawner", []).with_behavior(Spawner { remaining: 1 }));

        world.tick(&mut renderer, 16.0).unwrap();
        assert_eq!(world.len(), 1);
        assert_eq!(world.pending_additions(), 1);

        world.tick(&mut renderer, 16.0).unwrap();
        assert_eq!(world.len(), 2);
        assert_eq!(world.pending_removals(), 1);

        world.tick(&mut renderer, 16.0).unwrap();
        assert!(!world.contains(spawner));
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn entity_mut_edits_in_place() {
        let program = basic(false);
        let mut renderer = setup(&[&program]);
        let mut world = EntityManager::new("world");
        let id = world.add_entity(sprite("a", &program, "square", Vec4::ONE));
        world.tick(&mut renderer, 16.0).unwrap();
        world
            .entity_mut(id)
            .and_then(|e| e.get_mut::<Transform>())
            .unwrap()
            .position = Vec3::X;
        assert_eq!(world.entity(id).unwrap().get::<Transform>().unwrap().position, Vec3::X);
        assert_eq!(world.entities().count(), 1);
    }
}
