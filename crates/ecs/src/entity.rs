use crate::component::{Component, ComponentData, ComponentKind, ComponentMask};
use crate::error::EcsError;
use glint_common::EntityId;
use std::fmt;

/// Per-entity logic run once per tick by the owning manager.
pub trait Behavior {
    fn tick(&mut self, entity: &mut Entity, ctx: &mut TickContext<'_>) -> Result<(), EcsError>;
}

/// Spawns and removals requested during a tick. The manager moves them into
/// its staged queues once every entity has ticked.
#[derive(Default)]
pub struct EntityCommands {
    spawns: Vec<Entity>,
    removals: Vec<EntityId>,
}

impl EntityCommands {
    pub fn spawn(&mut self, entity: Entity) {
        self.spawns.push(entity);
    }

    pub fn remove(&mut self, id: EntityId) {
        self.removals.push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty() && self.removals.is_empty()
    }

    pub fn take_spawns(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.spawns)
    }

    pub fn take_removals(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.removals)
    }
}

pub struct TickContext<'a> {
    pub delta_ms: f32,
    commands: &'a mut EntityCommands,
}

impl<'a> TickContext<'a> {
    pub fn new(delta_ms: f32, commands: &'a mut EntityCommands) -> Self {
        Self { delta_ms, commands }
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta_ms / 1000.0
    }

    pub fn spawn(&mut self, entity: Entity) {
        self.commands.spawn(entity);
    }

    pub fn remove(&mut self, id: EntityId) {
        self.commands.remove(id);
    }
}

/// A bag of components with an identity and a classification tag.
pub struct Entity {
    id: EntityId,
    tag: String,
    components: [Option<Component>; ComponentKind::COUNT],
    mask: ComponentMask,
    behavior: Option<Box<dyn Behavior>>,
}

impl Entity {
    pub fn new(tag: impl Into<String>, components: impl IntoIterator<Item = Component>) -> Self {
        Self::with_id(EntityId::new(), tag, components)
    }

    pub fn with_id(
        id: EntityId,
        tag: impl Into<String>,
        components: impl IntoIterator<Item = Component>,
    ) -> Self {
        let mut entity = Self {
            id,
            tag: tag.into(),
            components: Default::default(),
            mask: ComponentMask::EMPTY,
            behavior: None,
        };
        entity.add_components(components);
        entity
    }

    pub fn with_behavior(mut self, behavior: impl Behavior + 'static) -> Self {
        self.behavior = Some(Box::new(behavior));
        self
    }

    pub fn set_behavior(&mut self, behavior: Option<Box<dyn Behavior>>) {
        self.behavior = behavior;
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    pub fn has(&self, kind: ComponentKind) -> bool {
        self.mask.contains(kind)
    }

    /// True when the entity carries both a model and a shader.
    pub fn is_renderable(&self) -> bool {
        self.has(ComponentKind::Model) && self.has(ComponentKind::Shader)
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components[kind.index()].as_ref()
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().flatten()
    }

    pub fn get<T: ComponentData>(&self) -> Option<&T> {
        self.components[T::KIND.index()]
            .as_ref()
            .and_then(T::from_component)
    }

    pub fn get_mut<T: ComponentData>(&mut self) -> Option<&mut T> {
        self.components[T::KIND.index()]
            .as_mut()
            .and_then(T::from_component_mut)
    }

    /// Like `get`, but a missing component is a named error.
    pub fn require<T: ComponentData>(&self, context: &'static str) -> Result<&T, EcsError> {
        self.get::<T>().ok_or_else(|| self.missing(context, T::KIND))
    }

    pub fn require_mut<T: ComponentData>(
        &mut self,
        context: &'static str,
    ) -> Result<&mut T, EcsError> {
        if !self.has(T::KIND) {
            return Err(self.missing(context, T::KIND));
        }
        self.get_mut::<T>()
            .ok_or_else(|| EcsError::UnknownComponent(T::KIND.name().to_string()))
    }

    fn missing(&self, context: &'static str, kind: ComponentKind) -> EcsError {
        EcsError::MissingComponent {
            context,
            kind,
            tag: self.tag.clone(),
        }
    }

    /// Stores the component in its kind's slot and returns what was there.
    pub fn add_component(&mut self, component: impl Into<Component>) -> Option<Component> {
        let component = component.into();
        let kind = component.kind();
        self.mask.insert(kind);
        let previous = self.components[kind.index()].replace(component);
        if previous.is_some() {
            tracing::trace!(entity = %self.id, %kind, "replaced component");
        }
        previous
    }

    pub fn add_components(&mut self, components: impl IntoIterator<Item = Component>) {
        for component in components {
            self.add_component(component);
        }
    }

    pub fn remove_component(&mut self, kind: ComponentKind) -> Option<Component> {
        self.mask.remove(kind);
        self.components[kind.index()].take()
    }

    pub fn remove_components(&mut self, kinds: &[ComponentKind]) -> Vec<Component> {
        kinds
            .iter()
            .filter_map(|kind| self.remove_component(*kind))
            .collect()
    }

    /// Runs the attached behavior, if any.
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), EcsError> {
        let Some(mut behavior) = self.behavior.take() else {
            return Ok(());
        };
        let result = behavior.tick(self, ctx);
        // A behavior installed during its own tick replaces the running one.
        if self.behavior.is_none() {
            self.behavior = Some(behavior);
        }
        result
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("components", &self.mask.kinds().collect::<Vec<_>>())
            .field("behavior", &self.behavior.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{FlatColor, Motion, Texture};
    use glam::{Vec3, Vec4};
    use glint_common::Transform;

    #[test]
    fn last_write_wins() {
        let mut e = Entity::new("box", [Texture::cell(0, 0).into()]);
        let previous = e.add_component(Texture::cell(3, 1));
        assert!(previous.is_some());
        assert_eq!(e.get::<Texture>(), Some(&Texture::cell(3, 1)));
        assert_eq!(e.mask().len(), 1);
    }

    #[test]
    fn remove_clears_mask() {
        let mut e = Entity::new(
            "box",
            [Transform::default().into(), FlatColor(Vec4::ONE).into()],
        );
        let removed = e.remove_components(&[ComponentKind::FlatColor, ComponentKind::Model]);
        assert_eq!(removed.len(), 1);
        assert!(!e.has(ComponentKind::FlatColor));
        assert!(e.has(ComponentKind::Transform));
        assert!(e.remove_component(ComponentKind::FlatColor).is_none());
    }

    #[test]
    fn require_names_context_and_tag() {
        let e = Entity::new("player", []);
        let err = e.require::<Motion>("PhysicsSystem::tick").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("PhysicsSystem::tick"));
        assert!(text.contains("player"));
        assert!(text.contains("Motion"));
    }

    struct Drift;

    impl Behavior for Drift {
        fn tick(&mut self, entity: &mut Entity, ctx: &mut TickContext<'_>) -> Result<(), EcsError> {
            let dt = ctx.delta_seconds();
            entity.require_mut::<Transform>("Drift::tick")?.position.x += dt;
            ctx.spawn(Entity::new("child", []));
            Ok(())
        }
    }

    #[test]
    fn behavior_mutates_and_queues() {
        let mut e = Entity::new("drifter", [Transform::default().into()]).with_behavior(Drift);

        let mut commands = EntityCommands::default();
        let mut ctx = TickContext::new(500.0, &mut commands);
        e.tick(&mut ctx).unwrap();
        e.tick(&mut ctx).unwrap();

        assert_eq!(e.get::<Transform>().unwrap().position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(commands.take_spawns().len(), 2);
        assert!(commands.is_empty());
    }

    #[test]
    fn behavior_errors_propagate() {
        let mut e = Entity::new("bare", []).with_behavior(Drift);
        let mut commands = EntityCommands::default();
        let err = e.tick(&mut TickContext::new(16.0, &mut commands)).unwrap_err();
        assert!(matches!(err, EcsError::MissingComponent { .. }));
        assert!(format!("{e:?}").contains("behavior: true"));
    }
}
