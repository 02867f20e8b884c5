use crate::error::EngineError;
use crate::system::{ManagerSet, System};
use glam::Vec3;
use glint_ecs::{BoxCollider, ComponentKind, EntityId, Transform};
use std::any::Any;
use std::collections::BTreeSet;

/// Phase of a colliding pair. Pairs are ordered `(min, max)` by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionEvent {
    Started(EntityId, EntityId),
    Continued(EntityId, EntityId),
    Ended(EntityId, EntityId),
}

impl CollisionEvent {
    pub fn pair(&self) -> (EntityId, EntityId) {
        match *self {
            Self::Started(a, b) | Self::Continued(a, b) | Self::Ended(a, b) => (a, b),
        }
    }

    pub fn involves(&self, id: EntityId) -> bool {
        let (a, b) = self.pair();
        a == id || b == id
    }
}

pub trait CollisionListener {
    fn on_collision(&mut self, event: &CollisionEvent);
}

/// World-space axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_collider(collider: &BoxCollider, transform: &Transform) -> Self {
        let half = collider.extents(transform);
        Self {
            min: transform.position - half,
            max: transform.position + half,
        }
    }

    /// Strict overlap: boxes that only touch do not collide.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmplt(other.max).all() && other.min.cmplt(self.max).all()
    }
}

/// Detects overlapping [`BoxCollider`]s within one manager and reports the
/// start, continuation and end of every contact.
pub struct CollisionSystem {
    manager: String,
    active: BTreeSet<(EntityId, EntityId)>,
    events: Vec<CollisionEvent>,
    listener: Option<Box<dyn CollisionListener>>,
}

impl CollisionSystem {
    pub fn new(manager: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
            active: BTreeSet::new(),
            events: Vec::new(),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl CollisionListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Events of the last tick.
    pub fn events(&self) -> &[CollisionEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<CollisionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn active_pairs(&self) -> impl Iterator<Item = &(EntityId, EntityId)> {
        self.active.iter()
    }

    pub fn is_colliding(&self, a: EntityId, b: EntityId) -> bool {
        self.active.contains(&ordered(a, b))
    }
}

fn ordered(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl System for CollisionSystem {
    fn name(&self) -> &str {
        "collision"
    }

    fn tick(&mut self, managers: &mut ManagerSet, _delta_ms: f32) -> Result<(), EngineError> {
        const CONTEXT: &str = "CollisionSystem::tick";
        let manager = managers.get_mut(&self.manager)?;
        let ids = manager.filter_by_components(&[ComponentKind::Transform, ComponentKind::BoxCollider]);

        let mut boxes = Vec::with_capacity(ids.len());
        for id in ids.iter() {
            if let Some(entity) = manager.entity(*id) {
                let transform = entity.require::<Transform>(CONTEXT)?;
                let collider = entity.require::<BoxCollider>(CONTEXT)?;
                boxes.push((*id, Aabb::from_collider(collider, transform)));
            }
        }

        let mut touching = BTreeSet::new();
        for (i, (a, box_a)) in boxes.iter().enumerate() {
            for (b, box_b) in &boxes[i + 1..] {
                if box_a.overlaps(box_b) {
                    touching.insert(ordered(*a, *b));
                }
            }
        }

        self.events.clear();
        for &(a, b) in &self.active {
            if !touching.contains(&(a, b)) {
                self.events.push(CollisionEvent::Ended(a, b));
            }
        }
        for &(a, b) in &touching {
            if self.active.contains(&(a, b)) {
                self.events.push(CollisionEvent::Continued(a, b));
            } else {
                self.events.push(CollisionEvent::Started(a, b));
            }
        }
        self.active = touching;

        if let Some(listener) = self.listener.as_mut() {
            for event in &self.events {
                listener.on_collision(event);
            }
        }
        tracing::trace!(manager = %self.manager, contacts = self.active.len(), "collision pass");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
