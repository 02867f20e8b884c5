use crate::error::EngineError;
use crate::system::{ManagerSet, System};
use glam::{Quat, Vec3};
use glint_ecs::{ComponentKind, Motion, Transform};
use std::any::Any;

/// Integrates [`Motion`] into [`Transform`] for every entity of one manager
/// holding both, using semi-implicit Euler in seconds.
#[derive(Debug, Clone)]
pub struct PhysicsSystem {
    manager: String,
    pub gravity: Vec3,
}

impl PhysicsSystem {
    pub fn new(manager: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
            gravity: Vec3::ZERO,
        }
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn manager(&self) -> &str {
        &self.manager
    }
}

/// Advances one body by `dt` seconds.
pub fn integrate(transform: &mut Transform, motion: &mut Motion, gravity: Vec3, dt: f32) {
    motion.velocity += (motion.acceleration + gravity) * dt;
    transform.position += motion.velocity * dt;
    if motion.angular_velocity != Vec3::ZERO {
        let spin = Quat::from_scaled_axis(motion.angular_velocity * dt);
        transform.rotation = (spin * transform.rotation).normalize();
    }
}

impl System for PhysicsSystem {
    fn name(&self) -> &str {
        "physics"
    }

    fn tick(&mut self, managers: &mut ManagerSet, delta_ms: f32) -> Result<(), EngineError> {
        const CONTEXT: &str = "PhysicsSystem::tick";
        let dt = delta_ms / 1000.0;
        let manager = managers.get_mut(&self.manager)?;
        let bodies = manager.filter_by_components(&[ComponentKind::Transform, ComponentKind::Motion]);
        for id in bodies.iter() {
            let Some(entity) = manager.entity_mut(*id) else {
                continue;
            };
            let mut motion = *entity.require::<Motion>(CONTEXT)?;
            let transform = entity.require_mut::<Transform>(CONTEXT)?;
            integrate(transform, &mut motion, self.gravity, dt);
            *entity.require_mut::<Motion>(CONTEXT)? = motion;
        }
        tracing::trace!(manager = %self.manager, bodies = bodies.len(), "physics step");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::EntityManager;
    use glint_ecs::Entity;
    use glint_render::{HeadlessBackend, Renderer, ShaderVariableResolver};

    #[test]
    fn velocity_moves_in_seconds() {
        let mut t = Transform::default();
        let mut m = Motion::with_velocity(Vec3::new(10.0, 0.0, 0.0));
        integrate(&mut t, &mut m, Vec3::ZERO, 0.5);
        assert_eq!(t.position, Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn gravity_accelerates() {
        let mut t = Transform::default();
        let mut m = Motion::default();
        integrate(&mut t, &mut m, Vec3::new(0.0, -10.0, 0.0), 1.0);
        assert_eq!(m.velocity, Vec3::new(0.0, -10.0, 0.0));
        assert_eq!(t.position, Vec3::new(0.0, -10.0, 0.0));
    }

    #[test]
    fn spins_around_z() {
        let mut t = Transform::default();
        let mut m = Motion {
            angular_velocity: Vec3::new(0.0, 0.0, std::f32::consts::PI),
            ..Motion::default()
        };
        integrate(&mut t, &mut m, Vec3::ZERO, 0.5);
        let x = t.rotation * Vec3::X;
        assert!((x - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn system_moves_only_bodies() {
        let mut renderer = Renderer::new(HeadlessBackend::new(), ShaderVariableResolver::with_builtins());
        let mut world = EntityManager::new("world");
        let body = world.add_entity(Entity::new(
            "ball",
            [
                Transform::default().into(),
                Motion::with_velocity(Vec3::new(0.0, 2.0, 0.0)).into(),
            ],
        ));
        let still = world.add_entity(Entity::new("wall", [Transform::default().into()]));
        world.tick(&mut renderer, 0.0).unwrap();

        let mut managers = ManagerSet::default();
        managers.insert(world).unwrap();
        let mut physics = PhysicsSystem::new("world");
        physics.tick(&mut managers, 500.0).unwrap();

        let world = managers.get("world").unwrap();
        let pos = |id| world.entity(id).unwrap().get::<Transform>().unwrap().position;
        assert_eq!(pos(body), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(pos(still), Vec3::ZERO);
    }

    #[test]
    fn unknown_manager_is_an_error() {
        let mut managers = ManagerSet::default();
        assert!(matches!(
            PhysicsSystem::new("nope").tick(&mut managers, 16.0),
            Err(EngineError::UnknownManager { .. })
        ));
    }
}
