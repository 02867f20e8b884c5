//! Demo scene shared by the CLI and the desktop app.
//!
//! A tinted floor batched through the `colored` program, bouncing blocks that
//! collide with each other, spinning atlas sprites and an emitter that spawns
//! short-lived sparks. Everything lives in one planar manager in pixel units.

use glam::{Vec2, Vec3, Vec4};
use glint_common::{Dim2, EntityId};
use glint_ecs::{
    Behavior, BoxCollider, DrawMode, EcsError, Entity, FlatColor, Geometry, Model, Motion, Shader,
    ShaderProgramSpec, Texture, TickContext, Transform,
};
use glint_kernel::{
    Camera, CollisionEvent, CollisionListener, CollisionSystem, EngineError, EntityManager, Game,
    PhysicsSystem,
};
use glint_render::{GraphicsBackend, RenderError, TextureAtlas};
use glint_render_wgpu::shaders;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const MANAGER: &str = "demo";
pub const CAMERA: &str = "main";
pub const ATLAS: &str = "demo_atlas";

const ATLAS_CELL: u32 = 32;
const ARENA: Vec2 = Vec2::new(420.0, 260.0);
const FLOOR_TILE: f32 = 40.0;
const SPARK_INTERVAL_MS: f32 = 250.0;
const SPARK_LIFETIME_MS: f32 = 1200.0;
const SPARK_SPEED: f32 = 140.0;
const GOLDEN_ANGLE: f32 = 2.399_963;

/// Handles to the interesting parts of a built scene.
#[derive(Debug, Clone)]
pub struct DemoScene {
    pub blocks: Vec<EntityId>,
    pub sprites: Vec<EntityId>,
    pub emitter: EntityId,
    /// Collisions started so far.
    pub contacts: Arc<AtomicUsize>,
}

/// Keeps an entity inside the arena by reflecting its velocity at the walls.
#[derive(Debug, Clone, Copy)]
pub struct Bounce {
    pub bounds: Vec2,
}

impl Behavior for Bounce {
    fn tick(&mut self, entity: &mut Entity, _ctx: &mut TickContext<'_>) -> Result<(), EcsError> {
        let transform = *entity.require::<Transform>("Bounce::tick")?;
        let motion = entity.require_mut::<Motion>("Bounce::tick")?;
        let reach = transform.position.truncate().abs() + transform.scale.truncate().abs();
        let outward = transform.position.truncate().signum();
        if reach.x > self.bounds.x && motion.velocity.x * outward.x > 0.0 {
            motion.velocity.x = -motion.velocity.x;
        }
        if reach.y > self.bounds.y && motion.velocity.y * outward.y > 0.0 {
            motion.velocity.y = -motion.velocity.y;
        }
        Ok(())
    }
}

/// Removes its entity once `remaining_ms` runs out.
#[derive(Debug, Clone, Copy)]
pub struct Lifetime {
    pub remaining_ms: f32,
}

impl Behavior for Lifetime {
    fn tick(&mut self, entity: &mut Entity, ctx: &mut TickContext<'_>) -> Result<(), EcsError> {
        self.remaining_ms -= ctx.delta_ms;
        if self.remaining_ms <= 0.0 {
            ctx.remove(entity.id());
        }
        Ok(())
    }
}

/// Spawns a spark every `interval_ms`, each heading off at the next golden
/// angle step.
#[derive(Debug, Clone)]
pub struct Emitter {
    program: Arc<ShaderProgramSpec>,
    interval_ms: f32,
    since_last_ms: f32,
    angle: f32,
}

impl Emitter {
    pub fn new(program: Arc<ShaderProgramSpec>, interval_ms: f32) -> Self {
        Self {
            program,
            interval_ms,
            since_last_ms: 0.0,
            angle: 0.0,
        }
    }
}

impl Behavior for Emitter {
    fn tick(&mut self, entity: &mut Entity, ctx: &mut TickContext<'_>) -> Result<(), EcsError> {
        let origin = entity.require::<Transform>("Emitter::tick")?.position;
        self.since_last_ms += ctx.delta_ms;
        while self.since_last_ms >= self.interval_ms {
            self.since_last_ms -= self.interval_ms;
            self.angle += GOLDEN_ANGLE;
            let direction = Vec2::from_angle(self.angle).extend(0.0);
            ctx.spawn(spark(&self.program, origin, direction * SPARK_SPEED));
        }
        Ok(())
    }
}

/// Counts started contacts and logs each one.
struct ContactLog {
    started: Arc<AtomicUsize>,
}

impl CollisionListener for ContactLog {
    fn on_collision(&mut self, event: &CollisionEvent) {
        if let CollisionEvent::Started(a, b) = event {
            self.started.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%a, %b, "contact");
        }
    }
}

/// 2x2 atlas of soft discs (red, green, blue, amber) on a transparent field.
pub fn atlas() -> Result<TextureAtlas, RenderError> {
    let tints = [[230, 70, 60], [80, 200, 110], [70, 120, 230], [240, 180, 60]];
    let size = ATLAS_CELL * 2;
    let mut pixels = vec![0u8; (size * size * 4) as usize];
    let radius = ATLAS_CELL as f32 / 2.0 - 1.0;
    for y in 0..size {
        for x in 0..size {
            let cell = (y / ATLAS_CELL) * 2 + x / ATLAS_CELL;
            let local = Vec2::new(
                (x % ATLAS_CELL) as f32 + 0.5 - ATLAS_CELL as f32 / 2.0,
                (y % ATLAS_CELL) as f32 + 0.5 - ATLAS_CELL as f32 / 2.0,
            );
            let at = ((y * size + x) * 4) as usize;
            if local.length() <= radius {
                let tint = tints[cell as usize];
                let shade = 1.0 - 0.4 * local.length() / radius;
                for (channel, value) in tint.iter().enumerate() {
                    pixels[at + channel] = (*value as f32 * shade) as u8;
                }
                pixels[at + 3] = 255;
            }
        }
    }
    TextureAtlas::from_rgba(ATLAS, size, size, pixels, 2, 2)
}

/// Two-triangle quad spanning -1..1. Unlike the strip square, quads batch
/// into one buffer without joining neighbours.
pub fn quad() -> Result<Arc<Geometry>, EcsError> {
    let vertices = vec![
        -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, //
        -1.0, 1.0, 1.0, -1.0, 1.0, 1.0,
    ];
    Ok(Arc::new(Geometry::new(vertices, 2, DrawMode::Triangles)?))
}

fn spark(program: &Arc<ShaderProgramSpec>, origin: Vec3, velocity: Vec3) -> Entity {
    Entity::new(
        "spark",
        [
            Model::new("square", Geometry::square()).into(),
            Shader::new(Arc::clone(program)).into(),
            Transform::from_position(origin).with_scale(Vec3::new(3.0, 3.0, 1.0)).into(),
            FlatColor(Vec4::new(1.0, 0.9, 0.5, 1.0)).into(),
            Motion::with_velocity(velocity).into(),
        ],
    )
    .with_behavior(Lifetime {
        remaining_ms: SPARK_LIFETIME_MS,
    })
}

fn floor(program: &Arc<ShaderProgramSpec>, geometry: &Arc<Geometry>) -> Vec<Entity> {
    let columns = (ARENA.x * 2.0 / FLOOR_TILE) as i32;
    let rows = (ARENA.y * 2.0 / FLOOR_TILE) as i32;
    let mut tiles = Vec::with_capacity((columns * rows) as usize);
    for row in 0..rows {
        for column in 0..columns {
            let center = Vec2::new(
                -ARENA.x + FLOOR_TILE * (column as f32 + 0.5),
                -ARENA.y + FLOOR_TILE * (row as f32 + 0.5),
            );
            let shade = if (row + column) % 2 == 0 { 0.16 } else { 0.12 };
            tiles.push(Entity::new(
                "floor",
                [
                    Model::new("quad", Arc::clone(geometry)).into(),
                    Shader::new(Arc::clone(program)).into(),
                    Transform::planar(center, 0.0, Vec2::splat(FLOOR_TILE / 2.0 - 1.0)).into(),
                    FlatColor(Vec4::new(shade, shade, shade + 0.04, 1.0)).into(),
                ],
            ));
        }
    }
    tiles
}

/// Registers the built-in programs and the demo atlas, then adds the demo
/// manager, its camera (unless one named [`CAMERA`] exists) and the physics
/// and collision systems.
pub fn build<B: GraphicsBackend>(game: &mut Game<B, Dim2>) -> Result<DemoScene, EngineError> {
    for program in shaders::builtin_programs() {
        game.renderer_mut().create_shader_program(program)?;
    }
    let atlas = atlas()?;
    game.renderer_mut().create_texture(&atlas)?;
    if game.camera(CAMERA).is_err() {
        let viewport = game.config().viewport();
        game.add_camera(Camera::new(CAMERA, viewport));
    }

    let flat = shaders::flat();
    let mut manager = EntityManager::new(MANAGER).with_atlas(atlas);
    manager.add_entities(floor(&shaders::colored(), &quad()?));

    let palette = [
        Vec4::new(0.95, 0.35, 0.3, 1.0),
        Vec4::new(0.3, 0.8, 0.45, 1.0),
        Vec4::new(0.35, 0.55, 0.95, 1.0),
        Vec4::new(0.95, 0.75, 0.3, 1.0),
    ];
    let mut blocks = Vec::new();
    for i in 0..6 {
        let angle = i as f32 * 1.1;
        let block = Entity::new(
            "block",
            [
                Model::new("square", Geometry::square()).into(),
                Shader::new(Arc::clone(&flat)).into(),
                Transform::planar(Vec2::new(-300.0 + i as f32 * 110.0, 40.0 * angle.sin()), 0.0, Vec2::splat(16.0))
                    .into(),
                FlatColor(palette[i % palette.len()]).into(),
                Motion::with_velocity(Vec2::from_angle(angle).extend(0.0) * 160.0).into(),
                BoxCollider::default().into(),
            ],
        )
        .with_behavior(Bounce { bounds: ARENA });
        blocks.push(manager.add_entity(block));
    }

    let sprite = shaders::sprite();
    let mut sprites = Vec::new();
    for i in 0..4u32 {
        let position = Vec2::new(-150.0 + i as f32 * 100.0, -160.0);
        let entity = Entity::new(
            "sprite",
            [
                Model::new("square", Geometry::square()).into(),
                Shader::new(Arc::clone(&sprite)).into(),
                Transform::planar(position, 0.0, Vec2::splat(24.0)).into(),
                Texture::cell(i % 2, i / 2).into(),
                Motion {
                    angular_velocity: Vec3::Z * (1.0 + i as f32 * 0.5),
                    ..Motion::default()
                }
                .into(),
            ],
        );
        sprites.push(manager.add_entity(entity));
    }

    let emitter = manager.add_entity(
        Entity::new(
            "emitter",
            [
                Model::new("square", Geometry::square()).into(),
                Shader::new(Arc::clone(&flat)).into(),
                Transform::planar(Vec2::new(0.0, 120.0), 0.0, Vec2::splat(6.0)).into(),
                FlatColor(Vec4::ONE).into(),
            ],
        )
        .with_behavior(Emitter::new(Arc::clone(&flat), SPARK_INTERVAL_MS)),
    );

    game.add_manager(manager, CAMERA)?;
    let contacts = Arc::new(AtomicUsize::new(0));
    game.add_system(PhysicsSystem::new(MANAGER));
    game.add_system(CollisionSystem::new(MANAGER).with_listener(ContactLog {
        started: Arc::clone(&contacts),
    }));
    tracing::info!(blocks = blocks.len(), sprites = sprites.len(), "demo scene built");

    Ok(DemoScene {
        blocks,
        sprites,
        emitter,
        contacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_ecs::EntityCommands;
    use glint_kernel::{FixedClock, GameConfig};
    use glint_render::HeadlessBackend;

    fn game() -> (Game<HeadlessBackend>, DemoScene) {
        let mut game = Game::new(GameConfig::default(), HeadlessBackend::new());
        let scene = build(&mut game).unwrap();
        (game, scene)
    }

    #[test]
    fn scene_renders_every_group() {
        let (mut game, scene) = game();
        game.frame(16.0).unwrap();
        let manager = game.manager(MANAGER).unwrap();
        assert_eq!(manager.len(), 21 * 13 + scene.blocks.len() + scene.sprites.len() + 1);
        let programs: Vec<_> = manager.buckets().map(|(p, m, _)| (p, m)).collect();
        assert_eq!(
            programs,
            vec![("colored", "quad"), ("flat", "square"), ("sprite", "square")]
        );
        // floor batches into one draw; blocks, emitter and sprites draw per entity
        let stats = game.renderer().stats();
        assert_eq!(stats.draw_calls, 1 + 6 + 1 + 4);
    }

    #[test]
    fn emitter_spawns_and_sparks_expire() {
        let (mut game, scene) = game();
        let before = game.manager(MANAGER).unwrap().len();
        game.run(&mut FixedClock(50.0), Some(6)).unwrap();
        let sparks = game
            .manager_mut(MANAGER)
            .unwrap()
            .filter_by_tag("spark")
            .len();
        assert!(sparks > 0);
        assert!(game.manager(MANAGER).unwrap().contains(scene.emitter));

        game.run(&mut FixedClock(50.0), Some(60)).unwrap();
        let manager = game.manager(MANAGER).unwrap();
        let live = manager.entities().filter(|e| e.tag() == "spark").count();
        // one spark per interval, each living a fixed time
        let max_live = (SPARK_LIFETIME_MS / SPARK_INTERVAL_MS).ceil() as usize + 1;
        assert!(live <= max_live, "{live} sparks alive");
        assert!(manager.len() > before);
    }

    #[test]
    fn bounce_reflects_outward_velocity_only() {
        let mut entity = Entity::new(
            "block",
            [
                Transform::planar(Vec2::new(95.0, 0.0), 0.0, Vec2::splat(10.0)).into(),
                Motion::with_velocity(Vec3::new(50.0, 20.0, 0.0)).into(),
            ],
        );
        let mut commands = EntityCommands::default();
        let mut bounce = Bounce {
            bounds: Vec2::splat(100.0),
        };
        bounce.tick(&mut entity, &mut TickContext::new(16.0, &mut commands)).unwrap();
        assert_eq!(entity.get::<Motion>().unwrap().velocity, Vec3::new(-50.0, 20.0, 0.0));

        // already heading back in: untouched
        bounce.tick(&mut entity, &mut TickContext::new(16.0, &mut commands)).unwrap();
        assert_eq!(entity.get::<Motion>().unwrap().velocity, Vec3::new(-50.0, 20.0, 0.0));
    }

    #[test]
    fn lifetime_queues_removal_when_spent() {
        let mut entity = Entity::new("spark", []);
        let mut commands = EntityCommands::default();
        let mut lifetime = Lifetime { remaining_ms: 30.0 };
        lifetime.tick(&mut entity, &mut TickContext::new(20.0, &mut commands)).unwrap();
        assert!(commands.is_empty());
        lifetime.tick(&mut entity, &mut TickContext::new(20.0, &mut commands)).unwrap();
        assert_eq!(commands.take_removals(), vec![entity.id()]);
    }

    #[test]
    fn atlas_cells_are_opaque_discs() {
        let atlas = atlas().unwrap();
        assert_eq!((atlas.columns(), atlas.rows()), (2, 2));
        let glint_render::TextureSource::Rgba { pixels, width, .. } = atlas.source() else {
            panic!("demo atlas is in memory");
        };
        let alpha = |x: u32, y: u32| pixels[((y * width + x) * 4 + 3) as usize];
        assert_eq!(alpha(16, 16), 255);
        assert_eq!(alpha(0, 0), 0);
    }

    #[test]
    fn overlapping_blocks_count_a_contact() {
        let (mut game, scene) = game();
        game.frame(16.0).unwrap();
        let (a, b) = (scene.blocks[0], scene.blocks[1]);
        let manager = game.manager_mut(MANAGER).unwrap();
        let target = manager.entity(a).unwrap().get::<Transform>().unwrap().position;
        manager.entity_mut(b).unwrap().get_mut::<Transform>().unwrap().position = target;

        game.frame(16.0).unwrap();
        assert!(scene.contacts.load(Ordering::Relaxed) >= 1);
        let collisions = game.system::<CollisionSystem>("collision").unwrap();
        assert!(collisions.is_colliding(a, b));
    }
}
