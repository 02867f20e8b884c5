use crate::camera::Camera;
use crate::config::GameConfig;
use crate::error::EngineError;
use crate::manager::EntityManager;
use crate::system::{ManagerSet, System};
use glam::Vec4;
use glint_common::{Dim2, Dimension, Viewport};
use glint_ecs::Transform;
use glint_render::{GraphicsBackend, Renderer, ShaderVariableResolver, TextureAtlas, TextureSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Source of frame deltas for [`Game::run`].
pub trait Clock {
    /// Milliseconds since the previous call.
    fn delta_ms(&mut self) -> f32;
}

/// Wall-clock deltas.
#[derive(Debug)]
pub struct WallClock {
    last: Instant,
}

impl Default for WallClock {
    fn default() -> Self {
        Self { last: Instant::now() }
    }
}

impl Clock for WallClock {
    fn delta_ms(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now.duration_since(self.last).as_secs_f32() * 1000.0;
        self.last = now;
        delta
    }
}

/// Constant deltas, for headless runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub f32);

impl Clock for FixedClock {
    fn delta_ms(&mut self) -> f32 {
        self.0
    }
}

/// Owns the renderer, the entity managers, their cameras and the systems,
/// and drives them one frame at a time.
///
/// Each frame ticks every manager (applying staged changes and rebuilding
/// vertex buffers), then every system in insertion order, then renders every
/// manager through the camera bound to it. Managers tick and render in the
/// order they were added, so later managers draw over earlier ones. Any error
/// stops the frame and is returned to the caller.
pub struct Game<B: GraphicsBackend, D: Dimension = Dim2> {
    config: GameConfig,
    renderer: Renderer<B>,
    managers: ManagerSet,
    cameras: BTreeMap<String, Camera<D>>,
    /// (manager, camera) in draw order.
    bindings: Vec<(String, String)>,
    systems: Vec<Box<dyn System>>,
    running: Arc<AtomicBool>,
    elapsed_ms: f32,
    frames: u64,
}

impl<B: GraphicsBackend, D: Dimension> Game<B, D> {
    pub fn new(config: GameConfig, backend: B) -> Self {
        let renderer = Renderer::new(backend, ShaderVariableResolver::with_builtins())
            .with_texture_base_unit(config.texture_base_unit);
        Self {
            config,
            renderer,
            managers: ManagerSet::default(),
            cameras: BTreeMap::new(),
            bindings: Vec::new(),
            systems: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            elapsed_ms: 0.0,
            frames: 0,
        }
    }

    /// Creates the cameras, atlases and entity managers listed in the config,
    /// keeping the listed manager order. Managers naming the same atlas share
    /// one texture.
    pub fn setup_from_config(&mut self) -> Result<(), EngineError> {
        let viewport = self.config.viewport();
        for entry in self.config.managers.clone() {
            if !self.cameras.contains_key(&entry.camera) {
                self.add_camera(Camera::new(entry.camera.clone(), viewport));
            }
            let mut manager = EntityManager::new(entry.name.clone());
            if let Some(atlas) = entry.atlas {
                let atlas = TextureAtlas::new(
                    atlas.name,
                    TextureSource::File(atlas.path),
                    atlas.width,
                    atlas.height,
                    atlas.columns,
                    atlas.rows,
                )?;
                if self.renderer.texture_unit(atlas.name()).is_none() {
                    self.renderer.create_texture(&atlas)?;
                }
                manager = manager.with_atlas(atlas);
            }
            self.add_manager(manager, &entry.camera)?;
        }
        tracing::info!(
            managers = self.managers.len(),
            cameras = self.cameras.len(),
            "game set up from config"
        );
        Ok(())
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn renderer(&self) -> &Renderer<B> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<B> {
        &mut self.renderer
    }

    pub fn managers(&self) -> &ManagerSet {
        &self.managers
    }

    pub fn manager(&self, name: &str) -> Result<&EntityManager, EngineError> {
        self.managers.get(name)
    }

    pub fn manager_mut(&mut self, name: &str) -> Result<&mut EntityManager, EngineError> {
        self.managers.get_mut(name)
    }

    /// Registers `manager`, rendered through the camera named `camera`.
    pub fn add_manager(&mut self, manager: EntityManager, camera: &str) -> Result<(), EngineError> {
        if !self.cameras.contains_key(camera) {
            return Err(EngineError::UnknownCamera {
                context: "Game::add_manager",
                name: camera.to_string(),
            });
        }
        let name = manager.name().to_string();
        self.managers.insert(manager)?;
        self.bindings.push((name.clone(), camera.to_string()));
        tracing::debug!(manager = %name, camera, "entity manager added");
        Ok(())
    }

    /// Adds or replaces a camera.
    pub fn add_camera(&mut self, camera: Camera<D>) {
        self.cameras.insert(camera.name().to_string(), camera);
    }

    pub fn camera(&self, name: &str) -> Result<&Camera<D>, EngineError> {
        self.cameras.get(name).ok_or_else(|| EngineError::UnknownCamera {
            context: "Game::camera",
            name: name.to_string(),
        })
    }

    pub fn camera_mut(&mut self, name: &str) -> Result<&mut Camera<D>, EngineError> {
        self.cameras.get_mut(name).ok_or_else(|| EngineError::UnknownCamera {
            context: "Game::camera_mut",
            name: name.to_string(),
        })
    }

    pub fn add_system(&mut self, system: impl System + 'static) {
        tracing::debug!(system = system.name(), "system added");
        self.systems.push(Box::new(system));
    }

    /// First system named `name`, downcast to `T`.
    pub fn system<T: System>(&self, name: &str) -> Result<&T, EngineError> {
        self.systems
            .iter()
            .filter(|s| s.name() == name)
            .find_map(|s| s.as_any().downcast_ref::<T>())
            .ok_or_else(|| EngineError::UnknownSystem {
                context: "Game::system",
                name: name.to_string(),
            })
    }

    pub fn system_mut<T: System>(&mut self, name: &str) -> Result<&mut T, EngineError> {
        self.systems
            .iter_mut()
            .filter(|s| s.name() == name)
            .find_map(|s| s.as_any_mut().downcast_mut::<T>())
            .ok_or_else(|| EngineError::UnknownSystem {
                context: "Game::system_mut",
                name: name.to_string(),
            })
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.config.width = viewport.width;
        self.config.height = viewport.height;
        for camera in self.cameras.values_mut() {
            camera.set_viewport(viewport);
        }
    }

    pub fn elapsed_ms(&self) -> f32 {
        self.elapsed_ms
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Flag shared with signal handlers or other threads; clearing it ends
    /// [`run`](Self::run) before the next frame.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Advances the game by one frame of `delta_ms` (clamped to the
    /// configured maximum).
    pub fn frame(&mut self, delta_ms: f32) -> Result<(), EngineError> {
        let dt = delta_ms.max(0.0).min(self.config.max_frame_delta_ms);
        self.renderer.begin_frame(Vec4::from_array(self.config.clear_color))?;

        for manager in self.managers.iter_mut() {
            manager.tick(&mut self.renderer, dt)?;
        }
        for system in &mut self.systems {
            system.tick(&mut self.managers, dt)?;
        }
        self.elapsed_ms += dt;

        for camera in self.cameras.values_mut() {
            let Some(follow) = camera.following() else {
                continue;
            };
            let target = self
                .managers
                .get(&follow.manager)?
                .entity(follow.entity)
                .and_then(|e| e.get::<Transform>())
                .map(|t| t.position);
            match target {
                Some(position) => camera.update_follow(position),
                None => tracing::debug!(camera = camera.name(), "followed entity is gone"),
            }
        }

        for (manager, camera) in &self.bindings {
            let camera = self.cameras.get(camera).ok_or_else(|| EngineError::UnknownCamera {
                context: "Game::frame",
                name: camera.clone(),
            })?;
            let ctx = camera.context(self.elapsed_ms);
            self.managers.get_mut(manager)?.render(&mut self.renderer, &ctx)?;
        }

        self.renderer.end_frame()?;
        self.frames += 1;
        Ok(())
    }

    /// Runs frames until stopped, an error occurs, or `max_frames` frames
    /// have run. Returns the number of frames run.
    pub fn run(&mut self, clock: &mut impl Clock, max_frames: Option<u64>) -> Result<u64, EngineError> {
        let start = self.frames;
        tracing::info!(title = %self.config.title, "game loop started");
        while self.is_running() {
            if max_frames.is_some_and(|max| self.frames - start >= max) {
                break;
            }
            if let Err(err) = self.frame(clock.delta_ms()) {
                tracing::error!(error = %err, frame = self.frames, "frame failed, stopping");
                self.stop();
                return Err(err);
            }
        }
        let ran = self.frames - start;
        tracing::info!(frames = ran, "game loop finished");
        Ok(ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AtlasConfig, ManagerConfig};
    use crate::physics::PhysicsSystem;
    use glam::Vec3;
    use glint_ecs::{
        Entity, FlatColor, FragmentShaderSpec, Geometry, Model, Motion, Shader, ShaderProgramSpec,
        UniformType, Variation, VertexShaderSpec,
    };
    use glint_render::{HeadlessBackend, RenderError, UniformValue};

    fn program() -> Arc<ShaderProgramSpec> {
        Arc::new(ShaderProgramSpec::new(
            "basic",
            VertexShaderSpec::new("vs")
                .attribute("a_Position", 2)
                .uniform("u_Projection", UniformType::Mat4, Variation::Static)
                .uniform("u_Transform", UniformType::Mat4, Variation::Entity),
            FragmentShaderSpec::new("fs").uniform("u_Color", UniformType::Vec4, Variation::Entity),
        ))
    }

    fn game() -> Game<HeadlessBackend> {
        let mut game = Game::new(GameConfig::default(), HeadlessBackend::new());
        game.renderer_mut().create_shader_program(program()).unwrap();
        game.add_camera(Camera::new("main", Viewport::default()));
        game.add_manager(EntityManager::new("world"), "main").unwrap();
        game
    }

    fn ball(velocity: Vec3) -> Entity {
        Entity::new(
            "ball",
            [
                Model::new("square", Geometry::square()).into(),
                Shader::new(program()).into(),
                Transform::default().into(),
                FlatColor(Vec4::ONE).into(),
                Motion::with_velocity(velocity).into(),
            ],
        )
    }

    #[test]
    fn frame_ticks_then_renders() {
        let mut game = game();
        game.manager_mut("world").unwrap().add_entity(ball(Vec3::ZERO));
        game.frame(16.0).unwrap();

        let stats = game.renderer().stats();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.buffer_uploads, 1);
        assert_eq!(game.frames(), 1);
        assert_eq!(game.elapsed_ms(), 16.0);
    }

    #[test]
    fn systems_run_before_render() {
        let mut game = game();
        game.add_system(PhysicsSystem::new("world"));
        let id = game.manager_mut("world").unwrap().add_entity(ball(Vec3::new(100.0, 0.0, 0.0)));
        game.frame(50.0).unwrap();

        let expected = Transform::from_position(Vec3::new(5.0, 0.0, 0.0)).matrix();
        let uploads = game.renderer().backend().uniform_uploads("u_Transform");
        assert_eq!(uploads.last(), Some(&UniformValue::Mat4(expected)));
        let pos = game.manager("world").unwrap().entity(id).unwrap().get::<Transform>().unwrap().position;
        assert_eq!(pos, Vec3::new(5.0, 0.0, 0.0));
        assert!(game.system::<PhysicsSystem>("physics").is_ok());
        assert!(matches!(
            game.system::<PhysicsSystem>("gravity"),
            Err(EngineError::UnknownSystem { .. })
        ));
    }

    #[test]
    fn delta_is_clamped() {
        let mut game = game();
        game.frame(10_000.0).unwrap();
        assert_eq!(game.elapsed_ms(), 100.0);
        game.frame(-5.0).unwrap();
        assert_eq!(game.elapsed_ms(), 100.0);
    }

    #[test]
    fn camera_follows_entity() {
        let mut game = game();
        game.add_system(PhysicsSystem::new("world"));
        let id = game.manager_mut("world").unwrap().add_entity(ball(Vec3::new(0.0, 1000.0, 0.0)));
        game.camera_mut("main").unwrap().follow("world", id, Vec3::ZERO);
        game.frame(100.0).unwrap();
        assert_eq!(game.camera("main").unwrap().position, glam::Vec2::new(0.0, 100.0));
    }

    #[test]
    fn run_stops_at_max_frames_or_flag() {
        let mut game = game();
        assert_eq!(game.run(&mut FixedClock(16.0), Some(5)).unwrap(), 5);

        let handle = game.shutdown_handle();
        handle.store(false, Ordering::SeqCst);
        assert_eq!(game.run(&mut FixedClock(16.0), Some(5)).unwrap(), 0);
    }

    #[test]
    fn frame_errors_stop_the_loop() {
        let mut game = game();
        let mut plain = ball(Vec3::ZERO);
        plain.remove_component(glint_ecs::ComponentKind::FlatColor);
        game.manager_mut("world").unwrap().add_entity(plain);
        let err = game.run(&mut FixedClock(16.0), None).unwrap_err();
        assert!(matches!(err, EngineError::Render(RenderError::Component(_))));
        assert!(!game.is_running());
    }

    #[test]
    fn manager_needs_known_camera() {
        let mut game = game();
        assert!(matches!(
            game.add_manager(EntityManager::new("ui"), "hud"),
            Err(EngineError::UnknownCamera { .. })
        ));
        assert!(matches!(
            game.add_manager(EntityManager::new("world"), "main"),
            Err(EngineError::DuplicateManager(_))
        ));
    }

    #[test]
    fn setup_creates_cameras_managers_and_atlases() {
        let mut config = GameConfig::default();
        config.managers = vec![
            ManagerConfig {
                name: "world".into(),
                camera: "main".into(),
                atlas: Some(AtlasConfig {
                    name: "tiles".into(),
                    path: "missing.png".into(),
                    width: 32,
                    height: 32,
                    columns: 2,
                    rows: 2,
                }),
            },
            ManagerConfig {
                name: "ui".into(),
                camera: "hud".into(),
                atlas: None,
            },
        ];
        let mut game: Game<HeadlessBackend> = Game::new(config, HeadlessBackend::new());
        game.setup_from_config().unwrap();
        assert_eq!(game.managers().names().collect::<Vec<_>>(), vec!["world", "ui"]);
        assert!(game.camera("hud").is_ok());
        assert_eq!(game.manager("world").unwrap().atlas().unwrap().name(), "tiles");
        assert_eq!(game.renderer().texture_unit("tiles"), Some(0));
    }

    fn tinted(color: Vec4) -> Entity {
        let mut entity = ball(Vec3::ZERO);
        entity.add_component(FlatColor(color));
        entity
    }

    #[test]
    fn managers_draw_in_insertion_order() {
        let mut game: Game<HeadlessBackend> = Game::new(GameConfig::default(), HeadlessBackend::new());
        game.renderer_mut().create_shader_program(program()).unwrap();
        game.add_camera(Camera::new("main", Viewport::default()));
        let layers = [
            ("world", Vec4::new(1.0, 0.0, 0.0, 1.0)),
            ("ui", Vec4::new(0.0, 1.0, 0.0, 1.0)),
            ("text", Vec4::new(0.0, 0.0, 1.0, 1.0)),
        ];
        for (name, color) in layers {
            let mut manager = EntityManager::new(name);
            manager.add_entity(tinted(color));
            game.add_manager(manager, "main").unwrap();
        }
        game.frame(16.0).unwrap();

        let colors = game.renderer().backend().uniform_uploads("u_Color");
        let expected: Vec<_> = layers.iter().map(|(_, c)| UniformValue::Vec4(*c)).collect();
        assert_eq!(colors, expected);
        assert_eq!(game.renderer().stats().draw_calls, 3);
    }

    #[test]
    fn setup_keeps_config_order_and_shares_atlases() {
        let sheet = AtlasConfig {
            name: "sheet".into(),
            path: "missing.png".into(),
            width: 32,
            height: 32,
            columns: 2,
            rows: 2,
        };
        let mut config = GameConfig::default();
        config.managers = ["world", "ui", "text"]
            .into_iter()
            .map(|name| ManagerConfig {
                name: name.into(),
                camera: "main".into(),
                atlas: (name != "text").then(|| sheet.clone()),
            })
            .collect();
        let mut game: Game<HeadlessBackend> = Game::new(config, HeadlessBackend::new());
        game.setup_from_config().unwrap();

        assert_eq!(game.managers().names().collect::<Vec<_>>(), vec!["world", "ui", "text"]);
        assert_eq!(game.manager("ui").unwrap().atlas().unwrap().name(), "sheet");
        assert_eq!(game.renderer().texture_unit("sheet"), Some(0));
        assert_eq!(game.renderer().backend().live_textures(), 1);
    }
}
