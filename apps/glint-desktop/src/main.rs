use anyhow::{Context, Result};
use clap::Parser;
use glam::{Vec2, Vec3};
use glint_common::Viewport;
use glint_kernel::{Clock, Game, GameConfig, WallClock};
use glint_render_wgpu::WgpuBackend;
use glint_tools::{DemoScene, Inspector, demo};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

const PAN_STEP: f32 = 40.0;
const ZOOM_STEP: f32 = 1.25;

#[derive(Parser)]
#[command(name = "glint-desktop", about = "glint demo scene in a window")]
struct Cli {
    #[arg(short, long)]
    verbose: bool,

    /// YAML or JSON game config
    #[arg(short, long)]
    config: Option<PathBuf>,
}

struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    game: Game<WgpuBackend>,
    scene: DemoScene,
}

struct GpuApp {
    settings: GameConfig,
    gpu: Option<Gpu>,
    clock: WallClock,
    paused: bool,
}

impl GpuApp {
    fn new(settings: GameConfig) -> Self {
        Self {
            settings,
            gpu: None,
            clock: WallClock::default(),
            paused: false,
        }
    }

    fn init(&self, event_loop: &ActiveEventLoop) -> Result<Gpu> {
        let attrs = Window::default_attributes()
            .with_title(self.settings.title.clone())
            .with_inner_size(PhysicalSize::new(self.settings.width, self.settings.height));
        let window = Arc::new(event_loop.create_window(attrs).context("create window")?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone()).context("create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("find adapter")?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("glint_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("create device")?;

        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .context("surface has no formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or_default(),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        tracing::info!(backend = adapter.get_info().backend.to_str(), "GPU initialized");

        let mut settings = self.settings.clone();
        settings.width = config.width;
        settings.height = config.height;
        let mut game = Game::new(settings, WgpuBackend::new(device, queue, format));
        game.setup_from_config().context("set up managers from config")?;
        let scene = demo::build(&mut game).context("build demo scene")?;

        Ok(Gpu {
            window,
            surface,
            config,
            game,
            scene,
        })
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) {
        if key == KeyCode::Escape {
            event_loop.exit();
            return;
        }
        if key == KeyCode::Space {
            self.paused = !self.paused;
            tracing::info!(paused = self.paused, "pause toggled");
            return;
        }
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        if key == KeyCode::KeyI {
            tracing::info!("\n{}", Inspector::game(&gpu.game));
            return;
        }
        let Ok(camera) = gpu.game.camera_mut(demo::CAMERA) else {
            return;
        };
        let pan = PAN_STEP / camera.zoom;
        match key {
            KeyCode::ArrowLeft | KeyCode::KeyA => camera.position -= Vec2::X * pan,
            KeyCode::ArrowRight | KeyCode::KeyD => camera.position += Vec2::X * pan,
            KeyCode::ArrowUp | KeyCode::KeyW => camera.position += Vec2::Y * pan,
            KeyCode::ArrowDown | KeyCode::KeyS => camera.position -= Vec2::Y * pan,
            KeyCode::Equal | KeyCode::NumpadAdd => camera.zoom *= ZOOM_STEP,
            KeyCode::Minus | KeyCode::NumpadSubtract => camera.zoom /= ZOOM_STEP,
            KeyCode::KeyF => {
                if camera.following().is_some() {
                    camera.unfollow();
                } else if let Some(block) = gpu.scene.blocks.first() {
                    camera.follow(demo::MANAGER, *block, Vec3::ZERO);
                }
            }
            KeyCode::KeyR => {
                camera.unfollow();
                camera.position = Vec2::ZERO;
                camera.zoom = 1.0;
            }
            _ => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let delta = self.clock.delta_ms();
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(gpu.game.renderer().backend().device(), &gpu.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        gpu.game
            .renderer_mut()
            .backend_mut()
            .set_target(view, gpu.config.width, gpu.config.height);

        let delta = if self.paused { 0.0 } else { delta };
        if let Err(e) = gpu.game.frame(delta) {
            tracing::error!(error = %e, "frame failed, exiting");
            event_loop.exit();
            return;
        }
        output.present();
        gpu.window.request_redraw();
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(gpu) => {
                self.gpu = Some(gpu);
                self.clock = WallClock::default();
            }
            Err(e) => {
                tracing::error!("startup failed: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.config.width = new_size.width.max(1);
                    gpu.config.height = new_size.height.max(1);
                    gpu.surface.configure(gpu.game.renderer().backend().device(), &gpu.config);
                    gpu.game
                        .set_viewport(Viewport::new(gpu.config.width, gpu.config.height));
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.handle_key(event_loop, key);
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => GameConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => GameConfig::default(),
    };

    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        settings.log_filter.clone().unwrap_or_else(|| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("glint-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(settings);
    event_loop.run_app(&mut app)?;

    Ok(())
}
