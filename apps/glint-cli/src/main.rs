use anyhow::Context;
use clap::{Parser, Subcommand};
use glint_kernel::{FixedClock, Game, GameConfig};
use glint_render::HeadlessBackend;
use glint_tools::{Inspector, demo};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "glint-cli", about = "Headless runner and inspector for the glint engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version, crate info and the built-in programs
    Info,
    /// Run the demo scene on the headless backend and print a summary
    Run {
        /// YAML or JSON game config
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of frames to run
        #[arg(short, long, default_value = "120")]
        frames: u64,
        /// Fixed frame delta in milliseconds
        #[arg(short, long, default_value = "16.0")]
        delta_ms: f32,
    },
    /// Run a few frames, then list every manager's groups and entities
    Inspect {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value = "1")]
        frames: u64,
        /// Only list entities with this tag
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Load and validate a config file
    CheckConfig {
        path: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GameConfig> {
    match path {
        Some(path) => GameConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(GameConfig::default()),
    }
}

fn init_logging(verbose: bool, config: &GameConfig) {
    let filter = if verbose {
        "debug".to_string()
    } else {
        config.log_filter.clone().unwrap_or_else(|| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}

fn demo_game(config: GameConfig, frames: u64, delta_ms: f32) -> anyhow::Result<Game<HeadlessBackend>> {
    let mut game = Game::new(config, HeadlessBackend::new());
    game.setup_from_config().context("setting up managers from config")?;
    demo::build(&mut game).context("building demo scene")?;
    let ran = game
        .run(&mut FixedClock(delta_ms), Some(frames))
        .context("running frames")?;
    tracing::debug!(frames = ran, delta_ms, "headless run complete");
    Ok(game)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Info => {
            init_logging(cli.verbose, &GameConfig::default());
            println!("glint-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("kernel: {}", glint_kernel::crate_info());
            println!("render: {}", glint_render::crate_info());
            println!("render-wgpu: {}", glint_render_wgpu::crate_info());
            println!("tools: {}", glint_tools::crate_info());
            println!("built-in programs:");
            for program in glint_render_wgpu::builtin_programs() {
                let attributes: Vec<_> = program
                    .vertex
                    .attributes
                    .iter()
                    .map(|a| format!("{}[{}]", a.name, a.size))
                    .collect();
                let uniforms: Vec<_> = program.uniforms().map(|u| u.name.as_str()).collect();
                println!(
                    "  {:<8} attributes: {}  uniforms: {}",
                    program.name,
                    attributes.join(" "),
                    uniforms.join(" ")
                );
            }
        }
        Commands::Run {
            config,
            frames,
            delta_ms,
        } => {
            let config = load_config(config.as_deref())?;
            init_logging(cli.verbose, &config);
            let game = demo_game(config, frames, delta_ms)?;
            println!("{}", Inspector::game(&game));
        }
        Commands::Inspect { config, frames, tag } => {
            let config = load_config(config.as_deref())?;
            init_logging(cli.verbose, &config);
            let game = demo_game(config, frames, 16.0)?;
            for manager in game.managers().iter() {
                println!("{}", Inspector::manager(manager));
                for id in Inspector::list_entities(manager) {
                    let Some(info) = Inspector::inspect_entity(manager, id) else {
                        continue;
                    };
                    if tag.as_deref().is_none_or(|t| t == info.tag) {
                        println!("  {info}");
                    }
                }
            }
        }
        Commands::CheckConfig { path } => {
            init_logging(cli.verbose, &GameConfig::default());
            let config = load_config(Some(&path))?;
            println!(
                "{}: OK  title='{}' viewport={}x{} managers={}",
                path.display(),
                config.title,
                config.width,
                config.height,
                config.managers.len()
            );
            for manager in &config.managers {
                match &manager.atlas {
                    Some(atlas) => println!(
                        "  {} -> camera '{}', atlas '{}' ({}x{} cells from {})",
                        manager.name,
                        manager.camera,
                        atlas.name,
                        atlas.columns,
                        atlas.rows,
                        atlas.path.display()
                    ),
                    None => println!("  {} -> camera '{}'", manager.name, manager.camera),
                }
            }
        }
    }

    Ok(())
}
