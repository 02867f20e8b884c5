use glint_common::{Dimension, EntityId};
use glint_ecs::Transform;
use glint_kernel::{EntityManager, Game};
use glint_render::{FrameStats, GraphicsBackend, Renderer};
use std::fmt;

/// Read-only queries over managers and the renderer, for the CLI and
/// debugging output.
pub struct Inspector;

impl Inspector {
    pub fn manager(manager: &EntityManager) -> ManagerSummary {
        let buckets = manager
            .buckets()
            .map(|(program, model, ids)| BucketSummary {
                program: program.to_string(),
                model: model.to_string(),
                entities: ids.len(),
                floats: manager.vbo(program, model).map_or(0, |vbo| vbo.data.len()),
            })
            .collect();
        ManagerSummary {
            name: manager.name().to_string(),
            entities: manager.len(),
            pending_additions: manager.pending_additions(),
            pending_removals: manager.pending_removals(),
            atlas: manager.atlas().map(|a| a.name().to_string()),
            cached_filters: manager.cached_filters(),
            buckets,
        }
    }

    pub fn renderer<B: GraphicsBackend>(renderer: &Renderer<B>) -> RendererSummary {
        RendererSummary {
            backend: renderer.backend().name(),
            programs: renderer.program_names().map(str::to_string).collect(),
            vbos: renderer.vbo_names().count(),
            textures: renderer.texture_names().map(str::to_string).collect(),
            pending_textures: renderer.pending_textures(),
            last_frame: renderer.stats(),
        }
    }

    pub fn game<B: GraphicsBackend, D: Dimension>(game: &Game<B, D>) -> GameSummary {
        GameSummary {
            frames: game.frames(),
            elapsed_ms: game.elapsed_ms(),
            managers: game.managers().iter().map(Self::manager).collect(),
            renderer: Self::renderer(game.renderer()),
        }
    }

    pub fn inspect_entity(manager: &EntityManager, id: EntityId) -> Option<EntityInfo> {
        manager.entity(id).map(|entity| {
            let transform = entity.get::<Transform>();
            EntityInfo {
                id,
                tag: entity.tag().to_string(),
                components: entity.components().map(|c| c.kind().name()).collect(),
                position: transform.map(|t| t.position.to_array()),
                scale: transform.map(|t| t.scale.to_array()),
            }
        })
    }

    /// Active entity ids in insertion order.
    pub fn list_entities(manager: &EntityManager) -> Vec<EntityId> {
        manager.entities().map(|e| e.id()).collect()
    }
}

/// One (program, model) group and the size of its compiled buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSummary {
    pub program: String,
    pub model: String,
    pub entities: usize,
    pub floats: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSummary {
    pub name: String,
    pub entities: usize,
    pub pending_additions: usize,
    pub pending_removals: usize,
    pub atlas: Option<String>,
    pub cached_filters: usize,
    pub buckets: Vec<BucketSummary>,
}

impl fmt::Display for ManagerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Manager '{}': entities={} pending=+{}/-{} filters={}",
            self.name, self.entities, self.pending_additions, self.pending_removals, self.cached_filters
        )?;
        if let Some(atlas) = &self.atlas {
            write!(f, " atlas={atlas}")?;
        }
        for bucket in &self.buckets {
            write!(
                f,
                "\n  {}/{}: {} entities, {} floats",
                bucket.program, bucket.model, bucket.entities, bucket.floats
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererSummary {
    pub backend: &'static str,
    pub programs: Vec<String>,
    pub vbos: usize,
    pub textures: Vec<String>,
    pub pending_textures: usize,
    pub last_frame: FrameStats,
}

impl fmt::Display for RendererSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.last_frame;
        write!(
            f,
            "Renderer [{}]: programs={} vbos={} textures={} (pending {})\n  \
             last frame: draws={} vertices={} buffer_uploads={} uniform_uploads={} \
             program_switches={} texture_switches={}",
            self.backend,
            self.programs.len(),
            self.vbos,
            self.textures.len(),
            self.pending_textures,
            s.draw_calls,
            s.vertices,
            s.buffer_uploads,
            s.uniform_uploads,
            s.program_switches,
            s.texture_switches,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameSummary {
    pub frames: u64,
    pub elapsed_ms: f32,
    pub managers: Vec<ManagerSummary>,
    pub renderer: RendererSummary,
}

impl fmt::Display for GameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Game: frames={} elapsed={:.1}ms", self.frames, self.elapsed_ms)?;
        for manager in &self.managers {
            writeln!(f, "{manager}")?;
        }
        write!(f, "{}", self.renderer)
    }
}

/// Detailed info about a single entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub id: EntityId,
    pub tag: String,
    pub components: Vec<&'static str>,
    pub position: Option<[f32; 3]>,
    pub scale: Option<[f32; 3]>,
}

impl fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity [{}] '{}' [{}]", self.id, self.tag, self.components.join(", "))?;
        if let (Some(p), Some(s)) = (self.position, self.scale) {
            write!(
                f,
                " pos=({:.2}, {:.2}, {:.2}) scale=({:.2}, {:.2}, {:.2})",
                p[0], p[1], p[2], s[0], s[1], s[2]
            )?;
        }
        Ok(())
    }
}
