use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};

use chunkstream::biome::{self, BiomeRegistry};
use chunkstream::cli::{self, Args};
use chunkstream::composer::FrameComposer;
use chunkstream::config::{self, AtlasMap};
use chunkstream::coords::Frustum;
use chunkstream::error::EngineError;
use chunkstream::persistence::{OpenOptions, PersistenceStore};
use chunkstream::pipeline::{default_worker_count, GenerationPipeline};
use chunkstream::profile::{FrameSample, ProfileLog};
use chunkstream::renderer::{NullRenderer, Renderer};
use chunkstream::residency::ResidencyManager;
use chunkstream::terrain::NoiseTerrain;

const TICK_SECONDS: f32 = 1.0 / 20.0;

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    // Unused beyond acknowledging it: a headless build has no HUD to gate.
    let _hud_enabled = std::env::var("MTL_HUD_ENABLED").is_ok();

    let args = match cli::parse(std::env::args()) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("argument error: {err}");
            return ExitCode::from(64);
        }
    };

    if args.list_worlds {
        return list_worlds(&args);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}

fn list_worlds(args: &Args) -> ExitCode {
    match PersistenceStore::list_worlds(&args.worlds_root) {
        Ok(names) => {
            for name in names {
                println!("{name}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to list worlds under {}: {err}", args.worlds_root.display());
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> Result<(), ExitCode> {
    let now_secs = chrono::Utc::now().timestamp();
    let opts = OpenOptions { force_new: args.new_world, seed: args.seed, difficulty: Some(args.difficulty), description: args.description.clone() };

    let persistence = match PersistenceStore::open_world(&args.worlds_root, &args.world, opts, now_secs) {
        Ok(store) => Arc::new(store),
        Err(EngineError::WorldAlreadyExists(name)) => {
            eprintln!("world '{name}' already exists; drop --new-world to reuse it");
            return Err(ExitCode::from(2));
        }
        Err(EngineError::SeedMismatch { name, on_disk, requested }) => {
            eprintln!("world '{name}' was created with seed {on_disk}, but --seed {requested} was requested");
            return Err(ExitCode::from(3));
        }
        Err(err) => {
            eprintln!("failed to open world: {err}");
            return Err(ExitCode::from(1));
        }
    };

    let seed = persistence.meta().seed;
    let biomes = Arc::new(
        biome::load_biome_registry(Path::new("config/biomes.ron")).unwrap_or_else(|_| BiomeRegistry::default()),
    );
    let terrain = Arc::new(NoiseTerrain::new(seed as u32, biomes));

    let pipeline = GenerationPipeline::new(terrain, persistence.clone(), 512, 512, default_worker_count());
    let tuning = config::load_graphics_tuning(Path::new("config/graphics.ron")).unwrap_or_default();
    let mut residency = ResidencyManager::new(pipeline, persistence.clone(), persistence.meta().difficulty, &tuning);

    let mut composer = FrameComposer::new(&tuning);
    let visuals = config::load_block_visuals(Path::new("config/block_visuals.ron"))
        .unwrap_or_else(|_| config::default_block_visuals());
    let atlas = AtlasMap::new(tuning.tiles_per_row, visuals);
    let mut renderer = NullRenderer::default();

    let mut profile_log = match &args.profile_log {
        Some(path) => Some(ProfileLog::create(path).map_err(|err| {
            eprintln!("failed to create profile log at {}: {err}", path.display());
            ExitCode::from(1)
        })?),
        None => None,
    };

    let mut last_frame_ms = 0.0f32;
    let mut frame: u64 = 0;
    let max_frames = args.max_frames;
    let profile_frames = args.profile_frames;

    loop {
        if let Some(limit) = max_frames {
            if frame >= limit {
                break;
            }
        }
        if let (Some(_), Some(limit)) = (&profile_log, profile_frames) {
            if frame >= limit {
                break;
            }
        }

        let frame_start = Instant::now();

        // Headless stand-in for a player camera: orbit slowly around the
        // world origin so the residency manager and composer see a moving
        // observer without an input/rendering surface to drive one.
        let angle = frame as f32 * 0.01;
        let radius = 48.0;
        let observer_pos = Vec3::new(angle.cos() * radius, 80.0, angle.sin() * radius);
        let observer_front = Vec3::new(-angle.sin(), 0.0, angle.cos()).normalize_or_zero();

        let report = residency.update(observer_pos, observer_front, TICK_SECONDS);

        let view = Mat4::look_at_rh(observer_pos, observer_pos + observer_front, Vec3::Y);
        let proj = Mat4::perspective_rh(70f32.to_radians(), 16.0 / 9.0, 0.1, 2000.0);
        let frustum = Frustum::from_view_projection(proj * view);

        let stats = composer.compose(residency.resident(), &frustum, observer_pos, &atlas, &tuning, last_frame_ms);

        if stats.changed {
            let bytes = chunkstream::composer::vertices_to_bytes(composer.combined_vertices());
            if let Err(err) = renderer.upload_mesh(&bytes, chunkstream::composer::ComposedVertex::STRIDE, composer.combined_indices()) {
                tracing::warn!(%err, "renderer upload failed");
            }
        }
        let _ = renderer.draw([0.4, 0.6, 0.9, 1.0]);

        last_frame_ms = frame_start.elapsed().as_secs_f32() * 1000.0;

        if let Some(log) = profile_log.as_mut() {
            let sample = FrameSample {
                frame,
                frame_ms: last_frame_ms,
                loaded_chunks: residency.resident_count(),
                mesh: stats,
                stream_last_ms: last_frame_ms,
                stream_avg_ms: last_frame_ms,
                stream_max_ms: last_frame_ms,
                queued_candidates: residency.queued_candidate_count(),
                queued_generations: residency.pending_generation_count(),
                completed_async: report.installed,
                immediate_loaded: 0,
                unloaded: report.evicted,
                pending_generations: residency.pending_generation_count(),
            };
            if let Err(err) = log.record(&sample) {
                tracing::warn!(%err, "failed to write profile sample");
            }
        }

        frame += 1;
    }

    if let Some(mut log) = profile_log {
        let _ = log.finish();
    }

    let summary = residency.unload_all(false);
    tracing::info!(saved = summary.saved_count, errors = summary.error_count, "world unloaded");

    Ok(())
}
