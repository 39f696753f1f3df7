//! The residency manager (§4.F): maintains the set of resident chunks as
//! the observer moves, drives the async pipeline, enforces the per-frame
//! admission budget, runs the autosave timer, and schedules region
//! maintenance.
//!
//! Generalizes the teacher's `chunk/streaming.rs` (`StreamChunksCtx`,
//! `update_lods_and_schedule`, `unload_and_cleanup`) off Bevy's ECS
//! scheduler: everything here is a plain method on an owned struct, called
//! once per simulation step from a single thread (§5).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;

use crate::block::Block;
use crate::chunk::Chunk;
use crate::config::GraphicsTuning;
use crate::coords::{ChunkCoord, CHUNK_HEIGHT};
use crate::persistence::{Difficulty, PersistenceStore, RegionCoord};
use crate::pipeline::GenerationPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveReason {
    Timer,
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutosaveSummary {
    pub saved_count: usize,
    pub error_count: usize,
    pub duration: Duration,
    pub reason: AutosaveReason,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub installed: usize,
    pub evicted: usize,
    pub autosave: Option<AutosaveSummary>,
    pub maintenance_regions: Vec<RegionCoord>,
}

pub struct ResidencyManager {
    resident: HashMap<ChunkCoord, Chunk>,
    in_flight: HashSet<ChunkCoord>,
    pipeline: GenerationPipeline,
    persistence: Arc<PersistenceStore>,

    view_distance: i32,
    max_chunks_per_frame: usize,

    autosave_interval_secs: f32,
    autosave_accum: f32,

    backup_retention: usize,
    backup_cooldown_secs: f32,
    maintenance_interval_min_secs: f32,
    maintenance_interval_max_secs: f32,
    maintenance_activity_threshold: f32,
    maintenance_accum: f32,
    activity_score: f32,
    touched_regions: HashSet<RegionCoord>,
    region_backup_cooldowns: HashMap<RegionCoord, f64>,

    /// A monotonic clock advanced only by `update`'s `dt`, not wall-clock
    /// time, so maintenance cooldowns stay deterministic and testable.
    clock_secs: f64,
}

impl ResidencyManager {
    #[must_use]
    pub fn new(pipeline: GenerationPipeline, persistence: Arc<PersistenceStore>, difficulty: Difficulty, tuning: &GraphicsTuning) -> Self {
        let meta = persistence.meta();
        Self {
            resident: HashMap::new(),
            in_flight: HashSet::new(),
            pipeline,
            persistence,
            view_distance: difficulty.view_distance(),
            max_chunks_per_frame: difficulty.max_chunks_per_frame(),
            autosave_interval_secs: meta.autosave_interval_secs,
            autosave_accum: 0.0,
            backup_retention: meta.backup_retention,
            backup_cooldown_secs: tuning.backup_cooldown_secs,
            maintenance_interval_min_secs: tuning.maintenance_interval_min_secs,
            maintenance_interval_max_secs: tuning.maintenance_interval_max_secs,
            maintenance_activity_threshold: tuning.maintenance_activity_threshold,
            maintenance_accum: 0.0,
            activity_score: 0.0,
            touched_regions: HashSet::new(),
            region_backup_cooldowns: HashMap::new(),
            clock_secs: 0.0,
        }
    }

    #[must_use]
    pub fn resident(&self) -> &HashMap<ChunkCoord, Chunk> {
        &self.resident
    }

    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    #[must_use]
    pub fn pending_generation_count(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn queued_candidate_count(&self) -> usize {
        self.pipeline.candidate_queue_len()
    }

    pub fn get_block_world(&self, bx: i32, by: i32, bz: i32) -> Block {
        if !(0..CHUNK_HEIGHT).contains(&by) {
            return Block::Air;
        }
        let (coord, lx, lz) = ChunkCoord::from_world_block(bx, bz);
        self.resident.get(&coord).and_then(|c| c.get_block(lx, by, lz).ok()).unwrap_or(Block::Air)
    }

    pub fn set_block_world(&mut self, bx: i32, by: i32, bz: i32, block: Block) -> bool {
        if !(0..CHUNK_HEIGHT).contains(&by) {
            return false;
        }
        let (coord, lx, lz) = ChunkCoord::from_world_block(bx, bz);
        match self.resident.get_mut(&coord) {
            Some(chunk) => chunk.set_block(lx, by, lz, block).is_ok(),
            None => false,
        }
    }

    fn current_maintenance_interval(&self) -> f32 {
        let ratio = self.activity_score / self.maintenance_activity_threshold.max(1.0);
        let interval = self.maintenance_interval_max_secs / (1.0 + ratio);
        interval.clamp(self.maintenance_interval_min_secs, self.maintenance_interval_max_secs)
    }

    /// One simulation step (§4.F "Update algorithm"): install arrived
    /// results, enqueue new candidates, evict out-of-band chunks, tick
    /// autosave, and tick the maintenance scheduler.
    pub fn update(&mut self, observer_pos: Vec3, observer_front: Vec3, dt: f32) -> UpdateReport {
        self.clock_secs += f64::from(dt);
        let observer_xz = (observer_pos.x, observer_pos.z);

        // 1 + 3: drain results, install the nearest `max_chunks_per_frame`,
        // and push anything left over back onto the queue.
        let mut pending = self.pipeline.drain_results();
        pending.sort_by(|a, b| a.coord.center_dist2(observer_xz).total_cmp(&b.coord.center_dist2(observer_xz)));

        let mut installed = 0;
        for (i, result) in pending.into_iter().enumerate() {
            self.in_flight.remove(&result.coord);
            if i < self.max_chunks_per_frame {
                self.resident.insert(result.coord, result.chunk);
                installed += 1;
            } else {
                self.in_flight.insert(result.coord);
                let _ = self.pipeline.requeue_result(result);
            }
        }

        // 2. Compute the ideal set and enqueue anything missing, nearest
        // first with a mild forward-bias tie-break.
        let (observer_chunk, _, _) = ChunkCoord::from_world_block(observer_pos.x.floor() as i32, observer_pos.z.floor() as i32);
        let mut candidates: Vec<(ChunkCoord, f32, f32)> = Vec::new();
        for dx in -self.view_distance..=self.view_distance {
            for dz in -self.view_distance..=self.view_distance {
                let coord = ChunkCoord::new(observer_chunk.cx + dx, observer_chunk.cz + dz);
                if self.resident.contains_key(&coord) || self.in_flight.contains(&coord) {
                    continue;
                }
                let dist2 = coord.center_dist2(observer_xz);
                let to_chunk = Vec3::new(coord.origin().x + 8.0 - observer_pos.x, 0.0, coord.origin().z + 8.0 - observer_pos.z);
                let forward_dot = to_chunk.normalize_or_zero().dot(observer_front);
                candidates.push((coord, dist2, forward_dot));
            }
        }
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.2.total_cmp(&a.2)));

        for (coord, _, _) in candidates {
            if self.pipeline.try_enqueue(coord) {
                self.in_flight.insert(coord);
            } else {
                // Candidate queue full: this and every farther candidate
                // (sorted ascending) are dropped this tick, not blocked on.
                break;
            }
        }

        // 4. Evict everything outside the hysteresis band.
        let hysteresis_radius = self.view_distance + 1;
        let stale: Vec<ChunkCoord> = self.resident.keys().copied().filter(|c| c.chebyshev_dist(observer_chunk) > hysteresis_radius).collect();
        let mut evicted = 0;
        for coord in stale {
            if let Some(chunk) = self.resident.remove(&coord) {
                if chunk.modified {
                    match self.persistence.save_chunk(&chunk) {
                        Ok(()) => {
                            self.touched_regions.insert(RegionCoord::from_chunk(coord));
                            self.activity_score += 1.0;
                        }
                        Err(err) => tracing::warn!(?coord, %err, "failed to persist evicted chunk"),
                    }
                }
                evicted += 1;
            }
        }

        // 5. Autosave tick.
        self.autosave_accum += dt;
        let autosave = if self.autosave_interval_secs > 0.0 && self.autosave_accum >= self.autosave_interval_secs {
            self.autosave_accum = 0.0;
            Some(self.run_autosave(AutosaveReason::Timer))
        } else {
            None
        };

        // 6. Maintenance scheduler: activity-weighted, cooldown-throttled
        // per region.
        self.maintenance_accum += dt;
        let mut maintenance_regions = Vec::new();
        if self.activity_score > self.maintenance_activity_threshold && self.maintenance_accum >= self.current_maintenance_interval() {
            self.maintenance_accum = 0.0;
            let regions: Vec<RegionCoord> = self.touched_regions.drain().collect();
            for region in regions {
                let last = self.region_backup_cooldowns.get(&region).copied().unwrap_or(f64::NEG_INFINITY);
                if self.clock_secs - last < f64::from(self.backup_cooldown_secs) {
                    self.touched_regions.insert(region);
                    continue;
                }
                match self.persistence.rotate_backup(region, self.backup_retention, self.clock_secs as i64) {
                    Ok(Some(_)) => {
                        self.region_backup_cooldowns.insert(region, self.clock_secs);
                        maintenance_regions.push(region);
                    }
                    Ok(None) => {}
                    Err(err) => tracing::warn!(?region, %err, "backup rotation failed"),
                }
            }
            self.activity_score = 0.0;
        }

        UpdateReport { installed, evicted, autosave, maintenance_regions }
    }

    /// Persist every modified resident chunk, clearing their flags. Used
    /// both by the autosave tick and available for a caller-triggered
    /// manual save. Exactly one summary is produced per call (§9: the
    /// teacher's apparent duplicate-autosave-dispatch bug is not
    /// reproduced here).
    pub fn run_autosave(&mut self, reason: AutosaveReason) -> AutosaveSummary {
        let start = Instant::now();
        let mut saved = 0;
        let mut errors = 0;
        for (coord, chunk) in &mut self.resident {
            if !chunk.modified {
                continue;
            }
            match self.persistence.save_chunk(chunk) {
                Ok(()) => {
                    chunk.clear_modified();
                    saved += 1;
                    self.touched_regions.insert(RegionCoord::from_chunk(*coord));
                }
                Err(err) => {
                    tracing::warn!(?coord, %err, "autosave failed for chunk");
                    errors += 1;
                }
            }
        }
        self.activity_score += saved as f32;
        let _ = self.persistence.touch_autosave(self.clock_secs as i64);
        AutosaveSummary { saved_count: saved, error_count: errors, duration: start.elapsed(), reason }
    }

    /// Close the candidate queue, drain the result queue (installing or
    /// discarding per `discard_pending`), persist every modified resident
    /// chunk, empty the residency set, and join the worker pool.
    #[must_use]
    pub fn unload_all(mut self, discard_pending: bool) -> AutosaveSummary {
        let pending = self.pipeline.drain_results();
        if !discard_pending {
            for result in pending {
                self.resident.insert(result.coord, result.chunk);
            }
        }

        let coords: Vec<ChunkCoord> = self.resident.keys().copied().collect();
        let mut saved = 0;
        let mut errors = 0;
        for coord in coords {
            if let Some(chunk) = self.resident.remove(&coord) {
                if chunk.modified {
                    match self.persistence.save_chunk(&chunk) {
                        Ok(()) => saved += 1,
                        Err(_) => errors += 1,
                    }
                }
            }
        }

        self.pipeline.shutdown();
        AutosaveSummary { saved_count: saved, error_count: errors, duration: Duration::ZERO, reason: AutosaveReason::Manual }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::BiomeRegistry;
    use crate::persistence::OpenOptions;
    use crate::terrain::NoiseTerrain;
    use tempfile::tempdir;

    fn test_manager(dir: &std::path::Path) -> ResidencyManager {
        let persistence = Arc::new(PersistenceStore::open_world(dir, "alpha", OpenOptions::default(), 1000).unwrap());
        let terrain = Arc::new(NoiseTerrain::new(1, Arc::new(BiomeRegistry::default())));
        let pipeline = GenerationPipeline::new(terrain, persistence.clone(), 64, 64, 2);
        let tuning = GraphicsTuning::default();
        ResidencyManager::new(pipeline, persistence, Difficulty::Peaceful, &tuning)
    }

    fn pump_until_installed(mgr: &mut ResidencyManager, min_count: usize, max_ticks: usize) {
        for _ in 0..max_ticks {
            mgr.update(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), 0.05);
            if mgr.resident_count() >= min_count {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn update_eventually_populates_the_view_distance_area() {
        let dir = tempdir().unwrap();
        let mut mgr = test_manager(dir.path());
        pump_until_installed(&mut mgr, 1, 200);
        assert!(mgr.resident_count() > 0);
    }

    #[test]
    fn set_then_get_block_world_round_trips_and_flags_modified() {
        let dir = tempdir().unwrap();
        let mut mgr = test_manager(dir.path());
        pump_until_installed(&mut mgr, 1, 200);

        let coord = *mgr.resident().keys().next().unwrap();
        let bx = coord.cx * 16 + 1;
        let bz = coord.cz * 16 + 1;

        assert!(mgr.set_block_world(bx, 50, bz, Block::Stone));
        assert_eq!(mgr.get_block_world(bx, 50, bz), Block::Stone);
        assert!(mgr.resident().get(&coord).unwrap().modified);
    }

    #[test]
    fn non_resident_block_access_degrades_to_air_and_false() {
        let dir = tempdir().unwrap();
        let mgr = test_manager(dir.path());
        assert_eq!(mgr.get_block_world(1_000_000, 10, 1_000_000), Block::Air);
    }

    #[test]
    fn autosave_timer_fires_once_and_clears_modified() {
        let dir = tempdir().unwrap();
        let mut mgr = test_manager(dir.path());
        mgr.autosave_interval_secs = 2.0;
        pump_until_installed(&mut mgr, 1, 200);

        let coord = *mgr.resident().keys().next().unwrap();
        let bx = coord.cx * 16;
        let bz = coord.cz * 16;
        mgr.set_block_world(bx, 10, bz, Block::Stone);

        let mut summary = None;
        for _ in 0..10 {
            let report = mgr.update(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), 1.0);
            if report.autosave.is_some() {
                summary = report.autosave;
                break;
            }
        }
        let summary = summary.expect("autosave should fire within 10 one-second ticks");
        assert_eq!(summary.reason, AutosaveReason::Timer);
        assert_eq!(summary.error_count, 0);
        assert!(!mgr.resident().get(&coord).unwrap().modified);
    }

    #[test]
    fn unload_all_empties_residency_and_persists_modified_chunks() {
        let dir = tempdir().unwrap();
        let mut mgr = test_manager(dir.path());
        pump_until_installed(&mut mgr, 1, 200);

        let coord = *mgr.resident().keys().next().unwrap();
        mgr.set_block_world(coord.cx * 16, 10, coord.cz * 16, Block::Stone);

        let summary = mgr.unload_all(false);
        assert_eq!(summary.saved_count, 1);
        assert_eq!(summary.error_count, 0);
    }
}
