//! Mesh cache and frame composer (§4.H): the per-frame heart of the core.
//! Walks the resident set, culls against the frustum, drives the LOD state
//! machine with hysteresis, regenerates stale entries within a per-frame
//! mesh budget, applies chunk/vertex/index admission, and assembles one
//! combined vertex/index stream for the renderer facade.
//!
//! New module: the teacher's `chunk/lod.rs` and `chunk/frustum.rs` show the
//! decomposition style (separate LOD-threshold table, separate culling
//! pass) but neither the hysteresis state machine nor AABB-plane frustum
//! test — the teacher's LOD selection has no hysteresis and its culling is
//! a view-cone test, not `Frustum::contains_aabb` (see `coords.rs`).

use std::collections::{HashMap, HashSet};

use glam::Vec3;
use rayon::slice::ParallelSliceMut;

use crate::chunk::Chunk;
use crate::config::{AtlasMap, GraphicsTuning};
use crate::coords::{Aabb, ChunkCoord, Frustum, CHUNK_HEIGHT, CHUNK_SIDE};
use crate::mesher::{self, MeshBuffers, NeighborLookup};

/// One of the three detail tiers a chunk may be meshed at (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detail {
    Full,
    SurfaceMedium,
    SurfaceFar,
}

impl Default for Detail {
    fn default() -> Self {
        Detail::Full
    }
}

const MED_SQ: f32 = 576.0;
const FAR_SQ: f32 = 4096.0;

/// The asymmetric-threshold LOD state machine (§4.H): upgrading to a
/// coarser detail requires a farther distance than downgrading back
/// requires a nearer one, which prevents oscillation at a boundary.
#[must_use]
pub fn lod_transition(previous: Detail, dist2: f32) -> Detail {
    match previous {
        Detail::Full => {
            if dist2 > 1.1 * FAR_SQ {
                Detail::SurfaceFar
            } else if dist2 > 1.1 * MED_SQ {
                Detail::SurfaceMedium
            } else {
                Detail::Full
            }
        }
        Detail::SurfaceMedium => {
            if dist2 > 1.1 * FAR_SQ {
                Detail::SurfaceFar
            } else if dist2 < 0.85 * MED_SQ {
                Detail::Full
            } else {
                Detail::SurfaceMedium
            }
        }
        Detail::SurfaceFar => {
            if dist2 < 0.85 * MED_SQ {
                Detail::Full
            } else if dist2 < 0.8 * FAR_SQ {
                Detail::SurfaceMedium
            } else {
                Detail::SurfaceFar
            }
        }
    }
}

/// A single combined-buffer vertex: world-space position, normal, an
/// atlas-remapped UV, and a base color already multiplied by AO.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ComposedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl ComposedVertex {
    pub const STRIDE: usize = std::mem::size_of::<Self>();
}

/// Pack a vertex slice into a flat little-endian byte buffer for
/// `Renderer::upload_mesh`.
#[must_use]
pub fn vertices_to_bytes(vertices: &[ComposedVertex]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vertices.len() * ComposedVertex::STRIDE);
    for v in vertices {
        for f in v.position {
            out.extend_from_slice(&f.to_le_bytes());
        }
        for f in v.normal {
            out.extend_from_slice(&f.to_le_bytes());
        }
        for f in v.uv {
            out.extend_from_slice(&f.to_le_bytes());
        }
        for f in v.color {
            out.extend_from_slice(&f.to_le_bytes());
        }
    }
    out
}

#[derive(Default)]
struct MeshCacheEntry {
    vertices: Vec<ComposedVertex>,
    indices: Vec<u32>,
    detail: Option<Detail>,
    built_epoch: Option<u64>,
    in_use: bool,
    selected: bool,
}

impl MeshCacheEntry {
    fn is_empty(&self) -> bool {
        self.detail.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshStats {
    pub changed: bool,
    pub total_chunks: usize,
    pub visible_chunks: usize,
    pub rendered_chunks: usize,
    pub culled_chunks: usize,
    pub budget_skipped: usize,
    pub total_vertices: usize,
    pub total_indices: usize,
    pub full_chunks: usize,
    pub medium_chunks: usize,
    pub far_chunks: usize,
    pub regenerations: usize,
}

pub struct FrameComposer {
    cache: HashMap<ChunkCoord, MeshCacheEntry>,
    desired_lod: HashMap<ChunkCoord, Detail>,
    combined_vertices: Vec<ComposedVertex>,
    combined_indices: Vec<u32>,
    mesh_allowance: usize,
}

fn chunk_aabb(coord: ChunkCoord) -> Aabb {
    let origin = coord.origin();
    Aabb::new(origin, origin + Vec3::new(CHUNK_SIDE as f32, CHUNK_HEIGHT as f32, CHUNK_SIDE as f32))
}

impl FrameComposer {
    #[must_use]
    pub fn new(tuning: &GraphicsTuning) -> Self {
        Self {
            cache: HashMap::new(),
            desired_lod: HashMap::new(),
            combined_vertices: Vec::new(),
            combined_indices: Vec::new(),
            mesh_allowance: tuning.meshes_per_frame_default,
        }
    }

    #[must_use]
    pub fn combined_vertices(&self) -> &[ComposedVertex] {
        &self.combined_vertices
    }

    #[must_use]
    pub fn combined_indices(&self) -> &[u32] {
        &self.combined_indices
    }

    /// Adapt next frame's mesh-generation allowance based on how long the
    /// previous frame took relative to the soft budget (§4.H inputs).
    fn adapt_allowance(&mut self, tuning: &GraphicsTuning, last_frame_ms: f32) {
        if last_frame_ms > tuning.soft_frame_budget_ms {
            self.mesh_allowance = self.mesh_allowance.saturating_sub(1).max(tuning.meshes_per_frame_min);
        } else {
            self.mesh_allowance = (self.mesh_allowance + 1).min(tuning.meshes_per_frame_max);
        }
    }

    /// Run one frame of composition. `resident` doubles as the neighbor
    /// lookup the full mesher uses to resolve chunk-boundary faces.
    pub fn compose(
        &mut self,
        resident: &HashMap<ChunkCoord, Chunk>,
        frustum: &Frustum,
        camera_pos: Vec3,
        atlas: &AtlasMap,
        tuning: &GraphicsTuning,
        last_frame_ms: f32,
    ) -> MeshStats {
        self.adapt_allowance(tuning, last_frame_ms);

        for entry in self.cache.values_mut() {
            entry.in_use = false;
            entry.selected = false;
        }

        let mut stats = MeshStats { total_chunks: resident.len(), ..Default::default() };

        let mut candidates: Vec<(ChunkCoord, f32)> = Vec::with_capacity(resident.len());
        for (&coord, chunk) in resident {
            let aabb = chunk_aabb(coord).expand(tuning.frustum_margin);
            if !frustum.contains_aabb(aabb) {
                stats.culled_chunks += 1;
                continue;
            }
            let _ = chunk; // visibility only depends on geometry, not contents
            let dist2 = coord.center_dist2((camera_pos.x, camera_pos.z));
            candidates.push((coord, dist2));
        }
        stats.visible_chunks = candidates.len();
        // Distance sort is the hottest per-frame cost over a large resident
        // set; parallelize it the way the teacher parallelizes per-chunk work.
        candidates.par_sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut meshes_generated = 0usize;
        let mut budget_vertices = 0usize;
        let mut budget_indices = 0usize;
        let mut budget_chunks = 0usize;
        let mut selected_before: HashSet<ChunkCoord> = self.selected_set();

        for (coord, dist2) in candidates {
            let chunk = resident.get(&coord).expect("candidate drawn from resident set");
            let previous = self.desired_lod.get(&coord).copied().unwrap_or_default();
            let target = lod_transition(previous, dist2);
            self.desired_lod.insert(coord, target);

            let entry = self.cache.entry(coord).or_default();
            let regen_required = entry.is_empty() || entry.detail != Some(target) || entry.built_epoch != Some(chunk.epoch());

            if regen_required && meshes_generated < self.mesh_allowance {
                let raw = build_raw_mesh(chunk, resident, target, tuning);
                let composed = compose_vertices(&raw, coord, atlas);
                entry.vertices = composed;
                entry.indices = raw.indices;
                entry.detail = Some(target);
                entry.built_epoch = Some(chunk.epoch());
                meshes_generated += 1;
                stats.regenerations += 1;
            } else if regen_required {
                entry.in_use = true;
                stats.budget_skipped += 1;
                continue;
            }

            let v_count = entry.vertices.len();
            let i_count = entry.indices.len();
            let would_overflow = budget_chunks + 1 > tuning.max_render_chunks
                || budget_vertices + v_count > tuning.max_vertex_budget
                || budget_indices + i_count > tuning.max_index_budget;

            if would_overflow {
                entry.in_use = true;
                entry.selected = false;
                stats.budget_skipped += 1;
                continue;
            }

            entry.in_use = true;
            entry.selected = true;
            budget_chunks += 1;
            budget_vertices += v_count;
            budget_indices += i_count;
            stats.rendered_chunks += 1;
            stats.total_vertices += v_count;
            stats.total_indices += i_count;
            match entry.detail {
                Some(Detail::Full) => stats.full_chunks += 1,
                Some(Detail::SurfaceMedium) => stats.medium_chunks += 1,
                Some(Detail::SurfaceFar) => stats.far_chunks += 1,
                None => unreachable!("entry was just built or already valid"),
            }
        }

        self.cache.retain(|coord, entry| {
            if !entry.in_use {
                self.desired_lod.remove(coord);
            }
            entry.in_use
        });

        let selected_after = self.selected_set();
        stats.changed = selected_after != std::mem::take(&mut selected_before) || self.combined_vertices.is_empty();
        if stats.changed {
            self.rebuild_combined();
        }

        stats
    }

    fn selected_set(&self) -> HashSet<ChunkCoord> {
        self.cache.iter().filter(|(_, e)| e.selected).map(|(c, _)| *c).collect()
    }

    fn rebuild_combined(&mut self) {
        self.combined_vertices.clear();
        self.combined_indices.clear();
        for entry in self.cache.values().filter(|e| e.selected) {
            let base = self.combined_vertices.len() as u32;
            self.combined_vertices.extend_from_slice(&entry.vertices);
            self.combined_indices.extend(entry.indices.iter().map(|i| i + base));
        }
    }
}

fn build_raw_mesh(chunk: &Chunk, resident: &HashMap<ChunkCoord, Chunk>, target: Detail, tuning: &GraphicsTuning) -> MeshBuffers {
    match target {
        Detail::Full => mesher::generate_mesh(chunk, resident as &dyn NeighborLookup),
        Detail::SurfaceMedium => mesher::generate_surface_mesh(chunk, tuning.surface_medium_cell, true, tuning.skirt_depth),
        Detail::SurfaceFar => mesher::generate_surface_mesh(chunk, tuning.surface_far_cell, true, tuning.skirt_depth),
    }
}

fn compose_vertices(raw: &MeshBuffers, coord: ChunkCoord, atlas: &AtlasMap) -> Vec<ComposedVertex> {
    let origin = coord.origin();
    raw.vertices
        .iter()
        .map(|v| {
            let base = atlas.base_color(v.block);
            let uv = atlas.remap_uv(v.uv, v.block);
            ComposedVertex {
                position: (v.position + origin).to_array(),
                normal: v.normal.to_array(),
                uv: uv.to_array(),
                color: [base[0] * v.ao, base[1] * v.ao, base[2] * v.ao, base[3]],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;

    fn chunk_with_floor(coord: ChunkCoord) -> Chunk {
        let mut c = Chunk::new(coord);
        for x in 0..CHUNK_SIDE {
            for z in 0..CHUNK_SIDE {
                c.set_block(x, 0, z, Block::Stone).unwrap();
            }
        }
        c.clear_modified();
        c
    }

    fn identity_frustum() -> Frustum {
        let view = glam::Mat4::look_at_rh(Vec3::new(0.0, 100.0, 0.0), Vec3::new(0.0, 0.0, -1.0), Vec3::Y);
        let proj = glam::Mat4::perspective_rh(100f32.to_radians(), 1.0, 0.1, 10_000.0);
        Frustum::from_view_projection(proj * view)
    }

    #[test]
    fn lod_thresholds_match_spec_table() {
        assert_eq!(lod_transition(Detail::Full, 20.0 * 20.0), Detail::Full);
        assert_eq!(lod_transition(Detail::Full, 30.0 * 30.0), Detail::SurfaceMedium);
        assert_eq!(lod_transition(Detail::SurfaceMedium, 75.0 * 75.0), Detail::SurfaceFar);
        assert_eq!(lod_transition(Detail::SurfaceFar, 200.0 * 200.0), Detail::SurfaceFar);
    }

    #[test]
    fn lod_is_stable_within_hysteresis_band() {
        // A chunk sitting just inside the upgrade threshold should not
        // bounce back down on the very next frame at a slightly smaller
        // distance within the band.
        let at_threshold = 1.1 * MED_SQ + 1.0;
        let just_below = 0.9 * MED_SQ;
        let medium = lod_transition(Detail::Full, at_threshold);
        assert_eq!(medium, Detail::SurfaceMedium);
        assert_eq!(lod_transition(medium, just_below), Detail::SurfaceMedium);
    }

    #[test]
    fn budget_admits_only_the_nearest_chunks() {
        let mut resident = HashMap::new();
        for i in 0..5 {
            let coord = ChunkCoord::new(i, 0);
            resident.insert(coord, chunk_with_floor(coord));
        }
        let mut tuning = GraphicsTuning::default();
        tuning.max_render_chunks = 2;
        tuning.meshes_per_frame_default = 10;
        tuning.meshes_per_frame_max = 10;

        let mut composer = FrameComposer::new(&tuning);
        let atlas = AtlasMap::default();
        let frustum = identity_frustum();
        let stats = composer.compose(&resident, &frustum, Vec3::new(0.0, 5.0, 0.0), &atlas, &tuning, 0.0);

        assert_eq!(stats.rendered_chunks, 2);
        assert_eq!(stats.budget_skipped, 3);
    }

    #[test]
    fn unchanged_selection_does_not_mark_combined_buffers_changed() {
        let mut resident = HashMap::new();
        let coord = ChunkCoord::new(0, 0);
        resident.insert(coord, chunk_with_floor(coord));

        let tuning = GraphicsTuning::default();
        let mut composer = FrameComposer::new(&tuning);
        let atlas = AtlasMap::default();
        let frustum = identity_frustum();

        let first = composer.compose(&resident, &frustum, Vec3::new(0.0, 5.0, 0.0), &atlas, &tuning, 0.0);
        assert!(first.changed);
        let second = composer.compose(&resident, &frustum, Vec3::new(0.0, 5.0, 0.0), &atlas, &tuning, 0.0);
        assert!(!second.changed);
    }
}
