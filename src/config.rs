//! Engine-wide tuning: render/mesh budgets and the atlas-tile map the
//! composer uses to remap mesher UVs and assign per-block base colors.
//!
//! RON-loadable and hot-reloadable in the teacher's `settings/mod.rs` +
//! `ron/mod.rs` idiom (serde-default-fn fields, a `notify`-backed watcher
//! flipping a shared `changed` flag the caller polls once per frame).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::error::EngineResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsTuning {
    #[serde(default = "GraphicsTuning::default_vertex_budget")]
    pub max_vertex_budget: usize,
    #[serde(default = "GraphicsTuning::default_index_budget")]
    pub max_index_budget: usize,
    #[serde(default = "GraphicsTuning::default_render_chunks")]
    pub max_render_chunks: usize,
    #[serde(default = "GraphicsTuning::default_frustum_margin")]
    pub frustum_margin: f32,
    #[serde(default = "GraphicsTuning::default_meshes_per_frame")]
    pub meshes_per_frame_default: usize,
    #[serde(default = "GraphicsTuning::default_meshes_per_frame_min")]
    pub meshes_per_frame_min: usize,
    #[serde(default = "GraphicsTuning::default_meshes_per_frame_max")]
    pub meshes_per_frame_max: usize,
    #[serde(default = "GraphicsTuning::default_frame_budget_ms")]
    pub soft_frame_budget_ms: f32,
    #[serde(default = "GraphicsTuning::default_surface_medium_cell")]
    pub surface_medium_cell: i32,
    #[serde(default = "GraphicsTuning::default_surface_far_cell")]
    pub surface_far_cell: i32,
    #[serde(default = "GraphicsTuning::default_skirt_depth")]
    pub skirt_depth: f32,
    #[serde(default = "GraphicsTuning::default_tiles_per_row")]
    pub tiles_per_row: u32,
    #[serde(default = "GraphicsTuning::default_backup_cooldown")]
    pub backup_cooldown_secs: f32,
    #[serde(default = "GraphicsTuning::default_maintenance_min")]
    pub maintenance_interval_min_secs: f32,
    #[serde(default = "GraphicsTuning::default_maintenance_max")]
    pub maintenance_interval_max_secs: f32,
    #[serde(default = "GraphicsTuning::default_activity_threshold")]
    pub maintenance_activity_threshold: f32,
}

impl GraphicsTuning {
    fn default_vertex_budget() -> usize {
        18_000_000
    }
    fn default_index_budget() -> usize {
        Self::default_vertex_budget() * 3
    }
    fn default_render_chunks() -> usize {
        192
    }
    fn default_frustum_margin() -> f32 {
        2.0
    }
    fn default_meshes_per_frame() -> usize {
        2
    }
    fn default_meshes_per_frame_min() -> usize {
        1
    }
    fn default_meshes_per_frame_max() -> usize {
        3
    }
    fn default_frame_budget_ms() -> f32 {
        16.0
    }
    fn default_surface_medium_cell() -> i32 {
        2
    }
    fn default_surface_far_cell() -> i32 {
        4
    }
    fn default_skirt_depth() -> f32 {
        0.05
    }
    fn default_tiles_per_row() -> u32 {
        16
    }
    fn default_backup_cooldown() -> f32 {
        120.0
    }
    fn default_maintenance_min() -> f32 {
        30.0
    }
    fn default_maintenance_max() -> f32 {
        1800.0
    }
    fn default_activity_threshold() -> f32 {
        50.0
    }
}

impl Default for GraphicsTuning {
    fn default() -> Self {
        Self {
            max_vertex_budget: Self::default_vertex_budget(),
            max_index_budget: Self::default_index_budget(),
            max_render_chunks: Self::default_render_chunks(),
            frustum_margin: Self::default_frustum_margin(),
            meshes_per_frame_default: Self::default_meshes_per_frame(),
            meshes_per_frame_min: Self::default_meshes_per_frame_min(),
            meshes_per_frame_max: Self::default_meshes_per_frame_max(),
            soft_frame_budget_ms: Self::default_frame_budget_ms(),
            surface_medium_cell: Self::default_surface_medium_cell(),
            surface_far_cell: Self::default_surface_far_cell(),
            skirt_depth: Self::default_skirt_depth(),
            tiles_per_row: Self::default_tiles_per_row(),
            backup_cooldown_secs: Self::default_backup_cooldown(),
            maintenance_interval_min_secs: Self::default_maintenance_min(),
            maintenance_interval_max_secs: Self::default_maintenance_max(),
            maintenance_activity_threshold: Self::default_activity_threshold(),
        }
    }
}

/// Load tuning from a RON file, falling back to defaults if it is absent.
pub fn load_graphics_tuning(path: &Path) -> EngineResult<GraphicsTuning> {
    if !path.exists() {
        return Ok(GraphicsTuning::default());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(ron::from_str(&raw)?)
}

/// File-watcher handle for hot-reloading tuning during development, mirroring
/// the teacher's `RonWatcher`/`SettingsWatcher` stub-on-failure idiom.
pub struct ConfigWatcher {
    pub changed: Arc<Mutex<bool>>,
    _watcher: Option<RecommendedWatcher>,
}

impl ConfigWatcher {
    #[must_use]
    pub fn stub() -> Self {
        Self { changed: Arc::new(Mutex::new(false)), _watcher: None }
    }

    /// Returns `true` (and clears the flag) exactly once per observed change.
    pub fn take_changed(&self) -> bool {
        let mut flag = self.changed.lock().expect("config watcher flag poisoned");
        std::mem::replace(&mut *flag, false)
    }
}

pub fn setup_config_watcher(path: &Path) -> notify::Result<ConfigWatcher> {
    let changed = Arc::new(Mutex::new(false));
    let changed_clone = changed.clone();
    let watched: PathBuf = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            if matches!(event.kind, notify::EventKind::Modify(_)) {
                *changed_clone.lock().expect("config watcher flag poisoned") = true;
            }
        }
    })?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(ConfigWatcher { changed, _watcher: Some(watcher) })
}

/// Per-block rendering data: atlas tile index and flat tint color. Keyed by
/// `Block`, RON-loadable/hot-reloadable in the same idiom as `GraphicsTuning`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockVisuals {
    pub tile_index: u32,
    pub tint: [f32; 4],
}

/// The built-in tile/tint table, one entry per closed `Block` kind.
#[must_use]
pub fn default_block_visuals() -> HashMap<Block, BlockVisuals> {
    let entry = |block: Block, tint: [f32; 4]| (block, BlockVisuals { tile_index: block.as_u8() as u32, tint });
    HashMap::from([
        entry(Block::Air, [0.0, 0.0, 0.0, 0.0]),
        entry(Block::Dirt, [0.55, 0.38, 0.22, 1.0]),
        entry(Block::Grass, [0.35, 0.65, 0.25, 1.0]),
        entry(Block::Stone, [0.55, 0.55, 0.58, 1.0]),
        entry(Block::Water, [0.2, 0.4, 0.8, 0.6]),
        entry(Block::Sand, [0.86, 0.78, 0.55, 1.0]),
    ])
}

/// Load per-block visuals from a RON file keyed by block name (as returned
/// by `Block::name`), merged onto the default table; falls back entirely to
/// defaults if the file is absent.
pub fn load_block_visuals(path: &Path) -> EngineResult<HashMap<Block, BlockVisuals>> {
    let mut table = default_block_visuals();
    if !path.exists() {
        return Ok(table);
    }
    let raw = std::fs::read_to_string(path)?;
    let overrides: HashMap<String, BlockVisuals> = ron::from_str(&raw)?;
    for (name, visuals) in overrides {
        match Block::ALL.into_iter().find(|block| block.name() == name) {
            Some(block) => {
                table.insert(block, visuals);
            }
            None => tracing::warn!(block = %name, "ignoring override for unknown block name"),
        }
    }
    Ok(table)
}

/// Maps the closed `Block` set onto atlas tile indices and flat base colors,
/// standing in for the out-of-scope texture atlas generator's runtime
/// lookup (§1): only the UV-remap math the composer needs, not image
/// decoding.
#[derive(Debug, Clone)]
pub struct AtlasMap {
    pub tiles_per_row: u32,
    visuals: HashMap<Block, BlockVisuals>,
}

impl AtlasMap {
    #[must_use]
    pub fn new(tiles_per_row: u32, visuals: HashMap<Block, BlockVisuals>) -> Self {
        Self { tiles_per_row, visuals }
    }

    fn visuals_for(&self, block: Block) -> &BlockVisuals {
        self.visuals.get(&block).expect("every Block has a default visuals entry")
    }

    #[must_use]
    pub fn tile_index(&self, block: Block) -> u32 {
        self.visuals_for(block).tile_index
    }

    /// Remap a mesher-local raw UV (scaled with quad size) into the tile
    /// belonging to `block`: `tile_u = (tile_x + frac(u_raw)) / tiles_per_row`.
    #[must_use]
    pub fn remap_uv(&self, raw: glam::Vec2, block: Block) -> glam::Vec2 {
        let tiles_per_row = self.tiles_per_row.max(1) as f32;
        let tile = self.tile_index(block) as f32;
        let tile_x = tile % tiles_per_row;
        let tile_y = (tile / tiles_per_row).floor();
        let u = (tile_x + raw.x.fract()) / tiles_per_row;
        let v = (tile_y + raw.y.fract()) / tiles_per_row;
        glam::Vec2::new(u, v)
    }

    #[must_use]
    pub fn base_color(&self, block: Block) -> [f32; 4] {
        self.visuals_for(block).tint
    }
}

impl Default for AtlasMap {
    fn default() -> Self {
        Self { tiles_per_row: GraphicsTuning::default_tiles_per_row(), visuals: default_block_visuals() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tuning_file_falls_back_to_defaults() {
        let tuning = load_graphics_tuning(Path::new("/nonexistent/path/tuning.ron")).unwrap();
        assert_eq!(tuning.max_render_chunks, GraphicsTuning::default_render_chunks());
    }

    #[test]
    fn uv_remap_stays_within_its_tile() {
        let atlas = AtlasMap::new(4, default_block_visuals());
        let uv = atlas.remap_uv(glam::Vec2::new(2.5, 1.25), Block::Stone);
        let tile_w = 1.0 / 4.0;
        let tile_x = (Block::Stone.as_u8() as u32 % 4) as f32 * tile_w;
        assert!(uv.x >= tile_x && uv.x <= tile_x + tile_w);
    }

    #[test]
    fn missing_visuals_file_falls_back_to_defaults() {
        let visuals = load_block_visuals(Path::new("/nonexistent/path/visuals.ron")).unwrap();
        assert_eq!(visuals[&Block::Stone].tile_index, default_block_visuals()[&Block::Stone].tile_index);
    }

    #[test]
    fn visuals_override_replaces_only_the_named_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block_visuals.ron");
        std::fs::write(&path, r#"{ "stone": (tile_index: 99, tint: (0.1, 0.1, 0.1, 1.0)) }"#).unwrap();

        let visuals = load_block_visuals(&path).unwrap();
        assert_eq!(visuals[&Block::Stone].tile_index, 99);
        assert_eq!(visuals[&Block::Dirt].tile_index, default_block_visuals()[&Block::Dirt].tile_index);
    }
}
