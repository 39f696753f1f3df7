//! Biome definitions: a closed set of kinds carrying data-driven noise
//! tuning, loadable from RON and hot-reloadable via `config::ConfigWatcher`
//! in the same idiom used for the rest of the engine's configuration.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::error::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiomeKind {
    Plains,
    Desert,
    Forest,
    Ocean,
    Mountains,
    Swamp,
}

impl BiomeKind {
    pub const ALL: [BiomeKind; 6] = [
        BiomeKind::Plains,
        BiomeKind::Desert,
        BiomeKind::Forest,
        BiomeKind::Ocean,
        BiomeKind::Mountains,
        BiomeKind::Swamp,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BiomeKind::Plains => "plains",
            BiomeKind::Desert => "desert",
            BiomeKind::Forest => "forest",
            BiomeKind::Ocean => "ocean",
            BiomeKind::Mountains => "mountains",
            BiomeKind::Swamp => "swamp",
        }
    }
}

/// Per-biome terrain tuning, RON-loadable. Mirrors the shape of the
/// teacher's `Biome` struct, narrowed to fields the terrain generator
/// actually consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiomeTuning {
    pub height_scale: f32,
    pub height_offset: f32,
    pub noise_octaves: u32,
    pub noise_persistence: f32,
    pub noise_lacunarity: f32,
    pub surface_block: Block,
    pub soil_block: Block,
}

impl Default for BiomeTuning {
    fn default() -> Self {
        Self {
            height_scale: 20.0,
            height_offset: 64.0,
            noise_octaves: 4,
            noise_persistence: 0.5,
            noise_lacunarity: 2.0,
            surface_block: Block::Grass,
            soil_block: Block::Dirt,
        }
    }
}

/// Registry mapping each closed `BiomeKind` to its tuning. Always fully
/// populated with defaults; a RON file may override individual entries (see
/// `load_biome_registry`), and `config::setup_config_watcher` can watch that
/// same path for hot-reload.
#[derive(Debug, Clone)]
pub struct BiomeRegistry {
    tunings: HashMap<BiomeKind, BiomeTuning>,
}

impl BiomeRegistry {
    #[must_use]
    pub fn get(&self, kind: BiomeKind) -> &BiomeTuning {
        self.tunings.get(&kind).expect("every BiomeKind has a default entry")
    }

    pub fn set(&mut self, kind: BiomeKind, tuning: BiomeTuning) {
        self.tunings.insert(kind, tuning);
    }

    /// Deterministically select a biome from low-frequency world coordinates.
    /// Pure function of `(bx, bz)`; no internal state, safe to call
    /// concurrently from worker threads.
    #[must_use]
    pub fn biome_at(bx: i32, bz: i32) -> BiomeKind {
        use noise::{NoiseFn, Perlin};
        let perlin = Perlin::new(1337);
        let n = perlin.get([f64::from(bx) * 0.002, f64::from(bz) * 0.002]);
        match n {
            v if v < -0.4 => BiomeKind::Ocean,
            v if v < -0.15 => BiomeKind::Swamp,
            v if v < 0.15 => BiomeKind::Plains,
            v if v < 0.4 => BiomeKind::Forest,
            v if v < 0.6 => BiomeKind::Desert,
            _ => BiomeKind::Mountains,
        }
    }
}

impl Default for BiomeRegistry {
    fn default() -> Self {
        let mut tunings = HashMap::new();
        for kind in BiomeKind::ALL {
            let tuning = match kind {
                BiomeKind::Plains => BiomeTuning::default(),
                BiomeKind::Desert => BiomeTuning {
                    height_scale: 10.0,
                    height_offset: 62.0,
                    surface_block: Block::Sand,
                    soil_block: Block::Sand,
                    ..BiomeTuning::default()
                },
                BiomeKind::Forest => BiomeTuning {
                    height_scale: 24.0,
                    height_offset: 66.0,
                    ..BiomeTuning::default()
                },
                BiomeKind::Ocean => BiomeTuning {
                    height_scale: 8.0,
                    height_offset: 40.0,
                    surface_block: Block::Sand,
                    soil_block: Block::Stone,
                    ..BiomeTuning::default()
                },
                BiomeKind::Mountains => BiomeTuning {
                    height_scale: 80.0,
                    height_offset: 80.0,
                    surface_block: Block::Stone,
                    soil_block: Block::Stone,
                    ..BiomeTuning::default()
                },
                BiomeKind::Swamp => BiomeTuning {
                    height_scale: 6.0,
                    height_offset: 58.0,
                    surface_block: Block::Grass,
                    soil_block: Block::Dirt,
                    ..BiomeTuning::default()
                },
            };
            tunings.insert(kind, tuning);
        }
        Self { tunings }
    }
}

/// Load a registry from a RON file containing a map of biome name (as
/// returned by `BiomeKind::name`) to `BiomeTuning` overrides; kinds absent
/// from the file keep their default tuning. Falls back to an all-default
/// registry if the file is absent, mirroring `config::load_graphics_tuning`'s
/// missing-file behavior.
pub fn load_biome_registry(path: &Path) -> EngineResult<BiomeRegistry> {
    let mut registry = BiomeRegistry::default();
    if !path.exists() {
        return Ok(registry);
    }
    let raw = std::fs::read_to_string(path)?;
    let overrides: HashMap<String, BiomeTuning> = ron::from_str(&raw)?;
    for (name, tuning) in overrides {
        match BiomeKind::ALL.into_iter().find(|kind| kind.name() == name) {
            Some(kind) => registry.set(kind, tuning),
            None => tracing::warn!(biome = %name, "ignoring override for unknown biome name"),
        }
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn biome_at_is_deterministic() {
        assert_eq!(BiomeRegistry::biome_at(100, 200), BiomeRegistry::biome_at(100, 200));
    }

    #[test]
    fn registry_has_every_kind() {
        let reg = BiomeRegistry::default();
        for kind in BiomeKind::ALL {
            let _ = reg.get(kind);
        }
    }

    #[test]
    fn missing_override_file_falls_back_to_defaults() {
        let reg = load_biome_registry(Path::new("/nonexistent/path/biomes.ron")).unwrap();
        assert_eq!(reg.get(BiomeKind::Desert).height_scale, BiomeRegistry::default().get(BiomeKind::Desert).height_scale);
    }

    #[test]
    fn override_file_replaces_only_the_named_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("biomes.ron");
        std::fs::write(
            &path,
            r#"{
                "desert": (
                    height_scale: 1.0,
                    height_offset: 1.0,
                    noise_octaves: 2,
                    noise_persistence: 0.3,
                    noise_lacunarity: 1.5,
                    surface_block: Stone,
                    soil_block: Stone,
                ),
            }"#,
        )
        .unwrap();

        let reg = load_biome_registry(&path).unwrap();
        assert_eq!(reg.get(BiomeKind::Desert).height_scale, 1.0);
        assert_eq!(reg.get(BiomeKind::Plains).height_scale, BiomeTuning::default().height_scale, "untouched kinds keep their default");
    }
}
