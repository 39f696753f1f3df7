//! Terrain generation: a pure function of `(seed, x, z)`.
//!
//! `TerrainSource` is the trait boundary the rest of the engine depends on;
//! `NoiseTerrain` is a concrete implementation carried over from the
//! teacher's layered-noise approach in `chunk/mod.rs::generate`. Only
//! determinism, cross-chunk continuity, and thread-safety are contractual
//! (spec §4.C) — the octave counts and thresholds below are supplemental
//! implementation detail, not part of the contract.

use std::sync::Arc;

use noise::{Fbm, MultiFractal, NoiseFn, Perlin, RidgedMulti, Simplex};

use crate::biome::{BiomeKind, BiomeRegistry, BiomeTuning};
use crate::block::Block;
use crate::chunk::Chunk;
use crate::coords::{ChunkCoord, CHUNK_HEIGHT, CHUNK_SIDE};

/// Pure sampling contract: height and biome at a world column. Implementors
/// must hold no mutable state so calls are safe from any worker thread.
pub trait TerrainSource: Send + Sync {
    fn height_at(&self, bx: i32, bz: i32) -> i32;
    fn biome_at(&self, bx: i32, bz: i32) -> BiomeKind;
    fn generate_chunk(&self, coord: ChunkCoord) -> Chunk;
}

/// Multi-octave noise terrain: a base FBM shaped per-biome by `BiomeTuning`
/// (octaves/persistence/lacunarity/scale/offset), a ridged-multifractal
/// mountain contribution, and a Perlin detail layer for surface variation,
/// all seeded from the world seed.
pub struct NoiseTerrain {
    seed: u32,
    biomes: Arc<BiomeRegistry>,
    ridged: RidgedMulti<Perlin>,
    detail: Perlin,
    cave_a: Simplex,
    cave_b: Simplex,
}

impl NoiseTerrain {
    #[must_use]
    pub fn new(seed: u32, biomes: Arc<BiomeRegistry>) -> Self {
        Self {
            seed,
            biomes,
            ridged: RidgedMulti::new(seed.wrapping_add(1)).set_octaves(3).set_frequency(0.008),
            detail: Perlin::new(seed.wrapping_add(5)),
            cave_a: Simplex::new(seed.wrapping_add(3)),
            cave_b: Simplex::new(seed.wrapping_add(4)),
        }
    }

    #[must_use]
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Base FBM reconfigured per call from a biome's tuning. Cheap relative
    /// to a column's block fill, and keeps `height_at` a pure function of
    /// `(seed, tuning, x, z)` rather than caching one fixed octave count.
    fn base_fbm(&self, tuning: &BiomeTuning) -> Fbm<Perlin> {
        Fbm::new(self.seed)
            .set_octaves(tuning.noise_octaves.max(1) as usize)
            .set_frequency(0.01)
            .set_persistence(f64::from(tuning.noise_persistence))
            .set_lacunarity(f64::from(tuning.noise_lacunarity))
    }

    fn is_cave(&self, wx: f64, wy: f64, wz: f64) -> bool {
        let a = self.cave_a.get([wx * 0.03, wy * 0.03, wz * 0.03]);
        let b = self.cave_b.get([wx * 0.03, wy * 0.03, wz * 0.03]);
        let threshold = 0.1;
        a.abs() < threshold && b.abs() < threshold
    }
}

impl TerrainSource for NoiseTerrain {
    fn height_at(&self, bx: i32, bz: i32) -> i32 {
        let wxf = f64::from(bx);
        let wzf = f64::from(bz);
        let biome = BiomeRegistry::biome_at(bx, bz);
        let tuning = self.biomes.get(biome);

        let base_height = self.base_fbm(tuning).get([wxf, wzf]) * f64::from(tuning.height_scale) + f64::from(tuning.height_offset);
        let mountain_height = self.ridged.get([wxf, wzf]).abs() * f64::from(tuning.height_scale);
        let detail = self.detail.get([wxf * 0.1, wzf * 0.1]) * f64::from(tuning.noise_lacunarity);

        let height_f = (base_height + mountain_height + detail).max(1.0);
        let max_h = f64::from(CHUNK_HEIGHT - 1);
        height_f.floor().clamp(1.0, max_h) as i32
    }

    fn biome_at(&self, bx: i32, bz: i32) -> BiomeKind {
        BiomeRegistry::biome_at(bx, bz)
    }

    fn generate_chunk(&self, coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);

        for lx in 0..CHUNK_SIDE {
            for lz in 0..CHUNK_SIDE {
                let bx = coord.cx * CHUNK_SIDE + lx;
                let bz = coord.cz * CHUNK_SIDE + lz;
                let height = self.height_at(bx, bz);
                let biome = self.biome_at(bx, bz);
                let tuning = self.biomes.get(biome);

                for ly in 0..height.min(CHUNK_HEIGHT) {
                    let cave_allowed = ly < height - 3;
                    let is_cave = cave_allowed && self.is_cave(f64::from(bx), f64::from(ly), f64::from(bz));
                    if is_cave {
                        continue;
                    }

                    let depth_from_surface = height - ly;
                    let block = if depth_from_surface == 1 {
                        tuning.surface_block
                    } else if depth_from_surface <= 4 {
                        tuning.soil_block
                    } else {
                        Block::Stone
                    };
                    chunk.set_block(lx, ly, lz, block).expect("in-bounds by construction");
                }

                if matches!(biome, BiomeKind::Ocean) && height < 40 {
                    for ly in height..40 {
                        chunk.set_block(lx, ly, lz, Block::Water).expect("in-bounds by construction");
                    }
                }
            }
        }

        chunk.clear_modified();
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_at_is_deterministic_in_seed_and_position() {
        let biomes = Arc::new(BiomeRegistry::default());
        let t1 = NoiseTerrain::new(42, biomes.clone());
        let t2 = NoiseTerrain::new(42, biomes);
        assert_eq!(t1.height_at(10, -10), t2.height_at(10, -10));
    }

    #[test]
    fn adjacent_columns_are_continuous() {
        let t = NoiseTerrain::new(42, Arc::new(BiomeRegistry::default()));
        let h0 = t.height_at(100, 100);
        let h1 = t.height_at(101, 100);
        assert!((h0 - h1).abs() < 50, "height should not jump wildly between adjacent columns");
    }

    #[test]
    fn biome_tuning_changes_height_shaping() {
        let (bx, bz) = (0..2000)
            .map(|bx| (bx, 0))
            .find(|&(bx, bz)| BiomeRegistry::biome_at(bx, bz) == BiomeKind::Plains)
            .expect("some column within range should be plains");

        let mut biomes = BiomeRegistry::default();
        biomes.set(
            BiomeKind::Plains,
            BiomeTuning { height_offset: 200.0, height_scale: 0.0, noise_lacunarity: 0.0, ..BiomeTuning::default() },
        );
        let terrain = NoiseTerrain::new(42, Arc::new(biomes));
        assert_eq!(terrain.height_at(bx, bz), 200, "zeroing scale and lacunarity collapses height to the tuned offset");
    }

    #[test]
    fn generate_chunk_fills_within_bounds_only() {
        let terrain = NoiseTerrain::new(7, Arc::new(BiomeRegistry::default()));
        let chunk = terrain.generate_chunk(ChunkCoord::new(0, 0));
        assert!(!chunk.modified, "freshly generated chunks start clean");
        // Top of the world stays air.
        assert_eq!(chunk.get_block(0, CHUNK_HEIGHT - 1, 0).unwrap(), Block::Air);
    }
}
