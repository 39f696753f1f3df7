//! The `Chunk` container: a flat S×S×H array of blocks plus identity and
//! modification tracking.

use crate::block::Block;
use crate::coords::{ChunkCoord, CHUNK_HEIGHT, CHUNK_SIDE};
use crate::error::EngineError;

const SIDE: usize = CHUNK_SIDE as usize;
const HEIGHT: usize = CHUNK_HEIGHT as usize;
const VOLUME: usize = SIDE * SIDE * HEIGHT;

/// A monotonically increasing counter bumped on every successful mutation,
/// used by the mesh cache to detect staleness without comparing block data.
pub type ModifiedEpoch = u64;

#[derive(Clone)]
pub struct Chunk {
    pub coord: ChunkCoord,
    blocks: Vec<Block>,
    pub modified: bool,
    epoch: ModifiedEpoch,
}

impl Chunk {
    /// A new chunk filled with air at the given coordinate.
    #[must_use]
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            blocks: vec![Block::Air; VOLUME],
            modified: false,
            epoch: 0,
        }
    }

    fn index(lx: i32, ly: i32, lz: i32) -> Result<usize, EngineError> {
        if !(0..CHUNK_SIDE).contains(&lx) || !(0..CHUNK_HEIGHT).contains(&ly) || !(0..CHUNK_SIDE).contains(&lz) {
            return Err(EngineError::OutOfBounds { lx, ly, lz });
        }
        Ok(lx as usize + lz as usize * SIDE + ly as usize * SIDE * SIDE)
    }

    /// Bounds-checked local block read. `Err` is an internal `OutOfBounds`
    /// condition never surfaced past the residency manager's accessor.
    pub fn get_block(&self, lx: i32, ly: i32, lz: i32) -> Result<Block, EngineError> {
        Self::index(lx, ly, lz).map(|i| self.blocks[i])
    }

    /// Bounds-checked local block write. Sets `modified = true` only when the
    /// value actually changes, and bumps the fingerprint epoch in that case.
    pub fn set_block(&mut self, lx: i32, ly: i32, lz: i32, block: Block) -> Result<(), EngineError> {
        let idx = Self::index(lx, ly, lz)?;
        if self.blocks[idx] != block {
            self.blocks[idx] = block;
            self.modified = true;
            self.epoch += 1;
        }
        Ok(())
    }

    /// Infallible read used by the mesher's hot inner loop; out-of-range
    /// coordinates (including "ask the neighbor chunk") are the caller's
    /// concern, not this accessor's.
    #[must_use]
    pub fn get_local_or_air(&self, lx: i32, ly: i32, lz: i32) -> Block {
        self.get_block(lx, ly, lz).unwrap_or(Block::Air)
    }

    #[must_use]
    pub fn fingerprint(&self) -> (ChunkCoord, ModifiedEpoch) {
        (self.coord, self.epoch)
    }

    #[must_use]
    pub fn epoch(&self) -> ModifiedEpoch {
        self.epoch
    }

    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// Raw block slice in `x + z*SIDE + y*SIDE*SIDE` order, for encoding.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Replace the entire block array (used when decoding from disk).
    ///
    /// # Panics
    /// Panics if `blocks.len() != CHUNK_SIDE * CHUNK_SIDE * CHUNK_HEIGHT`.
    pub fn set_blocks(&mut self, blocks: Vec<Block>) {
        assert_eq!(blocks.len(), VOLUME, "block buffer must match chunk volume");
        self.blocks = blocks;
    }
}
