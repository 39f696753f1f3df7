//! Region file codec: the byte-for-byte persisted format.
//!
//! A region groups a 32×32 grid of chunks into one file. Layout
//! (little-endian throughout):
//!
//! - Magic: 8 bytes `b"ZIGWORLD"`, then a 2-byte format version.
//! - Directory: 1024 entries, one per chunk slot indexed by
//!   `lcx + 32 * lcz` (`lc = c mod 32`): 4-byte offset, 4-byte length,
//!   4-byte decompressed block count, 1-byte present flag.
//! - Payload area: for each present slot, a 4-byte CRC32C over the
//!   decompressed block stream followed by an RLE stream of
//!   `(block_type: u8, run_len: u16)` pairs summing to `S*S*H`.
//!
//! The directory-of-slots structuring and atomic write-then-rename
//! discipline follow `tn-lorenz-SteelMC`'s `RegionManager`; the byte layout
//! itself is the spec's own contract and does not match SteelMC's (which
//! uses a different magic and zstd compression).

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::block::Block;
use crate::chunk::Chunk;
use crate::coords::{ChunkCoord, CHUNK_HEIGHT, CHUNK_SIDE};
use crate::error::{EngineError, EngineResult};

pub const REGION_SIDE: i32 = 32;
pub const SLOTS_PER_REGION: usize = (REGION_SIDE * REGION_SIDE) as usize;
const MAGIC: &[u8; 8] = b"ZIGWORLD";
const FORMAT_VERSION: u16 = 1;
const DIRECTORY_ENTRY_LEN: usize = 4 + 4 + 4 + 1;
const HEADER_LEN: usize = 8 + 2;
const BLOCKS_PER_CHUNK: usize = CHUNK_SIDE as usize * CHUNK_SIDE as usize * CHUNK_HEIGHT as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionCoord {
    pub rx: i32,
    pub rz: i32,
}

impl RegionCoord {
    #[must_use]
    pub fn from_chunk(c: ChunkCoord) -> Self {
        Self { rx: c.cx.div_euclid(REGION_SIDE), rz: c.cz.div_euclid(REGION_SIDE) }
    }

    #[must_use]
    pub fn local_slot(c: ChunkCoord) -> usize {
        let lcx = c.cx.rem_euclid(REGION_SIDE) as usize;
        let lcz = c.cz.rem_euclid(REGION_SIDE) as usize;
        lcx + REGION_SIDE as usize * lcz
    }

    #[must_use]
    pub fn file_name(self) -> String {
        format!("r.{}.{}.bin", self.rx, self.rz)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DirEntry {
    offset: u32,
    length: u32,
    block_count: u32,
    present: bool,
}

/// An in-memory region: the directory plus the raw encoded payload bytes for
/// each present slot (payload, not including the directory itself).
#[derive(Default)]
pub struct RegionFile {
    entries: [DirEntry; SLOTS_PER_REGION],
    payloads: HashMap<usize, Vec<u8>>,
}

impl RegionFile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a region file's full byte contents.
    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.len() < HEADER_LEN || &bytes[0..8] != MAGIC {
            return Err(EngineError::Corrupt {
                path: Path::new("<in-memory>").to_path_buf(),
                reason: "bad magic".to_string(),
            });
        }
        let version = u16::from_le_bytes([bytes[8], bytes[9]]);
        if version != FORMAT_VERSION {
            return Err(EngineError::Corrupt {
                path: Path::new("<in-memory>").to_path_buf(),
                reason: format!("unsupported format version {version}"),
            });
        }

        let dir_start = HEADER_LEN;
        let dir_len = DIRECTORY_ENTRY_LEN * SLOTS_PER_REGION;
        if bytes.len() < dir_start + dir_len {
            return Err(EngineError::Corrupt {
                path: Path::new("<in-memory>").to_path_buf(),
                reason: "truncated directory".to_string(),
            });
        }

        let mut region = Self::new();
        for slot in 0..SLOTS_PER_REGION {
            let base = dir_start + slot * DIRECTORY_ENTRY_LEN;
            let offset = u32::from_le_bytes(bytes[base..base + 4].try_into().unwrap());
            let length = u32::from_le_bytes(bytes[base + 4..base + 8].try_into().unwrap());
            let block_count = u32::from_le_bytes(bytes[base + 8..base + 12].try_into().unwrap());
            let present = bytes[base + 12] != 0;
            region.entries[slot] = DirEntry { offset, length, block_count, present };

            if present {
                let start = offset as usize;
                let end = start + length as usize;
                if end > bytes.len() {
                    return Err(EngineError::Corrupt {
                        path: Path::new("<in-memory>").to_path_buf(),
                        reason: format!("slot {slot} payload out of range"),
                    });
                }
                region.payloads.insert(slot, bytes[start..end].to_vec());
            }
        }

        Ok(region)
    }

    /// Serialize the region into its full on-disk byte layout, appending new
    /// payloads at end-of-file order.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let dir_len = DIRECTORY_ENTRY_LEN * SLOTS_PER_REGION;
        let payload_start = HEADER_LEN + dir_len;

        let mut slots: Vec<usize> = self.payloads.keys().copied().collect();
        slots.sort_unstable();

        let mut out = Vec::with_capacity(payload_start + self.payloads.values().map(Vec::len).sum::<usize>());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());

        let mut dir = vec![0u8; dir_len];
        let mut cursor = payload_start as u32;
        let mut payload_bytes = Vec::new();

        for slot in 0..SLOTS_PER_REGION {
            let base = slot * DIRECTORY_ENTRY_LEN;
            if let Some(payload) = self.payloads.get(&slot) {
                let entry = self.entries[slot];
                let offset = cursor;
                dir[base..base + 4].copy_from_slice(&offset.to_le_bytes());
                dir[base + 4..base + 8].copy_from_slice(&(payload.len() as u32).to_le_bytes());
                dir[base + 8..base + 12].copy_from_slice(&entry.block_count.to_le_bytes());
                dir[base + 12] = 1;

                payload_bytes.extend_from_slice(payload);
                cursor += payload.len() as u32;
            }
        }

        out.extend_from_slice(&dir);
        out.extend_from_slice(&payload_bytes);
        out
    }

    /// Encode and install a chunk's payload into the given slot.
    pub fn put_chunk(&mut self, slot: usize, chunk: &Chunk) {
        let payload = encode_chunk_payload(chunk);
        self.entries[slot] = DirEntry {
            offset: 0, // recomputed by `encode`
            length: payload.len() as u32,
            block_count: BLOCKS_PER_CHUNK as u32,
            present: true,
        };
        self.payloads.insert(slot, payload);
    }

    /// Decode the chunk stored at `slot`, if present.
    pub fn get_chunk(&self, slot: usize, coord: ChunkCoord) -> EngineResult<Option<Chunk>> {
        let Some(entry) = self.entries.get(slot).copied() else { return Ok(None) };
        if !entry.present {
            return Ok(None);
        }
        let payload = self.payloads.get(&slot).expect("present slot has payload");
        decode_chunk_payload(payload, coord, entry.block_count as usize).map(Some)
    }
}

/// Encode a chunk's block stream as `crc32c(4) || RLE pairs`.
fn encode_chunk_payload(chunk: &Chunk) -> Vec<u8> {
    let blocks = chunk.blocks();
    let stream: Vec<u8> = blocks.iter().map(|b| b.as_u8()).collect();
    let crc = crc32c::crc32c(&stream);

    let mut out = Vec::with_capacity(4 + stream.len() / 4);
    out.extend_from_slice(&crc.to_le_bytes());

    let mut i = 0;
    while i < stream.len() {
        let value = stream[i];
        let mut run_len: u32 = 0;
        while i < stream.len() && stream[i] == value && run_len < u32::from(u16::MAX) {
            run_len += 1;
            i += 1;
        }
        out.push(value);
        out.extend_from_slice(&(run_len as u16).to_le_bytes());
    }
    out
}

fn decode_chunk_payload(payload: &[u8], coord: ChunkCoord, expected_blocks: usize) -> EngineResult<Chunk> {
    if payload.len() < 4 {
        return Err(EngineError::Corrupt { path: Path::new("<payload>").to_path_buf(), reason: "payload too short".into() });
    }
    let stored_crc = u32::from_le_bytes(payload[0..4].try_into().unwrap());

    let mut stream = Vec::with_capacity(expected_blocks);
    let mut i = 4;
    while i + 3 <= payload.len() && stream.len() < expected_blocks {
        let block_type = payload[i];
        let run_len = u16::from_le_bytes([payload[i + 1], payload[i + 2]]);
        i += 3;
        stream.extend(std::iter::repeat(block_type).take(run_len as usize));
    }

    if stream.len() != expected_blocks {
        return Err(EngineError::Corrupt {
            path: Path::new("<payload>").to_path_buf(),
            reason: format!("RLE stream decoded to {} blocks, expected {expected_blocks}", stream.len()),
        });
    }

    let crc = crc32c::crc32c(&stream);
    if crc != stored_crc {
        return Err(EngineError::Corrupt { path: Path::new("<payload>").to_path_buf(), reason: "CRC32C mismatch".into() });
    }

    let mut chunk = Chunk::new(coord);
    chunk.set_blocks(stream.into_iter().map(Block::from_u8).collect());
    chunk.clear_modified();
    Ok(chunk)
}

/// Load a region file from disk, or an empty one if it does not exist.
pub fn load_region_file(path: &Path) -> EngineResult<RegionFile> {
    if !path.exists() {
        return Ok(RegionFile::new());
    }
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    RegionFile::decode(&bytes).map_err(|e| match e {
        EngineError::Corrupt { reason, .. } => EngineError::Corrupt { path: path.to_path_buf(), reason },
        other => other,
    })
}

/// Atomically write a region file via write-to-temp + rename. On any write
/// error the previous file is left untouched.
pub fn save_region_file(path: &Path, region: &RegionFile) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(&region.encode())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_roundtrips_through_payload_encoding() {
        let mut chunk = Chunk::new(ChunkCoord::new(3, -7));
        for x in 0..CHUNK_SIDE {
            for z in 0..CHUNK_SIDE {
                chunk.set_block(x, 64, z, Block::Stone).unwrap();
            }
        }

        let payload = encode_chunk_payload(&chunk);
        let decoded = decode_chunk_payload(&payload, chunk.coord, BLOCKS_PER_CHUNK).unwrap();

        for x in 0..CHUNK_SIDE {
            for z in 0..CHUNK_SIDE {
                assert_eq!(decoded.get_block(x, 64, z).unwrap(), Block::Stone);
            }
            for y in [0, 63, 65, CHUNK_HEIGHT - 1] {
                for z in 0..CHUNK_SIDE {
                    assert_eq!(decoded.get_block(x, y, z).unwrap(), Block::Air);
                }
            }
        }
    }

    #[test]
    fn corrupted_payload_is_detected_by_crc() {
        let chunk = Chunk::new(ChunkCoord::new(0, 0));
        let mut payload = encode_chunk_payload(&chunk);
        // Flip a byte inside the RLE stream (past the 4-byte CRC header).
        let idx = payload.len() - 1;
        payload[idx] ^= 0xFF;
        let result = decode_chunk_payload(&payload, chunk.coord, BLOCKS_PER_CHUNK);
        assert!(matches!(result, Err(EngineError::Corrupt { .. })));
    }

    #[test]
    fn region_file_roundtrips_through_encode_decode() {
        let mut region = RegionFile::new();
        let coord = ChunkCoord::new(1, 1);
        let mut chunk = Chunk::new(coord);
        chunk.set_block(0, 0, 0, Block::Stone).unwrap();
        let slot = RegionCoord::local_slot(coord);
        region.put_chunk(slot, &chunk);

        let bytes = region.encode();
        let decoded_region = RegionFile::decode(&bytes).unwrap();
        let decoded_chunk = decoded_region.get_chunk(slot, coord).unwrap().unwrap();
        assert_eq!(decoded_chunk.get_block(0, 0, 0).unwrap(), Block::Stone);
    }

    #[test]
    fn idempotent_save_with_no_modifications_yields_equal_bytes() {
        let mut region = RegionFile::new();
        let coord = ChunkCoord::new(5, 5);
        let chunk = Chunk::new(coord);
        let slot = RegionCoord::local_slot(coord);
        region.put_chunk(slot, &chunk);

        let bytes_a = region.encode();
        let bytes_b = region.encode();
        assert_eq!(bytes_a, bytes_b);
    }
}
