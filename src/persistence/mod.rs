//! World persistence: region-file storage, metadata, and backup rotation.
//!
//! `PersistenceStore` is the single handle the residency manager and
//! generation pipeline hold; it serializes I/O per region via a per-region
//! `RwLock` (shared for loads, exclusive for saves and backups) while
//! letting unrelated regions proceed in parallel, per §5.

pub mod backup;
pub mod metadata;
pub mod region;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::chunk::Chunk;
use crate::coords::ChunkCoord;
use crate::error::{EngineError, EngineResult};
pub use metadata::{Difficulty, WorldMeta, META_FILE_NAME};
pub use region::RegionCoord;

/// Caller-supplied parameters for opening or creating a world.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub force_new: bool,
    pub seed: Option<i64>,
    pub difficulty: Option<Difficulty>,
    pub description: Option<String>,
}

pub struct PersistenceStore {
    root: PathBuf,
    name: String,
    meta: Mutex<WorldMeta>,
    region_locks: RwLock<HashMap<RegionCoord, Arc<RwLock<()>>>>,
}

fn is_valid_world_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' ')
}

impl PersistenceStore {
    #[must_use]
    pub fn world_dir(root: &Path, name: &str) -> PathBuf {
        root.join(name)
    }

    #[must_use]
    pub fn world_exists(root: &Path, name: &str) -> bool {
        Self::world_dir(root, name).join(META_FILE_NAME).exists()
    }

    pub fn list_worlds(root: &Path) -> EngineResult<Vec<String>> {
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.path().join(META_FILE_NAME).is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Open an existing world or create a new one under `root`.
    ///
    /// Refuses with `WorldAlreadyExists` when `opts.force_new` is set and
    /// the world is already present; refuses with `SeedMismatch` when a
    /// caller-provided seed disagrees with the on-disk seed.
    pub fn open_world(root: &Path, name: &str, opts: OpenOptions, now_secs: i64) -> EngineResult<Self> {
        if !is_valid_world_name(name) {
            return Err(EngineError::InvalidWorldName(name.to_string()));
        }

        let dir = Self::world_dir(root, name);
        let meta_path = dir.join(META_FILE_NAME);
        std::fs::create_dir_all(dir.join("regions"))?;
        std::fs::create_dir_all(dir.join("backups"))?;

        let exists = meta_path.is_file();
        if exists && opts.force_new {
            return Err(EngineError::WorldAlreadyExists(name.to_string()));
        }

        let mut meta = if exists {
            let raw = std::fs::read_to_string(&meta_path)?;
            let mut meta: WorldMeta = ron::from_str(&raw)?;
            if let Some(requested) = opts.seed {
                if requested != meta.seed {
                    return Err(EngineError::SeedMismatch { name: name.to_string(), on_disk: meta.seed, requested });
                }
            }
            meta.last_played_secs = now_secs;
            meta
        } else {
            WorldMeta::new(name, opts.seed.unwrap_or(now_secs), now_secs)
        };

        if let Some(d) = opts.difficulty {
            meta.difficulty = d;
        }
        if let Some(desc) = opts.description {
            meta.description = desc;
        }

        let store = Self { root: root.to_path_buf(), name: name.to_string(), meta: Mutex::new(meta), region_locks: RwLock::new(HashMap::new()) };
        store.write_meta()?;
        Ok(store)
    }

    fn write_meta(&self) -> EngineResult<()> {
        let meta = self.meta.lock().expect("meta mutex poisoned");
        let dir = Self::world_dir(&self.root, &self.name);
        let serialized = ron::ser::to_string_pretty(&*meta, ron::ser::PrettyConfig::default())?;
        let tmp = tempfile::NamedTempFile::new_in(&dir)?;
        std::fs::write(tmp.path(), serialized)?;
        tmp.persist(dir.join(META_FILE_NAME)).map_err(|e| e.error)?;
        Ok(())
    }

    #[must_use]
    pub fn meta(&self) -> WorldMeta {
        self.meta.lock().expect("meta mutex poisoned").clone()
    }

    pub fn rename_world(&mut self, new_name: &str) -> EngineResult<()> {
        if !is_valid_world_name(new_name) {
            return Err(EngineError::InvalidWorldName(new_name.to_string()));
        }
        let old_dir = Self::world_dir(&self.root, &self.name);
        let new_dir = Self::world_dir(&self.root, new_name);
        std::fs::rename(&old_dir, &new_dir)?;
        self.name = new_name.to_string();
        self.meta.lock().expect("meta mutex poisoned").name = new_name.to_string();
        self.write_meta()
    }

    pub fn set_seed(&self, seed: i64) -> EngineResult<()> {
        self.meta.lock().expect("meta mutex poisoned").seed = seed;
        self.write_meta()
    }

    pub fn set_difficulty(&self, difficulty: Difficulty) -> EngineResult<()> {
        self.meta.lock().expect("meta mutex poisoned").difficulty = difficulty;
        self.write_meta()
    }

    pub fn set_description(&self, description: impl Into<String>) -> EngineResult<()> {
        self.meta.lock().expect("meta mutex poisoned").description = description.into();
        self.write_meta()
    }

    pub fn set_autosave_interval(&self, secs: f32) -> EngineResult<()> {
        self.meta.lock().expect("meta mutex poisoned").autosave_interval_secs = secs;
        self.write_meta()
    }

    pub fn set_backup_retention(&self, count: usize) -> EngineResult<()> {
        self.meta.lock().expect("meta mutex poisoned").backup_retention = count;
        self.write_meta()
    }

    pub fn reset_settings(&self) -> EngineResult<()> {
        let mut meta = self.meta.lock().expect("meta mutex poisoned");
        let fresh = WorldMeta::new(meta.name.clone(), meta.seed, meta.created_at_secs);
        *meta = WorldMeta { last_played_secs: meta.last_played_secs, ..fresh };
        drop(meta);
        self.write_meta()
    }

    pub fn touch_autosave(&self, now_secs: i64) -> EngineResult<()> {
        self.meta.lock().expect("meta mutex poisoned").last_autosave_secs = now_secs;
        self.write_meta()
    }

    pub fn touch_backup(&self, now_secs: i64) -> EngineResult<()> {
        self.meta.lock().expect("meta mutex poisoned").last_backup_secs = now_secs;
        self.write_meta()
    }

    pub fn add_activity(&self, amount: f32) {
        self.meta.lock().expect("meta mutex poisoned").activity_score += amount;
    }

    fn region_lock(&self, rc: RegionCoord) -> Arc<RwLock<()>> {
        if let Some(lock) = self.region_locks.read().expect("region lock map poisoned").get(&rc) {
            return lock.clone();
        }
        let mut locks = self.region_locks.write().expect("region lock map poisoned");
        locks.entry(rc).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
    }

    #[must_use]
    pub fn region_path(&self, rc: RegionCoord) -> PathBuf {
        Self::world_dir(&self.root, &self.name).join("regions").join(rc.file_name())
    }

    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        Self::world_dir(&self.root, &self.name).join("backups")
    }

    /// Encode and persist a chunk into its region file's directory, reusing
    /// the prior slot's space when the new payload fits at end-of-file
    /// order (the simple append/rewrite-directory strategy of §4.D).
    pub fn save_chunk(&self, chunk: &Chunk) -> EngineResult<()> {
        let rc = RegionCoord::from_chunk(chunk.coord);
        let lock = self.region_lock(rc);
        let _guard = lock.write().expect("region lock poisoned");

        let path = self.region_path(rc);
        let mut region = region::load_region_file(&path)?;
        let slot = RegionCoord::local_slot(chunk.coord);
        region.put_chunk(slot, chunk);
        region::save_region_file(&path, &region)
    }

    pub fn load_chunk(&self, coord: ChunkCoord) -> EngineResult<Option<Chunk>> {
        let rc = RegionCoord::from_chunk(coord);
        let lock = self.region_lock(rc);
        let _guard = lock.read().expect("region lock poisoned");

        let path = self.region_path(rc);
        let region = region::load_region_file(&path)?;
        let slot = RegionCoord::local_slot(coord);
        region.get_chunk(slot, coord)
    }

    /// Copy a region file to a timestamped backup and cull past `retention`.
    pub fn rotate_backup(&self, rc: RegionCoord, retention: usize, now_secs: i64) -> EngineResult<Option<PathBuf>> {
        let lock = self.region_lock(rc);
        let _guard = lock.write().expect("region lock poisoned");

        let path = self.region_path(rc);
        if !path.exists() {
            return Ok(None);
        }
        backup::rotate_backup(&path, &self.backups_dir(), retention, now_secs).map(Some)
    }

    pub fn restore_backup(&self, rc: RegionCoord) -> EngineResult<()> {
        let lock = self.region_lock(rc);
        let _guard = lock.write().expect("region lock poisoned");

        let path = self.region_path(rc);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("region").to_string();
        backup::restore_backup(&self.backups_dir(), &stem, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::coords::CHUNK_SIDE;
    use tempfile::tempdir;

    #[test]
    fn open_world_creates_directory_tree() {
        let root = tempdir().unwrap();
        let store = PersistenceStore::open_world(root.path(), "alpha", OpenOptions { seed: Some(7), ..Default::default() }, 1000).unwrap();
        assert_eq!(store.meta().seed, 7);
        assert!(root.path().join("alpha").join(META_FILE_NAME).exists());
    }

    #[test]
    fn force_new_on_existing_world_errors() {
        let root = tempdir().unwrap();
        PersistenceStore::open_world(root.path(), "alpha", OpenOptions::default(), 1000).unwrap();
        let result = PersistenceStore::open_world(root.path(), "alpha", OpenOptions { force_new: true, ..Default::default() }, 1000);
        assert!(matches!(result, Err(EngineError::WorldAlreadyExists(_))));
    }

    #[test]
    fn seed_mismatch_is_reported() {
        let root = tempdir().unwrap();
        PersistenceStore::open_world(root.path(), "alpha", OpenOptions { seed: Some(1), ..Default::default() }, 1000).unwrap();
        let result = PersistenceStore::open_world(root.path(), "alpha", OpenOptions { seed: Some(2), ..Default::default() }, 1000);
        assert!(matches!(result, Err(EngineError::SeedMismatch { .. })));
    }

    #[test]
    fn chunk_save_and_load_round_trips() {
        let root = tempdir().unwrap();
        let store = PersistenceStore::open_world(root.path(), "alpha", OpenOptions::default(), 1000).unwrap();

        let coord = ChunkCoord::new(3, -7);
        let mut chunk = Chunk::new(coord);
        for x in 0..CHUNK_SIDE {
            for z in 0..CHUNK_SIDE {
                chunk.set_block(x, 64, z, Block::Stone).unwrap();
            }
        }
        store.save_chunk(&chunk).unwrap();

        let loaded = store.load_chunk(coord).unwrap().unwrap();
        for x in 0..CHUNK_SIDE {
            for z in 0..CHUNK_SIDE {
                assert_eq!(loaded.get_block(x, 64, z).unwrap(), Block::Stone);
            }
        }
        assert_eq!(loaded.get_block(0, 0, 0).unwrap(), Block::Air);
    }

    #[test]
    fn corrupt_chunk_is_reported_and_backup_restores_it() {
        let root = tempdir().unwrap();
        let store = PersistenceStore::open_world(root.path(), "alpha", OpenOptions::default(), 1000).unwrap();
        let coord = ChunkCoord::new(0, 0);
        let chunk = Chunk::new(coord);
        store.save_chunk(&chunk).unwrap();

        let rc = RegionCoord::from_chunk(coord);
        store.rotate_backup(rc, 3, 1000).unwrap();

        let path = store.region_path(rc);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let result = store.load_chunk(coord);
        assert!(matches!(result, Err(EngineError::Corrupt { .. })));

        store.restore_backup(rc).unwrap();
        let restored = store.load_chunk(coord).unwrap();
        assert!(restored.is_some());
    }
}
