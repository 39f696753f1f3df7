//! Backup rotation: timestamped copies of region files with retention-limit
//! culling, throttled by a per-region cooldown timer owned by the caller
//! (the residency manager's maintenance scheduler, §4.F.6).

use std::path::{Path, PathBuf};

use crate::error::EngineResult;

/// Copy `region_path` into `backups_dir` under a timestamped name, then
/// delete the oldest copies past `retention`. Returns the new backup path.
pub fn rotate_backup(region_path: &Path, backups_dir: &Path, retention: usize, now_secs: i64) -> EngineResult<PathBuf> {
    std::fs::create_dir_all(backups_dir)?;

    let region_stem = region_path.file_stem().and_then(|s| s.to_str()).unwrap_or("region");
    let backup_name = format!("{region_stem}.{now_secs}.bin");
    let backup_path = backups_dir.join(&backup_name);
    std::fs::copy(region_path, &backup_path)?;

    enforce_retention(backups_dir, region_stem, retention)?;
    Ok(backup_path)
}

/// Delete the oldest backups for `region_stem` until at most `retention`
/// remain, keeping the most recent by embedded timestamp.
fn enforce_retention(backups_dir: &Path, region_stem: &str, retention: usize) -> EngineResult<()> {
    let mut matches: Vec<(i64, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(backups_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else { continue };
        if let Some(ts) = parse_backup_timestamp(file_name, region_stem) {
            matches.push((ts, path));
        }
    }

    matches.sort_by_key(|(ts, _)| *ts);
    while matches.len() > retention {
        let (_, oldest) = matches.remove(0);
        std::fs::remove_file(oldest)?;
    }
    Ok(())
}

fn parse_backup_timestamp(file_name: &str, region_stem: &str) -> Option<i64> {
    let prefix = format!("{region_stem}.");
    let rest = file_name.strip_prefix(&prefix)?;
    let rest = rest.strip_suffix(".bin")?;
    rest.parse::<i64>().ok()
}

/// Restore a region file from its most recent backup, overwriting the live
/// region file in place (atomic write-then-rename).
pub fn restore_backup(backups_dir: &Path, region_stem: &str, region_path: &Path) -> EngineResult<()> {
    let mut matches: Vec<(i64, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(backups_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else { continue };
        if let Some(ts) = parse_backup_timestamp(file_name, region_stem) {
            matches.push((ts, path));
        }
    }
    matches.sort_by_key(|(ts, _)| *ts);

    let Some((_, newest)) = matches.pop() else {
        return Err(crate::error::EngineError::Corrupt {
            path: region_path.to_path_buf(),
            reason: "no backup available to restore from".to_string(),
        });
    };

    let parent = region_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::fs::copy(&newest, tmp.path())?;
    tmp.persist(region_path).map_err(|e| e.error)?;
    Ok(())
}
