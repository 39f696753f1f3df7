//! Per-frame CSV profile log (§7). One row per simulated frame, followed
//! by a terminating comment line once the run ends.
//!
//! Grounded on the teacher's `chunk/stats.rs` frame-stat accumulation, but
//! writing straight to a CSV writer instead of an in-memory ring buffer fed
//! to an egui HUD — this crate runs headless.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::composer::MeshStats;
use crate::error::EngineResult;

pub const HEADER: &str = "frame,frame_ms,loaded_chunks,visible_chunks,rendered_chunks,culled_chunks,budget_skipped,total_vertices,total_indices,lod_full,lod_medium,lod_far,regenerations,stream_last_ms,stream_avg_ms,stream_max_ms,queued_candidates,queued_generations,completed_async,immediate_loaded,unloaded,pending_generations";

/// One frame's worth of profile columns, filled in by the caller from the
/// composer's `MeshStats` and the residency manager's `UpdateReport`.
#[derive(Debug, Clone, Default)]
pub struct FrameSample {
    pub frame: u64,
    pub frame_ms: f32,
    pub loaded_chunks: usize,
    pub mesh: MeshStats,
    pub stream_last_ms: f32,
    pub stream_avg_ms: f32,
    pub stream_max_ms: f32,
    pub queued_candidates: usize,
    pub queued_generations: usize,
    pub completed_async: usize,
    pub immediate_loaded: usize,
    pub unloaded: usize,
    pub pending_generations: usize,
}

/// Appends rows to a CSV file, writing the header once and a closing
/// `# completed N frames` comment line when dropped or explicitly finished.
pub struct ProfileLog {
    writer: BufWriter<File>,
    frames_written: u64,
    finished: bool,
}

impl ProfileLog {
    pub fn create(path: &Path) -> EngineResult<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{HEADER}")?;
        Ok(Self { writer, frames_written: 0, finished: false })
    }

    pub fn record(&mut self, sample: &FrameSample) -> EngineResult<()> {
        let m = &sample.mesh;
        writeln!(
            self.writer,
            "{},{:.3},{},{},{},{},{},{},{},{},{},{},{},{:.3},{:.3},{:.3},{},{},{},{},{},{}",
            sample.frame,
            sample.frame_ms,
            sample.loaded_chunks,
            m.visible_chunks,
            m.rendered_chunks,
            m.culled_chunks,
            m.budget_skipped,
            m.total_vertices,
            m.total_indices,
            m.full_chunks,
            m.medium_chunks,
            m.far_chunks,
            m.regenerations,
            sample.stream_last_ms,
            sample.stream_avg_ms,
            sample.stream_max_ms,
            sample.queued_candidates,
            sample.queued_generations,
            sample.completed_async,
            sample.immediate_loaded,
            sample.unloaded,
            sample.pending_generations,
        )?;
        self.frames_written += 1;
        Ok(())
    }

    /// Write the terminating comment line. Idempotent; safe to call more
    /// than once (only the first call writes anything).
    pub fn finish(&mut self) -> EngineResult<()> {
        if self.finished {
            return Ok(());
        }
        writeln!(self.writer, "# completed {} frames", self.frames_written)?;
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for ProfileLog {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_writes_header_rows_and_trailer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.csv");
        {
            let mut log = ProfileLog::create(&path).unwrap();
            for frame in 0..3 {
                log.record(&FrameSample { frame, frame_ms: 8.0, ..Default::default() }).unwrap();
            }
            log.finish().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines.len(), 1 + 3 + 1);
        assert_eq!(lines.last().unwrap(), &"# completed 3 frames");
    }

    #[test]
    fn finish_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.csv");
        let mut log = ProfileLog::create(&path).unwrap();
        log.record(&FrameSample::default()).unwrap();
        log.finish().unwrap();
        log.finish().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().filter(|l| l.starts_with('#')).count(), 1);
    }
}
