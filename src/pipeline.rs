//! The async generation pipeline: a bounded candidate queue, a worker pool,
//! and a bounded result queue (§4.E).
//!
//! Generalizes the teacher's `chunk/streaming.rs` task-per-chunk scheduling
//! (there built on `bevy::tasks::AsyncComputeTaskPool`) onto a plain
//! `crossbeam-channel` worker pool, since the spec explicitly rules out a
//! user-space async runtime (§9, "Coroutines/async").

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::chunk::Chunk;
use crate::coords::ChunkCoord;
use crate::persistence::PersistenceStore;
use crate::terrain::TerrainSource;

/// A completed chunk, produced either by generation or by loading it from
/// disk.
pub struct GenerationResult {
    pub coord: ChunkCoord,
    pub chunk: Chunk,
}

/// Shared, read-only context every worker uses to produce a chunk: terrain
/// holds no mutable state, persistence serializes per region internally, so
/// this is safe to share across worker threads without further locking.
struct Producer {
    terrain: Arc<dyn TerrainSource>,
    persistence: Arc<PersistenceStore>,
}

impl Producer {
    fn produce(&self, coord: ChunkCoord) -> Chunk {
        match self.persistence.load_chunk(coord) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => self.terrain.generate_chunk(coord),
            Err(err) => {
                tracing::warn!(?coord, %err, "load_chunk failed during generation, falling back to fresh terrain");
                self.terrain.generate_chunk(coord)
            }
        }
    }
}

/// Bounded candidate/result queues plus the worker pool draining them.
/// Workers never touch the residency set directly (§4.E): the residency
/// manager is the pipeline's sole producer and sole consumer.
pub struct GenerationPipeline {
    candidate_tx: Sender<ChunkCoord>,
    result_tx: Sender<GenerationResult>,
    result_rx: Receiver<GenerationResult>,
    workers: Vec<JoinHandle<()>>,
}

/// `max(2, logical_cpus - 1)`, per §4.E.
#[must_use]
pub fn default_worker_count() -> usize {
    let cpus = std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(2);
    cpus.saturating_sub(1).max(2)
}

impl GenerationPipeline {
    #[must_use]
    pub fn new(
        terrain: Arc<dyn TerrainSource>,
        persistence: Arc<PersistenceStore>,
        candidate_capacity: usize,
        result_capacity: usize,
        worker_count: usize,
    ) -> Self {
        let (candidate_tx, candidate_rx) = crossbeam_channel::bounded::<ChunkCoord>(candidate_capacity);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<GenerationResult>(result_capacity);

        let producer = Arc::new(Producer { terrain, persistence });

        let workers = (0..worker_count.max(1))
            .map(|id| {
                let candidate_rx = candidate_rx.clone();
                let result_tx = result_tx.clone();
                let producer = producer.clone();
                std::thread::Builder::new()
                    .name(format!("chunkstream-worker-{id}"))
                    .spawn(move || worker_loop(&candidate_rx, &result_tx, producer.as_ref()))
                    .expect("failed to spawn generation worker thread")
            })
            .collect();

        Self { candidate_tx, result_tx, result_rx, workers }
    }

    /// Non-blocking enqueue respecting the bounded candidate queue. Callers
    /// should prefer enqueuing nearer candidates first so that, when the
    /// queue is full, the farther ones are simply never sent this tick
    /// rather than displacing something already pending (§4.E back-pressure).
    pub fn try_enqueue(&self, coord: ChunkCoord) -> bool {
        match self.candidate_tx.try_send(coord) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Drain everything currently sitting in the result queue without
    /// blocking.
    pub fn drain_results(&self) -> Vec<GenerationResult> {
        self.result_rx.try_iter().collect()
    }

    /// Push a result back onto the result queue (used by the residency
    /// manager when an admission budget leaves some installs for later).
    pub fn requeue_result(&self, result: GenerationResult) -> bool {
        self.result_tx.try_send(result).is_ok()
    }

    #[must_use]
    pub fn candidate_queue_len(&self) -> usize {
        self.candidate_tx.len()
    }

    #[must_use]
    pub fn candidate_queue_capacity(&self) -> usize {
        self.candidate_tx.capacity().unwrap_or(0)
    }

    /// Close the candidate queue and join every worker. Cooperative: workers
    /// finish whatever item they already popped before observing the close.
    pub fn shutdown(mut self) {
        drop(self.candidate_tx);
        drop(self.result_tx);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(candidate_rx: &Receiver<ChunkCoord>, result_tx: &Sender<GenerationResult>, producer: &Producer) {
    loop {
        match candidate_rx.recv() {
            Ok(coord) => {
                let chunk = producer.produce(coord);
                if result_tx.send(GenerationResult { coord, chunk }).is_err() {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::BiomeRegistry;
    use crate::terrain::NoiseTerrain;
    use tempfile::tempdir;

    fn test_pipeline() -> (GenerationPipeline, Arc<PersistenceStore>) {
        let root = tempdir().unwrap();
        let persistence = Arc::new(
            PersistenceStore::open_world(root.path(), "alpha", crate::persistence::OpenOptions::default(), 1000).unwrap(),
        );
        std::mem::forget(root); // keep tempdir alive for the test's duration
        let terrain = Arc::new(NoiseTerrain::new(1, Arc::new(BiomeRegistry::default())));
        let pipeline = GenerationPipeline::new(terrain, persistence.clone(), 8, 8, 2);
        (pipeline, persistence)
    }

    #[test]
    fn candidate_round_trips_to_a_result() {
        let (pipeline, _persistence) = test_pipeline();
        let coord = ChunkCoord::new(2, 2);
        assert!(pipeline.try_enqueue(coord));

        let mut results = Vec::new();
        for _ in 0..100 {
            results.extend(pipeline.drain_results());
            if !results.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].coord, coord);
        pipeline.shutdown();
    }

    #[test]
    fn shutdown_joins_all_workers_without_panicking() {
        let (pipeline, _persistence) = test_pipeline();
        pipeline.shutdown();
    }
}
