use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chunkstream::biome::BiomeRegistry;
use chunkstream::composer::lod_transition;
use chunkstream::coords::ChunkCoord;
use chunkstream::mesher::{generate_mesh, generate_surface_mesh, NeighborLookup, NoNeighbors};
use chunkstream::terrain::{NoiseTerrain, TerrainSource};

/// Terrain generation for a small grid of chunks, exercising the layered
/// noise sampling that dominates cold-chunk production cost.
fn bench_chunk_generate(c: &mut Criterion) {
    let terrain = NoiseTerrain::new(7, Arc::new(BiomeRegistry::default()));

    c.bench_function("chunk_generate", |b| {
        b.iter(|| {
            for cx in 0..10 {
                for cz in 0..10 {
                    let chunk = terrain.generate_chunk(ChunkCoord::new(cx, cz));
                    black_box(&chunk);
                }
            }
        })
    });
}

/// Full greedy mesher over a chunk with no resident neighbors (every
/// boundary face conservatively exposed — the worst case for face count).
fn bench_mesh_generation_isolated(c: &mut Criterion) {
    let terrain = NoiseTerrain::new(7, Arc::new(BiomeRegistry::default()));
    let chunk = terrain.generate_chunk(ChunkCoord::new(0, 0));

    c.bench_function("mesh_generation_isolated", |b| {
        b.iter(|| {
            let mesh = generate_mesh(black_box(&chunk), &NoNeighbors);
            black_box(&mesh);
        })
    });
}

/// Full greedy mesher with all eight neighbors resident, exercising the
/// cross-chunk boundary-face suppression path.
fn bench_mesh_generation_with_neighbors(c: &mut Criterion) {
    let terrain = NoiseTerrain::new(7, Arc::new(BiomeRegistry::default()));
    let mut chunks: HashMap<ChunkCoord, chunkstream::chunk::Chunk> = HashMap::new();
    for dx in -1..=1 {
        for dz in -1..=1 {
            let coord = ChunkCoord::new(dx, dz);
            chunks.insert(coord, terrain.generate_chunk(coord));
        }
    }
    let target = chunks[&ChunkCoord::new(0, 0)].clone();

    c.bench_function("mesh_generation_with_neighbors", |b| {
        b.iter(|| {
            let mesh = generate_mesh(black_box(&target), &chunks as &dyn NeighborLookup);
            black_box(&mesh);
        })
    });
}

/// Coarse surface-LOD meshing at the two non-full cell sizes, with skirts.
fn bench_surface_mesh_variants(c: &mut Criterion) {
    let terrain = NoiseTerrain::new(7, Arc::new(BiomeRegistry::default()));
    let chunk = terrain.generate_chunk(ChunkCoord::new(3, -4));

    c.bench_function("surface_mesh_medium", |b| {
        b.iter(|| black_box(generate_surface_mesh(black_box(&chunk), 2, true, 0.05)))
    });
    c.bench_function("surface_mesh_far", |b| {
        b.iter(|| black_box(generate_surface_mesh(black_box(&chunk), 4, true, 0.05)))
    });
}

/// The LOD hysteresis state machine is called once per visible chunk per
/// frame; keep it cheap.
fn bench_lod_transition(c: &mut Criterion) {
    use chunkstream::composer::Detail;
    c.bench_function("lod_transition_sweep", |b| {
        b.iter(|| {
            let mut state = Detail::Full;
            for step in 0..2_000 {
                let dist2 = (step as f32) * 3.0;
                state = lod_transition(black_box(state), black_box(dist2));
            }
            black_box(state);
        })
    });
}

/// A generation pipeline under steady load: enqueue a grid of candidates
/// and drain results as they complete.
fn bench_pipeline_throughput(c: &mut Criterion) {
    use chunkstream::persistence::{OpenOptions, PersistenceStore};
    use chunkstream::pipeline::GenerationPipeline;

    let dir = tempfile::tempdir().unwrap();
    let persistence = Arc::new(PersistenceStore::open_world(dir.path(), "bench", OpenOptions::default(), 0).unwrap());
    let terrain: Arc<dyn TerrainSource> = Arc::new(NoiseTerrain::new(1, Arc::new(BiomeRegistry::default())));

    c.bench_function("pipeline_64_chunk_round_trip", |b| {
        b.iter(|| {
            let pipeline = GenerationPipeline::new(terrain.clone(), persistence.clone(), 128, 128, 4);
            for cx in 0..8 {
                for cz in 0..8 {
                    pipeline.try_enqueue(ChunkCoord::new(cx, cz));
                }
            }
            let mut received = 0;
            while received < 64 {
                received += pipeline.drain_results().len();
                std::thread::yield_now();
            }
            pipeline.shutdown();
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(30);
    targets =
        bench_chunk_generate,
        bench_mesh_generation_isolated,
        bench_mesh_generation_with_neighbors,
        bench_surface_mesh_variants,
        bench_lod_transition,
        bench_pipeline_throughput,
}
criterion_main!(benches);
