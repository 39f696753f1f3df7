//! Greedy meshing: full-detail block mesher and the coarser surface-LOD
//! mesher, both producing chunk-local `MeshBuffers` for the composer to
//! remap and combine (§4.G).
//!
//! The full mesher's per-axis mask-and-sweep structure is carried over from
//! the teacher's `chunk/mesh.rs` (`greedy_mesh_axis`/`process_slice`/
//! `coalesce_and_emit_quads`), generalized from the teacher's atlas-aware
//! `BlockId`/`BlockFace` pair to the spec's closed `Block` enum, and
//! extended to consult neighbor chunks across chunk boundaries instead of
//! treating every boundary face as exposed (open question #1 in
//! `DESIGN.md`: this crate does not preserve that bug).

use std::collections::HashMap;

use glam::{Vec2, Vec3};

use crate::block::Block;
use crate::chunk::Chunk;
use crate::coords::{ChunkCoord, CHUNK_HEIGHT, CHUNK_SIDE};

/// One mesh vertex, chunk-local (the composer translates by the chunk
/// origin when combining). `ao` is in `[0, 1]`; `1.0` is fully unoccluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub ao: f32,
    pub block: Block,
}

#[derive(Debug, Clone, Default)]
pub struct MeshBuffers {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshBuffers {
    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3, uvs: [Vec2; 4], ao: [f32; 4], block: Block) {
        let base = self.vertices.len() as u32;
        for i in 0..4 {
            self.vertices.push(Vertex { position: corners[i], normal, uv: uvs[i], ao: ao[i], block });
        }
        // AO-aware winding repair (§4.G): pick the diagonal that avoids an
        // interpolation seam across the quad's brighter corners.
        if ao[0] + ao[2] > ao[1] + ao[3] {
            self.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        } else {
            self.indices.extend_from_slice(&[base, base + 1, base + 3, base + 1, base + 2, base + 3]);
        }
    }
}

/// Read-only access to whatever neighbor chunks happen to be resident,
/// used to resolve faces at a chunk's boundary instead of treating them as
/// unconditionally exposed.
pub trait NeighborLookup {
    fn neighbor(&self, coord: ChunkCoord) -> Option<&Chunk>;
}

impl NeighborLookup for HashMap<ChunkCoord, Chunk> {
    fn neighbor(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.get(&coord)
    }
}

/// No neighbors available; every chunk boundary is conservatively exposed.
/// Useful for standalone meshing (tests, single-chunk previews).
pub struct NoNeighbors;

impl NeighborLookup for NoNeighbors {
    fn neighbor(&self, _coord: ChunkCoord) -> Option<&Chunk> {
        None
    }
}

const SIDE: i32 = CHUNK_SIDE;
const HEIGHT: i32 = CHUNK_HEIGHT;

/// Fetch the block at local coordinates, resolving out-of-chunk-Y as air and
/// out-of-chunk-X/Z by asking the neighbor chunk across that boundary (or
/// treating it as absent/non-solid if the neighbor is not resident).
fn sample(chunk: &Chunk, neighbors: &dyn NeighborLookup, lx: i32, ly: i32, lz: i32) -> Option<Block> {
    if !(0..HEIGHT).contains(&ly) {
        return Some(Block::Air);
    }
    if (0..SIDE).contains(&lx) && (0..SIDE).contains(&lz) {
        return chunk.get_block(lx, ly, lz).ok();
    }

    let dcx = lx.div_euclid(SIDE);
    let dcz = lz.div_euclid(SIDE);
    let ncoord = ChunkCoord::new(chunk.coord.cx + dcx, chunk.coord.cz + dcz);
    let nlx = lx.rem_euclid(SIDE);
    let nlz = lz.rem_euclid(SIDE);
    neighbors.neighbor(ncoord).and_then(|n| n.get_block(nlx, ly, nlz).ok())
}

/// `true` when a face looking from `(lx,ly,lz)` towards its neighbor in
/// `(dx,dy,dz)` should be emitted: the neighbor is absent (non-resident, so
/// conservatively treated as exposed) or present-but-non-solid.
fn face_exposed(chunk: &Chunk, neighbors: &dyn NeighborLookup, lx: i32, ly: i32, lz: i32, dx: i32, dy: i32, dz: i32) -> bool {
    match sample(chunk, neighbors, lx + dx, ly + dy, lz + dz) {
        Some(b) => !b.is_solid(),
        None => true,
    }
}

/// One of the four ambient-occlusion corners around a face vertex: two edge
/// cells and the diagonal cell, each either solid (occluding) or not.
fn corner_ao(side_a_solid: bool, side_b_solid: bool, corner_solid: bool) -> f32 {
    let occluders = if side_a_solid && side_b_solid {
        3
    } else {
        usize::from(side_a_solid) + usize::from(side_b_solid) + usize::from(corner_solid)
    };
    match occluders {
        0 => 1.0,
        1 => 0.8,
        2 => 0.6,
        _ => 0.45,
    }
}

/// AO for the four corners of a unit face at local block `(lx,ly,lz)` whose
/// outward normal is `(nx,ny,nz)`, sampled along the face's own tangent
/// plane at integer offsets `(du, dv)` relative to the face origin.
#[allow(clippy::too_many_arguments)]
fn face_corner_aos(
    chunk: &Chunk,
    neighbors: &dyn NeighborLookup,
    lx: i32,
    ly: i32,
    lz: i32,
    axis: usize,
    normal_dir: i32,
    width: i32,
    height: i32,
) -> [f32; 4] {
    let u_axis = (axis + 1) % 3;
    let v_axis = (axis + 2) % 3;

    let mut offset = [0i32; 3];
    offset[axis] = normal_dir;

    let corner_offsets: [(i32, i32); 4] = [(0, 0), (width, 0), (width, height), (0, height)];
    let mut result = [1.0f32; 4];

    for (i, (du, dv)) in corner_offsets.iter().copied().enumerate() {
        // The two edge-adjacent tangent cells and the diagonal tangent cell,
        // both shifted one step further out along the face normal so they
        // sit in the plane immediately outside the emitted face.
        let mut edge_a = offset;
        edge_a[u_axis] += signed_step(du);
        let mut edge_b = offset;
        edge_b[v_axis] += signed_step(dv);
        let mut corner = offset;
        corner[u_axis] += signed_step(du);
        corner[v_axis] += signed_step(dv);

        let at = |o: [i32; 3]| sample(chunk, neighbors, lx + o[0], ly + o[1], lz + o[2]).is_some_and(Block::is_solid);
        result[i] = corner_ao(at(edge_a), at(edge_b), at(corner));
    }
    result
}

/// Corner offsets are either at `0` or at the quad's far edge; normalize to
/// a single outward step so AO sampling stays within one cell of the face.
fn signed_step(extent: i32) -> i32 {
    if extent > 0 {
        1
    } else {
        -1
    }
}

struct QuadDesc {
    slice: i32,
    col: i32,
    row: i32,
    width: i32,
    height: i32,
    axis: usize,
    direction: i32,
    block: Block,
}

fn emit_quad(chunk: &Chunk, neighbors: &dyn NeighborLookup, desc: &QuadDesc, out: &mut MeshBuffers) {
    let axis = desc.axis;
    let u_axis = (axis + 1) % 3;
    let v_axis = (axis + 2) % 3;
    let slice_val = if desc.direction == 1 { desc.slice + 1 } else { desc.slice };

    let mut corner = |u: i32, v: i32| -> Vec3 {
        let mut p = [0.0f32; 3];
        p[axis] = slice_val as f32;
        p[u_axis] = u as f32;
        p[v_axis] = v as f32;
        Vec3::from(p)
    };

    let raw_corners = [
        corner(desc.col, desc.row),
        corner(desc.col + desc.width, desc.row),
        corner(desc.col + desc.width, desc.row + desc.height),
        corner(desc.col, desc.row + desc.height),
    ];

    let mut normal = [0.0f32; 3];
    normal[axis] = desc.direction as f32;
    let normal = Vec3::from(normal);

    // The local coordinate whose face we're looking from, to sample AO
    // relative to: the block just inside the exposed face.
    let mut local = [0i32; 3];
    local[axis] = if desc.direction == 1 { desc.slice } else { desc.slice };
    local[u_axis] = desc.col;
    local[v_axis] = desc.row;

    let ao = face_corner_aos(chunk, neighbors, local[0], local[1], local[2], axis, desc.direction, desc.width, desc.height);

    let width_f = desc.width as f32;
    let height_f = desc.height as f32;
    let raw_uvs = [Vec2::new(0.0, 0.0), Vec2::new(width_f, 0.0), Vec2::new(width_f, height_f), Vec2::new(0.0, height_f)];

    if desc.direction == 1 {
        out.push_quad(raw_corners, normal, raw_uvs, ao, desc.block);
    } else {
        // Flip winding order for the negative-direction face so it still
        // faces outward; AO/UV stay paired with their original corner.
        let corners = [raw_corners[0], raw_corners[3], raw_corners[2], raw_corners[1]];
        let uvs = [raw_uvs[0], raw_uvs[3], raw_uvs[2], raw_uvs[1]];
        let ao2 = [ao[0], ao[3], ao[2], ao[1]];
        out.push_quad(corners, normal, uvs, ao2, desc.block);
    }
}

fn axis_extent(axis: usize) -> i32 {
    if axis == 1 {
        HEIGHT
    } else {
        SIDE
    }
}

fn greedy_mesh_axis(chunk: &Chunk, neighbors: &dyn NeighborLookup, axis: usize, out: &mut MeshBuffers) {
    let u_axis = (axis + 1) % 3;
    let v_axis = (axis + 2) % 3;
    let u_extent = axis_extent(u_axis);
    let v_extent = axis_extent(v_axis);
    let slice_extent = axis_extent(axis);

    for direction in [1, -1] {
        let mut mask: Vec<Option<Block>> = vec![None; (u_extent * v_extent) as usize];

        for slice in 0..slice_extent {
            for m in mask.iter_mut() {
                *m = None;
            }

            for col in 0..u_extent {
                for row in 0..v_extent {
                    let mut local = [0i32; 3];
                    local[axis] = slice;
                    local[u_axis] = col;
                    local[v_axis] = row;

                    let Some(block) = sample(chunk, neighbors, local[0], local[1], local[2]) else { continue };
                    if block.is_air() {
                        continue;
                    }

                    let mut step = [0i32; 3];
                    step[axis] = direction;
                    if face_exposed(chunk, neighbors, local[0], local[1], local[2], step[0], step[1], step[2]) {
                        mask[(col + row * u_extent) as usize] = Some(block);
                    }
                }
            }

            sweep_mask(&mut mask, u_extent, v_extent, |col, row, width, height, block| {
                emit_quad(
                    chunk,
                    neighbors,
                    &QuadDesc { slice, col, row, width, height, axis, direction, block },
                    out,
                );
            });
        }
    }
}

/// Greedy rectangle sweep over a 2D mask: scan, grow each non-empty cell
/// rightward then downward while the run matches, clear the covered cells,
/// and invoke `emit` once per merged rectangle.
fn sweep_mask(mask: &mut [Option<Block>], u_extent: i32, v_extent: i32, mut emit: impl FnMut(i32, i32, i32, i32, Block)) {
    for row in 0..v_extent {
        for col in 0..u_extent {
            let idx = (col + row * u_extent) as usize;
            let Some(block) = mask[idx] else { continue };

            let mut width = 1;
            while col + width < u_extent && mask[(col + width + row * u_extent) as usize] == Some(block) {
                width += 1;
            }

            let mut height = 1;
            'grow: while row + height < v_extent {
                for du in 0..width {
                    if mask[(col + du + (row + height) * u_extent) as usize] != Some(block) {
                        break 'grow;
                    }
                }
                height += 1;
            }

            for dv in 0..height {
                for du in 0..width {
                    mask[(col + du + (row + dv) * u_extent) as usize] = None;
                }
            }

            emit(col, row, width, height, block);
        }
    }
}

/// Full-detail greedy mesh: every exposed face, merged into maximal
/// same-block rectangles per slice.
#[must_use]
pub fn generate_mesh(chunk: &Chunk, neighbors: &dyn NeighborLookup) -> MeshBuffers {
    let mut out = MeshBuffers::default();
    for axis in 0..3 {
        greedy_mesh_axis(chunk, neighbors, axis, &mut out);
    }
    out
}

/// Tallest non-air column height (exclusive) and the block type at its top,
/// or `None` if the column is entirely air.
fn column_top(chunk: &Chunk, lx: i32, lz: i32) -> Option<(i32, Block)> {
    for ly in (0..HEIGHT).rev() {
        let b = chunk.get_block(lx, ly, lz).ok()?;
        if !b.is_air() {
            return Some((ly, b));
        }
    }
    None
}

/// Coarse surface-only mesh: one quad per `cell_size`x`cell_size` XZ cell at
/// its tallest column's height, normal from a finite-difference slope
/// against neighboring cells, optionally sealed with skirts (§4.G).
#[must_use]
pub fn generate_surface_mesh(chunk: &Chunk, cell_size: i32, emit_skirts: bool, skirt_depth: f32) -> MeshBuffers {
    let mut out = MeshBuffers::default();
    let cells_per_side = (SIDE / cell_size).max(1);

    // Per-cell (height, block) sampled at the cell's tallest column.
    let mut heights = vec![0.0f32; (cells_per_side * cells_per_side) as usize];
    let mut tops = vec![Block::Air; (cells_per_side * cells_per_side) as usize];

    for cz in 0..cells_per_side {
        for cx in 0..cells_per_side {
            let mut best: Option<(i32, Block)> = None;
            for lz in (cz * cell_size)..((cz + 1) * cell_size) {
                for lx in (cx * cell_size)..((cx + 1) * cell_size) {
                    if let Some((h, b)) = column_top(chunk, lx, lz) {
                        if best.is_none_or(|(bh, _)| h > bh) {
                            best = Some((h, b));
                        }
                    }
                }
            }
            let idx = (cx + cz * cells_per_side) as usize;
            let (h, b) = best.unwrap_or((0, Block::Air));
            heights[idx] = (h + 1) as f32;
            tops[idx] = b;
        }
    }

    let at = |cx: i32, cz: i32| -> f32 {
        let cx = cx.clamp(0, cells_per_side - 1);
        let cz = cz.clamp(0, cells_per_side - 1);
        heights[(cx + cz * cells_per_side) as usize]
    };

    for cz in 0..cells_per_side {
        for cx in 0..cells_per_side {
            let idx = (cx + cz * cells_per_side) as usize;
            let block = tops[idx];
            if block.is_air() {
                continue;
            }
            let top = heights[idx];

            let x0 = (cx * cell_size) as f32;
            let x1 = ((cx + 1) * cell_size) as f32;
            let z0 = (cz * cell_size) as f32;
            let z1 = ((cz + 1) * cell_size) as f32;

            // Finite-difference slope from neighboring cell heights for
            // smooth cross-cell shading.
            let dx = (at(cx + 1, cz) - at(cx - 1, cz)) / (2.0 * cell_size as f32);
            let dz = (at(cx, cz + 1) - at(cx, cz - 1)) / (2.0 * cell_size as f32);
            let normal = Vec3::new(-dx, 1.0, -dz).normalize_or_zero();
            let normal = if normal == Vec3::ZERO { Vec3::Y } else { normal };

            let corners = [
                Vec3::new(x0, top, z0),
                Vec3::new(x1, top, z0),
                Vec3::new(x1, top, z1),
                Vec3::new(x0, top, z1),
            ];
            let uvs = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)];
            out.push_quad(corners, normal, uvs, [1.0; 4], block);

            if emit_skirts {
                let local_min = [at(cx - 1, cz), at(cx + 1, cz), at(cx, cz - 1), at(cx, cz + 1)]
                    .into_iter()
                    .fold(top, f32::min)
                    - skirt_depth;
                if local_min < top {
                    emit_skirt_walls(&mut out, x0, x1, z0, z1, top, local_min, block);
                    let underside = [
                        Vec3::new(x0, local_min, z0),
                        Vec3::new(x0, local_min, z1),
                        Vec3::new(x1, local_min, z1),
                        Vec3::new(x1, local_min, z0),
                    ];
                    out.push_quad(underside, Vec3::NEG_Y, uvs, [1.0; 4], block);
                }
            }
        }
    }

    out
}

fn emit_skirt_walls(out: &mut MeshBuffers, x0: f32, x1: f32, z0: f32, z1: f32, top: f32, bottom: f32, block: Block) {
    let uvs = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)];
    let walls = [
        // -Z wall
        ([Vec3::new(x0, top, z0), Vec3::new(x1, top, z0), Vec3::new(x1, bottom, z0), Vec3::new(x0, bottom, z0)], Vec3::NEG_Z),
        // +Z wall
        ([Vec3::new(x1, top, z1), Vec3::new(x0, top, z1), Vec3::new(x0, bottom, z1), Vec3::new(x1, bottom, z1)], Vec3::Z),
        // -X wall
        ([Vec3::new(x0, top, z1), Vec3::new(x0, top, z0), Vec3::new(x0, bottom, z0), Vec3::new(x0, bottom, z1)], Vec3::NEG_X),
        // +X wall
        ([Vec3::new(x1, top, z0), Vec3::new(x1, top, z1), Vec3::new(x1, bottom, z1), Vec3::new(x1, bottom, z0)], Vec3::X),
    ];
    for (corners, normal) in walls {
        out.push_quad(corners, normal, uvs, [1.0; 4], block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;

    fn flat_chunk(coord: ChunkCoord, height: i32) -> Chunk {
        let mut c = Chunk::new(coord);
        for x in 0..CHUNK_SIDE {
            for z in 0..CHUNK_SIDE {
                for y in 0..height {
                    c.set_block(x, y, z, Block::Stone).unwrap();
                }
            }
        }
        c.clear_modified();
        c
    }

    #[test]
    fn flat_slab_merges_top_face_into_one_quad() {
        let chunk = flat_chunk(ChunkCoord::new(0, 0), 4);
        let mesh = generate_mesh(&chunk, &NoNeighbors);
        // Exactly one quad (4 verts, 6 indices) should cover the whole top face.
        let top_quads = mesh
            .vertices
            .chunks(4)
            .filter(|quad| quad.iter().all(|v| v.normal == Vec3::Y))
            .count();
        assert_eq!(top_quads, 1);
    }

    #[test]
    fn isolated_single_block_has_six_faces() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        chunk.set_block(8, 8, 8, Block::Stone).unwrap();
        let mesh = generate_mesh(&chunk, &NoNeighbors);
        assert_eq!(mesh.vertices.len(), 6 * 4);
        assert_eq!(mesh.indices.len(), 6 * 6);
    }

    #[test]
    fn neighbor_chunk_suppresses_shared_boundary_face() {
        let mut a = Chunk::new(ChunkCoord::new(0, 0));
        let mut b = Chunk::new(ChunkCoord::new(1, 0));
        for y in 0..4 {
            for z in 0..CHUNK_SIDE {
                a.set_block(CHUNK_SIDE - 1, y, z, Block::Stone).unwrap();
                b.set_block(0, y, z, Block::Stone).unwrap();
            }
        }
        let mut neighbors = HashMap::new();
        neighbors.insert(b.coord, b);

        let mesh = generate_mesh(&a, &neighbors);
        let plus_x_faces = mesh.vertices.chunks(4).filter(|q| q.iter().all(|v| v.normal == Vec3::X)).count();
        assert_eq!(plus_x_faces, 0, "resident neighbor covers the +X boundary face");

        a.coord = ChunkCoord::new(0, 0);
        let mesh_no_neighbor = generate_mesh(&a, &NoNeighbors);
        let plus_x_faces_exposed = mesh_no_neighbor.vertices.chunks(4).filter(|q| q.iter().all(|v| v.normal == Vec3::X)).count();
        assert!(plus_x_faces_exposed > 0, "non-resident neighbor is conservatively exposed");
    }

    #[test]
    fn surface_mesh_emits_one_quad_per_cell() {
        let chunk = flat_chunk(ChunkCoord::new(0, 0), 4);
        let mesh = generate_surface_mesh(&chunk, 4, false, 0.05);
        assert_eq!(mesh.vertices.len() / 4, (CHUNK_SIDE / 4 * CHUNK_SIDE / 4) as usize);
    }

    #[test]
    fn surface_mesh_with_skirts_has_more_geometry() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        for x in 0..8 {
            for z in 0..CHUNK_SIDE {
                chunk.set_block(x, 10, z, Block::Stone).unwrap();
            }
        }
        for x in 8..CHUNK_SIDE {
            for z in 0..CHUNK_SIDE {
                chunk.set_block(x, 3, z, Block::Stone).unwrap();
            }
        }
        let flat = generate_surface_mesh(&chunk, 4, false, 0.05);
        let skirted = generate_surface_mesh(&chunk, 4, true, 0.05);
        assert!(skirted.vertices.len() > flat.vertices.len());
    }
}
