//! Coordinate and spatial primitives: chunk keys, AABBs, and a frustum.
//!
//! All operations here are total and pure: no allocation, no I/O, no
//! dependence on global state. `glam` supplies the underlying vector and
//! matrix arithmetic.

use glam::{Mat4, Vec3, Vec4};

/// Side length of a chunk in blocks along X and Z.
pub const CHUNK_SIDE: i32 = 16;

/// Height of a chunk column in blocks.
pub const CHUNK_HEIGHT: i32 = 256;

/// A 2D chunk coordinate.
///
/// Chunk-to-world mapping: world block `(bx, by, bz)` lies in chunk
/// `(floor(bx / CHUNK_SIDE), floor(bz / CHUNK_SIDE))` at local
/// `(bx mod CHUNK_SIDE, by, bz mod CHUNK_SIDE)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cz: i32,
}

impl ChunkCoord {
    #[must_use]
    pub const fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz }
    }

    /// Locate the chunk coordinate and local block offset for a world position.
    #[must_use]
    pub fn from_world_block(bx: i32, bz: i32) -> (Self, i32, i32) {
        let cx = bx.div_euclid(CHUNK_SIDE);
        let cz = bz.div_euclid(CHUNK_SIDE);
        let lx = bx.rem_euclid(CHUNK_SIDE);
        let lz = bz.rem_euclid(CHUNK_SIDE);
        (Self::new(cx, cz), lx, lz)
    }

    /// World-space origin (minimum corner) of this chunk.
    #[must_use]
    pub fn origin(self) -> Vec3 {
        Vec3::new((self.cx * CHUNK_SIDE) as f32, 0.0, (self.cz * CHUNK_SIDE) as f32)
    }

    /// Chebyshev (L-infinity) distance in chunks between two coordinates.
    #[must_use]
    pub fn chebyshev_dist(self, other: Self) -> i32 {
        (self.cx - other.cx).abs().max((self.cz - other.cz).abs())
    }

    /// Squared XZ distance, in blocks, from this chunk's center to a world point.
    #[must_use]
    pub fn center_dist2(self, point_xz: (f32, f32)) -> f32 {
        let half = CHUNK_SIDE as f32 * 0.5;
        let cx = self.cx as f32 * CHUNK_SIDE as f32 + half;
        let cz = self.cz as f32 * CHUNK_SIDE as f32 + half;
        let dx = cx - point_xz.0;
        let dz = cz - point_xz.1;
        dx * dx + dz * dz
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Build an AABB centered on `center` with the given half-extents.
    #[must_use]
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    #[must_use]
    pub fn expand(self, margin: f32) -> Self {
        let m = Vec3::splat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    #[must_use]
    pub fn contains_aabb(self, other: Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// The eight corners of the box.
    #[must_use]
    pub fn corners(self) -> [Vec3; 8] {
        [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    #[must_use]
    pub fn center(self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// A single frustum clipping plane in `ax + by + cz + d = 0` form, normalized
/// so that `(a, b, c)` has unit length and positive-side points are "inside".
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    fn from_row(row: Vec4) -> Self {
        let normal = Vec3::new(row.x, row.y, row.z);
        let len = normal.length();
        if len <= f32::EPSILON {
            // Degenerate plane: treat everything as inside.
            return Self { normal: Vec3::ZERO, d: f32::MAX };
        }
        Self { normal: normal / len, d: row.w / len }
    }

    #[must_use]
    pub fn signed_distance(self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// A six-plane view frustum extracted from a combined view-projection matrix
/// via the standard Gribb-Hartmann row-extraction.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract the six clipping planes (left, right, bottom, top, near, far)
    /// from a combined view-projection matrix.
    #[must_use]
    pub fn from_view_projection(view_proj: Mat4) -> Self {
        let rows = view_proj.transpose();
        let row0 = rows.x_axis;
        let row1 = rows.y_axis;
        let row2 = rows.z_axis;
        let row3 = rows.w_axis;

        let planes = [
            Plane::from_row(row3 + row0), // left
            Plane::from_row(row3 - row0), // right
            Plane::from_row(row3 + row1), // bottom
            Plane::from_row(row3 - row1), // top
            Plane::from_row(row3 + row2), // near
            Plane::from_row(row3 - row2), // far
        ];
        Self { planes }
    }

    /// Returns true iff `box` is not fully outside any single plane.
    #[must_use]
    pub fn contains_aabb(&self, b: Aabb) -> bool {
        for plane in &self.planes {
            let mut all_outside = true;
            for corner in b.corners() {
                if plane.signed_distance(corner) >= 0.0 {
                    all_outside = false;
                    break;
                }
            }
            if all_outside {
                return false;
            }
        }
        true
    }
}
