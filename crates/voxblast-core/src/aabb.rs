//! Axis-aligned bounding boxes and the charge volumes derived from a base block.

use crate::math::{BlockPos, Vec3};

/// An axis-aligned box in continuous world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

impl Aabb {
    pub fn new(min_x: f64, min_y: f64, min_z: f64, max_x: f64, max_y: f64, max_z: f64) -> Self {
        Self {
            min_x,
            min_y,
            min_z,
            max_x,
            max_y,
            max_z,
        }
    }

    /// The unit cube occupied by a block.
    pub fn from_block(pos: BlockPos) -> Self {
        let (x, y, z) = (pos.x as f64, pos.y as f64, pos.z as f64);
        Self::new(x, y, z, x + 1.0, y + 1.0, z + 1.0)
    }

    /// Hitbox for an entity standing at `feet` with the given dimensions,
    /// centered on x/z with the feet at min-y.
    pub fn from_entity(feet: Vec3, width: f64, height: f64) -> Self {
        let half = width / 2.0;
        Self::new(
            feet.x - half,
            feet.y,
            feet.z - half,
            feet.x + half,
            feet.y + height,
            feet.z + half,
        )
    }

    pub fn extents(&self) -> (f64, f64, f64) {
        (
            self.max_x - self.min_x,
            self.max_y - self.min_y,
            self.max_z - self.min_z,
        )
    }

    /// Grow (positive) or shrink (negative) each side by the given amounts.
    pub fn expanded(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(
            self.min_x - dx,
            self.min_y - dy,
            self.min_z - dz,
            self.max_x + dx,
            self.max_y + dy,
            self.max_z + dz,
        )
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
            && self.min_z < other.max_z
            && self.max_z > other.min_z
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min_x
            && p.x <= self.max_x
            && p.y >= self.min_y
            && p.y <= self.max_y
            && p.z >= self.min_z
            && p.z <= self.max_z
    }

    /// Euclidean distance from the box surface to a point; 0 if inside.
    pub fn distance_to(&self, p: Vec3) -> f64 {
        let dx = (self.min_x - p.x).max(0.0).max(p.x - self.max_x);
        let dy = (self.min_y - p.y).max(0.0).max(p.y - self.max_y);
        let dz = (self.min_z - p.z).max(0.0).max(p.z - self.max_z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// The eight corner points.
    pub fn vertices(&self) -> [Vec3; 8] {
        [
            Vec3::new(self.min_x, self.min_y, self.min_z),
            Vec3::new(self.max_x, self.min_y, self.min_z),
            Vec3::new(self.min_x, self.max_y, self.min_z),
            Vec3::new(self.max_x, self.max_y, self.min_z),
            Vec3::new(self.min_x, self.min_y, self.max_z),
            Vec3::new(self.max_x, self.min_y, self.max_z),
            Vec3::new(self.min_x, self.max_y, self.max_z),
            Vec3::new(self.max_x, self.max_y, self.max_z),
        ]
    }

    /// Whether the segment from `a` to `b` passes through the box (slab test).
    pub fn intersects_segment(&self, a: Vec3, b: Vec3) -> bool {
        let dir = b - a;
        let mut t_min: f64 = 0.0;
        let mut t_max: f64 = 1.0;
        for (origin, delta, lo, hi) in [
            (a.x, dir.x, self.min_x, self.max_x),
            (a.y, dir.y, self.min_y, self.max_y),
            (a.z, dir.z, self.min_z, self.max_z),
        ] {
            if delta.abs() < 1e-12 {
                if origin < lo || origin > hi {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / delta;
            let (t0, t1) = ((lo - origin) * inv, (hi - origin) * inv);
            t_min = t_min.max(t0.min(t1));
            t_max = t_max.min(t0.max(t1));
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

/// Volume a charge placed on `base` occupies for overlap purposes: one block
/// of margin around the base on x/z, two blocks tall above it.
pub fn charge_occupancy(base: BlockPos) -> Aabb {
    let (x, y, z) = (base.x as f64, base.y as f64, base.z as f64);
    Aabb::new(x - 0.5, y + 1.0, z - 0.5, x + 1.5, y + 3.0, z + 1.5)
}

/// Tighter volume used when matching a blast against a tracked charge.
pub fn charge_blast_volume(base: BlockPos) -> Aabb {
    let (x, y, z) = (base.x as f64, base.y as f64, base.z as f64);
    Aabb::new(x - 0.5, y + 1.0, z - 0.5, x + 1.5, y + 2.0, z + 1.5)
}
