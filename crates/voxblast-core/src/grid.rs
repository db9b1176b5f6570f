//! In-memory voxel store backing the simulator and the test suites.

use std::collections::HashMap;

use crate::math::{BlockPos, Face, Vec3};
use crate::world::{BlockId, RayHit, WorldView, AIR};

/// A sparse voxel grid; absent positions are air.
#[derive(Debug, Default, Clone)]
pub struct GridWorld {
    blocks: HashMap<BlockPos, BlockId>,
}

impl GridWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_block(&mut self, pos: BlockPos, id: BlockId) {
        if id == AIR {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, id);
        }
    }

    /// Fill the rectangular region between the two corners (inclusive).
    pub fn fill(&mut self, a: BlockPos, b: BlockPos, id: BlockId) {
        for x in a.x.min(b.x)..=a.x.max(b.x) {
            for y in a.y.min(b.y)..=a.y.max(b.y) {
                for z in a.z.min(b.z)..=a.z.max(b.z) {
                    self.set_block(BlockPos::new(x, y, z), id);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl WorldView for GridWorld {
    fn block_at(&self, pos: BlockPos) -> BlockId {
        self.blocks.get(&pos).copied().unwrap_or(AIR)
    }

    /// Voxel traversal (Amanatides–Woo): walk grid cells along the ray and
    /// stop at the first non-air block.
    fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f64) -> Option<RayHit> {
        let dir = dir.normalized();
        if dir == Vec3::ZERO || max_distance <= 0.0 {
            return None;
        }

        let mut cell = origin.floored();
        if !self.is_air(cell) {
            // Ray starts inside solid geometry.
            return Some(RayHit {
                position: cell,
                intersection: origin,
                face: Face::Up,
            });
        }

        let step = |d: f64| if d > 0.0 { 1 } else { -1 };
        let (sx, sy, sz) = (step(dir.x), step(dir.y), step(dir.z));

        // Distance along the ray between successive boundary crossings per axis.
        let delta = |d: f64| if d == 0.0 { f64::INFINITY } else { 1.0 / d.abs() };
        let (dx, dy, dz) = (delta(dir.x), delta(dir.y), delta(dir.z));

        // Distance along the ray to the first boundary crossing per axis.
        let first = |o: f64, d: f64, c: i32| -> f64 {
            if d == 0.0 {
                f64::INFINITY
            } else if d > 0.0 {
                (c as f64 + 1.0 - o) / d
            } else {
                (o - c as f64) / -d
            }
        };
        let mut tx = first(origin.x, dir.x, cell.x);
        let mut ty = first(origin.y, dir.y, cell.y);
        let mut tz = first(origin.z, dir.z, cell.z);

        loop {
            let (t, face) = if tx <= ty && tx <= tz {
                cell.x += sx;
                let t = tx;
                tx += dx;
                (t, if sx > 0 { Face::West } else { Face::East })
            } else if ty <= tz {
                cell.y += sy;
                let t = ty;
                ty += dy;
                (t, if sy > 0 { Face::Down } else { Face::Up })
            } else {
                cell.z += sz;
                let t = tz;
                tz += dz;
                (t, if sz > 0 { Face::North } else { Face::South })
            };

            if t > max_distance {
                return None;
            }
            if !self.is_air(cell) {
                return Some(RayHit {
                    position: cell,
                    intersection: origin + dir * t,
                    face,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STONE: BlockId = 1;

    #[test]
    fn set_and_get() {
        let mut w = GridWorld::new();
        let p = BlockPos::new(1, 2, 3);
        w.set_block(p, STONE);
        assert_eq!(w.block_at(p), STONE);
        w.set_block(p, AIR);
        assert!(w.is_air(p));
        assert!(w.is_empty());
    }

    #[test]
    fn fill_region() {
        let mut w = GridWorld::new();
        w.fill(BlockPos::new(0, 0, 0), BlockPos::new(2, 0, 2), STONE);
        assert_eq!(w.len(), 9);
        assert_eq!(w.block_at(BlockPos::new(1, 0, 1)), STONE);
    }

    #[test]
    fn raycast_hits_wall_with_face() {
        let mut w = GridWorld::new();
        w.fill(BlockPos::new(5, -2, -2), BlockPos::new(5, 2, 2), STONE);
        let hit = w
            .raycast(Vec3::new(0.5, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0), 10.0)
            .expect("wall in range");
        assert_eq!(hit.position, BlockPos::new(5, 0, 0));
        assert_eq!(hit.face, Face::West);
        assert!((hit.intersection.x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn raycast_respects_max_distance() {
        let mut w = GridWorld::new();
        w.set_block(BlockPos::new(5, 0, 0), STONE);
        let r = w.raycast(Vec3::new(0.5, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0), 3.0);
        assert!(r.is_none());
    }

    #[test]
    fn raycast_empty_world_misses() {
        let w = GridWorld::new();
        let r = w.raycast(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.3, 0.8, -0.2), 64.0);
        assert!(r.is_none());
    }

    #[test]
    fn raycast_diagonal_down_hits_top_face() {
        let mut w = GridWorld::new();
        w.fill(BlockPos::new(-4, 3, -4), BlockPos::new(4, 3, 4), STONE);
        let hit = w
            .raycast(Vec3::new(0.5, 6.0, 0.5), Vec3::new(0.2, -1.0, 0.1), 10.0)
            .expect("floor below");
        assert_eq!(hit.face, Face::Up);
        assert_eq!(hit.position.y, 3);
    }

    #[test]
    fn raycast_from_inside_solid() {
        let mut w = GridWorld::new();
        w.set_block(BlockPos::new(0, 0, 0), STONE);
        let hit = w
            .raycast(Vec3::new(0.5, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0), 5.0)
            .expect("origin block is solid");
        assert_eq!(hit.position, BlockPos::new(0, 0, 0));
    }

    #[test]
    fn raycast_negative_direction() {
        let mut w = GridWorld::new();
        w.set_block(BlockPos::new(-3, 0, 0), STONE);
        let hit = w
            .raycast(Vec3::new(0.5, 0.5, 0.5), Vec3::new(-1.0, 0.0, 0.0), 10.0)
            .expect("block to the west");
        assert_eq!(hit.position, BlockPos::new(-3, 0, 0));
        assert_eq!(hit.face, Face::East);
    }
}
