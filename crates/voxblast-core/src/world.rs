//! World access: the block-lookup and occlusion-raycast primitive the host
//! provides to the engine.

use crate::math::{BlockPos, Face, Vec3};

/// Runtime block identifier. 0 is always air.
pub type BlockId = u32;

/// The empty block.
pub const AIR: BlockId = 0;

/// Result of a raycast terminating on opaque geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Block the ray stopped in.
    pub position: BlockPos,
    /// Exact point where the ray entered the block.
    pub intersection: Vec3,
    /// Face the ray entered through.
    pub face: Face,
}

/// Read-only view of the voxel grid.
///
/// Implemented by the host; the engine never mutates the world.
pub trait WorldView: Send + Sync {
    /// Block at `pos`; `AIR` for unloaded or empty positions.
    fn block_at(&self, pos: BlockPos) -> BlockId;

    fn is_air(&self, pos: BlockPos) -> bool {
        self.block_at(pos) == AIR
    }

    /// First opaque block along `dir` from `origin`, within `max_distance`.
    /// `None` means the ray is unobstructed.
    fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f64) -> Option<RayHit>;
}
