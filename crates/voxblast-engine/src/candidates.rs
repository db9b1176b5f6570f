//! Candidate position search: legal base blocks for a new charge near the
//! target, annotated with aim data and raw damage.

use tracing::trace;

use voxblast_core::aabb::charge_occupancy;
use voxblast_core::damage::{blast_damage, Difficulty, CHARGE_POWER};
use voxblast_core::{Aabb, BlockPos, EntitySnapshot, Face, Vec3, WorldView};

use crate::config::{EngineConfig, RaycastMode};
use crate::host::AgentState;

/// Horizontal shrink applied to a candidate's occupancy volume before
/// testing it against player hitboxes, so a player standing flush against
/// the block does not reject it.
const PLAYER_OVERLAP_SHRINK: f64 = 0.305;

/// One legal placement, immutable once produced for a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementCandidate {
    pub block: BlockPos,
    /// Exact point the agent aims at when placing.
    pub aim_point: Vec3,
    pub face: Face,
    /// Raw damage to the current target from a charge on this block.
    pub damage: f64,
}

impl PlacementCandidate {
    pub fn occupancy(&self) -> Aabb {
        charge_occupancy(self.block)
    }

    /// Blast source point of the charge this candidate would place.
    pub fn source(&self) -> Vec3 {
        self.block.charge_center()
    }
}

/// Enumerate legal placements for `target`, nearest-to-target first.
///
/// `players` are the player-type actors whose hitboxes placements must not
/// intersect (the target included); `claimed` are the volumes already spoken
/// for per the configured source policy.
pub fn find_candidates(
    world: &dyn WorldView,
    agent: &AgentState,
    target: &EntitySnapshot,
    players: &[EntitySnapshot],
    claimed: &[Aabb],
    config: &EngineConfig,
    damage_multiplier: f64,
) -> Vec<PlacementCandidate> {
    let mut blocks = scan_blocks(world, target.position, config);
    blocks.sort_by(|a, b| {
        a.distance_sq_to(target.position)
            .total_cmp(&b.distance_sq_to(target.position))
    });

    let mut out = Vec::new();
    for block in blocks {
        if let Some(candidate) = evaluate_position(
            world,
            agent,
            target,
            players,
            claimed,
            config,
            damage_multiplier,
            block,
        ) {
            out.push(candidate);
            if config.lookup.candidate_limit != 0 && out.len() >= config.lookup.candidate_limit {
                break;
            }
        }
    }
    trace!(target = %target.id, count = out.len(), "candidate search done");
    out
}

/// Full legality check for one base block. Used by the bulk search and by
/// the predict-on-break path, which re-tests a single freed position.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_position(
    world: &dyn WorldView,
    agent: &AgentState,
    target: &EntitySnapshot,
    players: &[EntitySnapshot],
    claimed: &[Aabb],
    config: &EngineConfig,
    damage_multiplier: f64,
    block: BlockPos,
) -> Option<PlacementCandidate> {
    if !config.lookup.placeable.contains(&world.block_at(block)) || !world.is_air(block.up()) {
        return None;
    }
    if in_standing_column(agent.position, block) {
        return None;
    }

    let occupancy = charge_occupancy(block);
    if claimed.iter().any(|v| occupancy.intersects(v)) {
        return None;
    }
    let shrunk = occupancy.expanded(-PLAYER_OVERLAP_SHRINK, 0.0, -PLAYER_OVERLAP_SHRINK);
    if players
        .iter()
        .filter(|p| p.is_player())
        .any(|p| shrunk.intersects(&p.aabb()))
    {
        return None;
    }

    let block_box = Aabb::from_block(block);
    let reach = block_box
        .distance_to(agent.position)
        .min(block_box.distance_to(agent.eye_position));
    if reach > config.placement.range {
        return None;
    }

    let (aim_point, face) = match config.placement.raycast {
        RaycastMode::Off => (block.charge_center(), Face::Up),
        RaycastMode::On { entity_occlusion } => {
            validate_by_raycast(world, agent, players, config, block, entity_occlusion)?
        }
    };

    let damage = blast_damage(
        target,
        block.charge_center(),
        CHARGE_POWER,
        damage_multiplier,
        true,
        Difficulty::Normal,
        world,
    )
    .unwrap_or(0.0);
    if damage < config.placement.min_damage {
        return None;
    }

    Some(PlacementCandidate {
        block,
        aim_point,
        face,
        damage,
    })
}

/// Placeable blocks with a clear surface within the search radius of `around`.
fn scan_blocks(world: &dyn WorldView, around: Vec3, config: &EngineConfig) -> Vec<BlockPos> {
    let radius = config.lookup.search_radius;
    let r = radius.ceil() as i32;
    let center = around.floored();
    let mut blocks = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            for dz in -r..=r {
                let block = center.offset(dx, dy, dz);
                let block_center = block.min_corner().offset(0.5, 0.5, 0.5);
                if block_center.distance_to(around) > radius {
                    continue;
                }
                if config.lookup.placeable.contains(&world.block_at(block))
                    && world.is_air(block.up())
                {
                    blocks.push(block);
                }
            }
        }
    }
    blocks
}

/// Blocks inside the agent's own standing column can never be placed on.
fn in_standing_column(feet: Vec3, block: BlockPos) -> bool {
    let feet_y = feet.y.floor() as i32;
    if block.y < feet_y - 2 || block.y > feet_y {
        return false;
    }
    let x_lo = (feet.x - 0.3).floor() as i32;
    let x_hi = (feet.x + 0.3).floor() as i32;
    let z_lo = (feet.z - 0.3).floor() as i32;
    let z_hi = (feet.z + 0.3).floor() as i32;
    (x_lo..=x_hi).contains(&block.x) && (z_lo..=z_hi).contains(&block.z)
}

/// Cast from the eye toward the charge center, then toward each block
/// vertex, and keep the first ray terminating on the candidate block. The
/// hit gives the placement face and the precise aim point.
fn validate_by_raycast(
    world: &dyn WorldView,
    agent: &AgentState,
    players: &[EntitySnapshot],
    config: &EngineConfig,
    block: BlockPos,
    entity_occlusion: bool,
) -> Option<(Vec3, Face)> {
    let eye = agent.eye_position;
    let block_box = Aabb::from_block(block);
    let mut aims = Vec::with_capacity(9);
    aims.push(block.charge_center());
    aims.extend(block_box.vertices());

    for aim in aims {
        let dir = (aim - eye).normalized();
        if dir == Vec3::ZERO {
            continue;
        }
        let hit = match world.raycast(eye, dir, config.placement.range + 1.0) {
            Some(hit) if hit.position == block => hit,
            _ => continue,
        };
        if entity_occlusion
            && players
                .iter()
                .filter(|p| p.is_player())
                .any(|p| p.aabb().intersects_segment(eye, hit.intersection))
        {
            continue;
        }
        return Some((hit.intersection, hit.face));
    }
    None
}
