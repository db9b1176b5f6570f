//! Entity snapshots: the host-owned entity data the engine reads each cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::math::{charge_base, BlockPos, Vec3};

/// Eye offset above feet for player-type entities.
pub const EYE_HEIGHT: f64 = 1.62;

/// Host-assigned entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coarse entity classification; the engine only distinguishes these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Charge,
    Other,
}

/// Armor-related attributes, present only when the host exposes an armor
/// attribute for the entity. Absence means mitigated damage cannot be
/// computed at all, which is distinct from "no damage".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmorStats {
    /// Armor attribute value (points).
    pub armor: f64,
    /// Armor toughness attribute value.
    pub toughness: f64,
    /// Summed protective enchantment points across equipment
    /// (generic protection level + 2x blast-specific level per piece).
    pub protection_points: u32,
    /// Resistance-style status effect level; 0 when absent.
    pub resistance_level: u32,
}

/// Immutable copy of one entity's state at a single instant. Never cached
/// across decision cycles; the host mutates the real entity every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Feet position for players, center-base position for charges.
    pub position: Vec3,
    pub width: f64,
    pub height: f64,
    pub health: f64,
    pub armor: Option<ArmorStats>,
}

impl EntitySnapshot {
    pub fn is_player(&self) -> bool {
        self.kind == EntityKind::Player
    }

    pub fn is_charge(&self) -> bool {
        self.kind == EntityKind::Charge
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_entity(self.position, self.width, self.height)
    }

    pub fn eye_position(&self) -> Vec3 {
        self.position.offset(0.0, self.height.min(EYE_HEIGHT), 0.0)
    }

    /// Base block key for a charge entity; meaningless for other kinds.
    pub fn base_block(&self) -> BlockPos {
        charge_base(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charge_at(base: BlockPos) -> EntitySnapshot {
        EntitySnapshot {
            id: EntityId(9),
            kind: EntityKind::Charge,
            position: base.charge_center(),
            width: 2.0,
            height: 2.0,
            health: 1.0,
            armor: None,
        }
    }

    #[test]
    fn charge_base_block() {
        let base = BlockPos::new(-3, 10, 7);
        assert_eq!(charge_at(base).base_block(), base);
    }

    #[test]
    fn player_aabb_dimensions() {
        let e = EntitySnapshot {
            id: EntityId(1),
            kind: EntityKind::Player,
            position: Vec3::new(0.5, 64.0, 0.5),
            width: 0.6,
            height: 1.8,
            health: 20.0,
            armor: None,
        };
        let bb = e.aabb();
        assert!((bb.max_y - bb.min_y - 1.8).abs() < 1e-12);
        assert!((bb.max_x - bb.min_x - 0.6).abs() < 1e-12);
        assert!((e.eye_position().y - 65.62).abs() < 1e-9);
    }
}
