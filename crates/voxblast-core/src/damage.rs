//! Blast damage model: exposure sampling plus the mitigation pipeline.
//!
//! All functions are pure over a [`WorldView`]; the engine calls the raw
//! variant when only relative ordering between source points matters.

use thiserror::Error;

use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::entity::EntitySnapshot;
use crate::math::Vec3;
use crate::world::WorldView;

/// Blast power of a placed charge.
pub const CHARGE_POWER: f64 = 6.0;

/// Damage multiplier on modern hosts.
pub const DAMAGE_MULTIPLIER_MODERN: f64 = 8.0;

/// Damage multiplier on legacy hosts.
pub const DAMAGE_MULTIPLIER_LEGACY: f64 = 7.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DamageError {
    /// The target exposes no armor attribute, so mitigated damage cannot be
    /// computed. Distinct from a computed zero.
    #[error("target has no armor attribute; mitigated damage unavailable")]
    ArmorUnavailable,
}

/// Host difficulty, scaling damage against player-type targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Peaceful,
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub fn player_multiplier(self) -> f64 {
        match self {
            Difficulty::Peaceful => 0.0,
            Difficulty::Easy => 0.5,
            Difficulty::Normal => 1.0,
            Difficulty::Hard => 1.5,
        }
    }
}

/// Sample coordinates along one axis of a volume. The spacing fraction
/// `1 / (extent * 2 + 1)` keeps sample density comparable across volume
/// sizes; x/z axes get a half-remainder start offset so the grid is centered.
fn axis_samples(min: f64, max: f64, centered: bool) -> Vec<f64> {
    let extent = max - min;
    if extent <= 0.0 {
        return vec![min];
    }
    let frac = 1.0 / (extent * 2.0 + 1.0);
    let step = extent * frac;
    let offset = if centered {
        (1.0 - (1.0 / frac).floor() * frac) / 2.0
    } else {
        0.0
    };
    let mut out = Vec::new();
    let mut c = min + offset;
    while c <= max + 1e-9 {
        out.push(c);
        c += step;
    }
    if out.is_empty() {
        out.push(min);
    }
    out
}

/// Fraction of the volume's sample grid with an unoccluded straight line to
/// `source`. 1.0 is fully exposed, 0.0 fully shielded.
pub fn exposure(volume: &Aabb, source: Vec3, world: &dyn WorldView) -> f64 {
    let xs = axis_samples(volume.min_x, volume.max_x, true);
    let ys = axis_samples(volume.min_y, volume.max_y, false);
    let zs = axis_samples(volume.min_z, volume.max_z, true);

    let mut sampled = 0u32;
    let mut exposed = 0u32;
    for &y in &ys {
        for &x in &xs {
            for &z in &zs {
                let sample = Vec3::new(x, y, z);
                let dir = sample - source;
                let range = dir.norm();
                sampled += 1;
                if range == 0.0 || world.raycast(source, dir.normalized(), range).is_none() {
                    exposed += 1;
                }
            }
        }
    }
    exposed as f64 / sampled as f64
}

fn impact_damage(distance: f64, exposure: f64, power: f64, multiplier: f64) -> f64 {
    let impact = (1.0 - distance / (2.0 * power)) * exposure;
    ((impact * impact + impact) * multiplier * power + 1.0).floor()
}

/// Raw (unmitigated) blast damage to an arbitrary volume. Distance is
/// measured from the volume surface, matching how the tracker tests whether
/// a secondary blast reaches a charge.
pub fn raw_blast_damage(
    volume: &Aabb,
    source: Vec3,
    power: f64,
    multiplier: f64,
    world: &dyn WorldView,
) -> f64 {
    let distance = volume.distance_to(source);
    if distance >= 2.0 * power {
        return 0.0;
    }
    impact_damage(distance, exposure(volume, source, world), power, multiplier)
}

fn mitigate(raw: f64, target: &EntitySnapshot, difficulty: Difficulty) -> Result<f64, DamageError> {
    let stats = target.armor.as_ref().ok_or(DamageError::ArmorUnavailable)?;
    let mut dmg = raw;

    // Armor/toughness absorption.
    let effective = (stats.armor / 5.0).max(stats.armor - 4.0 * dmg / (stats.toughness + 8.0));
    dmg *= 1.0 - effective / 25.0;

    // Protective enchantment points, capped at 20, 4% each.
    let points = stats.protection_points.min(20) as f64;
    dmg *= 1.0 - points * 0.04;

    // Resistance-style effect, 20% per level.
    dmg *= (1.0 - stats.resistance_level as f64 * 0.2).max(0.0);

    if target.is_player() {
        dmg *= difficulty.player_multiplier();
    }
    Ok(dmg.floor().max(0.0))
}

/// Blast damage to a target entity from `source`.
///
/// With `raw_only`, mitigation is skipped and the floored impact damage is
/// returned directly; the raw value is what candidate scoring compares, since
/// mitigation is constant per target and cannot change the ordering.
pub fn blast_damage(
    target: &EntitySnapshot,
    source: Vec3,
    power: f64,
    multiplier: f64,
    raw_only: bool,
    difficulty: Difficulty,
    world: &dyn WorldView,
) -> Result<f64, DamageError> {
    let distance = target.position.distance_to(source);
    if distance >= 2.0 * power {
        return Ok(0.0);
    }
    let raw = impact_damage(
        distance,
        exposure(&target.aabb(), source, world),
        power,
        multiplier,
    );
    if raw_only {
        return Ok(raw);
    }
    mitigate(raw, target, difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ArmorStats, EntityId, EntityKind};
    use crate::grid::GridWorld;
    use crate::math::BlockPos;

    fn player_at(pos: Vec3, armor: Option<ArmorStats>) -> EntitySnapshot {
        EntitySnapshot {
            id: EntityId(1),
            kind: EntityKind::Player,
            position: pos,
            width: 0.6,
            height: 1.8,
            health: 20.0,
            armor,
        }
    }

    #[test]
    fn zero_outside_blast_radius() {
        let w = GridWorld::new();
        let target = player_at(Vec3::new(12.0, 0.0, 0.0), None);
        let d = blast_damage(
            &target,
            Vec3::ZERO,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_MODERN,
            true,
            Difficulty::Normal,
            &w,
        )
        .unwrap();
        assert_eq!(d, 0.0);
    }

    #[test]
    fn full_exposure_in_empty_world() {
        let w = GridWorld::new();
        let bb = Aabb::from_entity(Vec3::new(3.0, 0.0, 0.0), 0.6, 1.8);
        assert!((exposure(&bb, Vec3::ZERO, &w) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn wall_reduces_exposure() {
        let mut w = GridWorld::new();
        // Solid wall between source and target.
        w.fill(BlockPos::new(2, -3, -3), BlockPos::new(2, 4, 3), 1);
        let bb = Aabb::from_entity(Vec3::new(5.5, 0.0, 0.5), 0.6, 1.8);
        assert_eq!(exposure(&bb, Vec3::new(0.5, 1.0, 0.5), &w), 0.0);
    }

    #[test]
    fn raw_damage_monotonically_non_increasing_in_distance() {
        let w = GridWorld::new();
        let mut last = f64::INFINITY;
        for i in 1..24 {
            let d = i as f64 * 0.5;
            let target = player_at(Vec3::new(d, 0.0, 0.0), None);
            let dmg = blast_damage(
                &target,
                Vec3::ZERO,
                CHARGE_POWER,
                DAMAGE_MULTIPLIER_MODERN,
                true,
                Difficulty::Normal,
                &w,
            )
            .unwrap();
            assert!(dmg <= last, "damage rose between {} and {}", d - 0.5, d);
            last = dmg;
        }
    }

    #[test]
    fn point_blank_raw_damage() {
        // impact = 1 at distance 0 with full exposure:
        // floor((1 + 1) * 8 * 6 + 1) = 97
        let w = GridWorld::new();
        let target = player_at(Vec3::ZERO, None);
        let dmg = blast_damage(
            &target,
            Vec3::ZERO,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_MODERN,
            true,
            Difficulty::Normal,
            &w,
        )
        .unwrap();
        assert_eq!(dmg, 97.0);
    }

    #[test]
    fn mitigated_requires_armor_attribute() {
        let w = GridWorld::new();
        let target = player_at(Vec3::new(3.0, 0.0, 0.0), None);
        let err = blast_damage(
            &target,
            Vec3::ZERO,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_MODERN,
            false,
            Difficulty::Normal,
            &w,
        )
        .unwrap_err();
        assert_eq!(err, DamageError::ArmorUnavailable);
    }

    #[test]
    fn armor_reduces_damage() {
        let w = GridWorld::new();
        let naked = player_at(
            Vec3::new(3.0, 0.0, 0.0),
            Some(ArmorStats {
                armor: 0.0,
                toughness: 0.0,
                protection_points: 0,
                resistance_level: 0,
            }),
        );
        let armored = player_at(
            Vec3::new(3.0, 0.0, 0.0),
            Some(ArmorStats {
                armor: 20.0,
                toughness: 8.0,
                protection_points: 16,
                resistance_level: 0,
            }),
        );
        let source = Vec3::ZERO;
        let a = blast_damage(
            &naked,
            source,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_MODERN,
            false,
            Difficulty::Normal,
            &w,
        )
        .unwrap();
        let b = blast_damage(
            &armored,
            source,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_MODERN,
            false,
            Difficulty::Normal,
            &w,
        )
        .unwrap();
        assert!(b < a, "armored {b} should take less than naked {a}");
        assert!(b > 0.0);
    }

    #[test]
    fn resistance_caps_at_full_reduction() {
        let w = GridWorld::new();
        let target = player_at(
            Vec3::new(2.0, 0.0, 0.0),
            Some(ArmorStats {
                armor: 0.0,
                toughness: 0.0,
                protection_points: 0,
                resistance_level: 7,
            }),
        );
        let d = blast_damage(
            &target,
            Vec3::ZERO,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_MODERN,
            false,
            Difficulty::Normal,
            &w,
        )
        .unwrap();
        assert_eq!(d, 0.0);
    }

    #[test]
    fn difficulty_scales_player_damage() {
        let w = GridWorld::new();
        let stats = ArmorStats {
            armor: 0.0,
            toughness: 0.0,
            protection_points: 0,
            resistance_level: 0,
        };
        let target = player_at(Vec3::new(3.0, 0.0, 0.0), Some(stats));
        let normal = blast_damage(
            &target,
            Vec3::ZERO,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_MODERN,
            false,
            Difficulty::Normal,
            &w,
        )
        .unwrap();
        let peaceful = blast_damage(
            &target,
            Vec3::ZERO,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_MODERN,
            false,
            Difficulty::Peaceful,
            &w,
        )
        .unwrap();
        let hard = blast_damage(
            &target,
            Vec3::ZERO,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_MODERN,
            false,
            Difficulty::Hard,
            &w,
        )
        .unwrap();
        assert_eq!(peaceful, 0.0);
        assert!(hard >= normal);
    }

    #[test]
    fn legacy_multiplier_deals_less() {
        let w = GridWorld::new();
        let target = player_at(Vec3::new(3.0, 0.0, 0.0), None);
        let modern = blast_damage(
            &target,
            Vec3::ZERO,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_MODERN,
            true,
            Difficulty::Normal,
            &w,
        )
        .unwrap();
        let legacy = blast_damage(
            &target,
            Vec3::ZERO,
            CHARGE_POWER,
            DAMAGE_MULTIPLIER_LEGACY,
            true,
            Difficulty::Normal,
            &w,
        )
        .unwrap();
        assert!(legacy < modern);
    }

    #[test]
    fn raw_blast_damage_volume_distance_from_surface() {
        let w = GridWorld::new();
        // Volume surface 11.5 away: inside the 12-block radius, tiny damage.
        let v = Aabb::new(11.5, 0.0, 0.0, 13.5, 1.0, 1.0);
        let d = raw_blast_damage(&v, Vec3::ZERO, CHARGE_POWER, DAMAGE_MULTIPLIER_MODERN, &w);
        assert!(d >= 1.0);
        // Surface exactly at the radius: zero.
        let v = Aabb::new(12.0, 0.0, 0.0, 14.0, 1.0, 1.0);
        assert_eq!(
            raw_blast_damage(&v, Vec3::ZERO, CHARGE_POWER, DAMAGE_MULTIPLIER_MODERN, &w),
            0.0
        );
    }
}
