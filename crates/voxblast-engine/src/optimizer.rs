//! Placement selection: the lethal shortcut, priority ordering, and the
//! greedy non-overlapping combination search.

use tracing::trace;

use voxblast_core::Vec3;

use crate::candidates::PlacementCandidate;
use crate::config::PlacementPriority;

/// Combination seeds examined per cycle. Seeding from more than the top few
/// candidates never changed the winner in practice.
const MAX_SEEDS: usize = 5;

/// Pick the placements for one cycle.
///
/// A single lethal candidate short-circuits everything. Otherwise each of
/// the best `MAX_SEEDS` candidates (after priority ordering) seeds a greedy
/// combination of mutually non-overlapping volumes up to `budget` members,
/// and the combination with the highest damage over its first
/// `places_per_cycle` members wins. Ties keep the earlier seed.
pub fn select_placements(
    candidates: &[PlacementCandidate],
    target_health: f64,
    origin: Vec3,
    priority: PlacementPriority,
    budget: usize,
    places_per_cycle: usize,
    max_seed_radius: Option<f64>,
) -> Vec<PlacementCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    if let Some(lethal) = candidates.iter().find(|c| c.damage >= target_health) {
        trace!(block = %lethal.block, damage = lethal.damage, "lethal shortcut");
        return vec![*lethal];
    }

    let mut sorted: Vec<PlacementCandidate> = candidates.to_vec();
    match priority {
        PlacementPriority::Damage => sorted.sort_by(|a, b| b.damage.total_cmp(&a.damage)),
        PlacementPriority::Nearest => sorted.sort_by(|a, b| {
            a.source()
                .distance_to(origin)
                .total_cmp(&b.source().distance_to(origin))
        }),
        PlacementPriority::Farthest => sorted.sort_by(|a, b| {
            b.source()
                .distance_to(origin)
                .total_cmp(&a.source().distance_to(origin))
        }),
        PlacementPriority::None => {}
    }

    let budget = budget.max(1);
    let mut best: Vec<PlacementCandidate> = Vec::new();
    let mut best_score = f64::NEG_INFINITY;
    for seed in sorted.iter().take(MAX_SEEDS) {
        let combo = grow_combination(seed, &sorted, budget, max_seed_radius);
        let score: f64 = combo
            .iter()
            .take(places_per_cycle.max(1))
            .map(|c| c.damage)
            .sum();
        if score > best_score {
            best_score = score;
            best = combo;
        }
    }
    best
}

fn grow_combination(
    seed: &PlacementCandidate,
    sorted: &[PlacementCandidate],
    budget: usize,
    max_seed_radius: Option<f64>,
) -> Vec<PlacementCandidate> {
    let mut combo = vec![*seed];
    for c in sorted {
        if combo.len() >= budget {
            break;
        }
        if c.block == seed.block {
            continue;
        }
        if let Some(radius) = max_seed_radius {
            if c.source().distance_to(seed.source()) > radius {
                continue;
            }
        }
        let volume = c.occupancy();
        if combo.iter().any(|m| m.occupancy().intersects(&volume)) {
            continue;
        }
        combo.push(*c);
    }
    combo
}
