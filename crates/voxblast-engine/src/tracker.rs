//! Event-driven ledger of every charge the agent has placed.
//!
//! One record per base block, strictly ordered per key:
//! `Attempted -> Confirmed -> FastKilled -> removed`. Out-of-order events
//! (a removal for a never-confirmed position, a duplicate attempt) are
//! no-ops, never errors. All mutations are single-key operations, so the
//! loops sharing the tracker can interleave at any point without observing
//! a half-updated record.

use std::collections::HashMap;

use tokio::sync::broadcast;
use tracing::{debug, trace};

use voxblast_core::aabb::{charge_blast_volume, charge_occupancy};
use voxblast_core::damage::{raw_blast_damage, CHARGE_POWER};
use voxblast_core::{Aabb, BlockPos, EntityId, EntitySnapshot, Vec3, WorldView};

use crate::config::TrackerSection;
use crate::events::{EngineEvent, FastKillReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    /// Placement issued, spawn not yet observed.
    Attempted,
    /// A matching charge entity was observed in the world.
    Confirmed,
    /// Inferred destroyed from a secondary signal ahead of the removal event.
    FastKilled,
}

#[derive(Debug, Clone)]
pub struct ChargeRecord {
    pub attempt_tick: u64,
    pub entity_id: Option<EntityId>,
    pub state: ChargeState,
}

pub struct ChargeTracker {
    policy: TrackerSection,
    damage_multiplier: f64,
    current_tick: u64,
    records: HashMap<BlockPos, ChargeRecord>,
    events: broadcast::Sender<EngineEvent>,
}

impl ChargeTracker {
    pub fn new(
        policy: TrackerSection,
        damage_multiplier: f64,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            policy,
            damage_multiplier,
            current_tick: 0,
            records: HashMap::new(),
            events,
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn record(&self, pos: BlockPos) -> Option<&ChargeRecord> {
        self.records.get(&pos)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert an `Attempted` record for a placement the agent just issued.
    /// A stale `FastKilled` marker on the same key is replaced; a live
    /// record makes this a no-op.
    pub fn record_attempt(&mut self, pos: BlockPos) -> bool {
        match self.records.get(&pos) {
            Some(r) if r.state != ChargeState::FastKilled => {
                debug!(position = %pos, "ignoring attempt over a live record");
                false
            }
            _ => {
                self.records.insert(
                    pos,
                    ChargeRecord {
                        attempt_tick: self.current_tick,
                        entity_id: None,
                        state: ChargeState::Attempted,
                    },
                );
                true
            }
        }
    }

    /// Whether the optimizer may select this position.
    pub fn can_place_at(&self, pos: BlockPos) -> bool {
        match self.records.get(&pos) {
            None => true,
            Some(r) => match r.state {
                ChargeState::Confirmed => false,
                ChargeState::Attempted => {
                    !self.policy.care_about_past_attempts || self.is_expired(r)
                }
                ChargeState::FastKilled => self.policy.reuse_after_fast_kill,
            },
        }
    }

    fn is_expired(&self, r: &ChargeRecord) -> bool {
        self.current_tick.saturating_sub(r.attempt_tick) > self.policy.retention_ticks
    }

    /// Occupancy volumes of every record that currently blocks placement.
    pub fn claimed_volumes(&self) -> Vec<Aabb> {
        self.records
            .keys()
            .filter(|pos| !self.can_place_at(**pos))
            .map(|pos| charge_occupancy(*pos))
            .collect()
    }

    /// Promote a pending attempt to `Confirmed` when a matching charge
    /// entity shows up.
    pub fn on_entity_observed(&mut self, entity: &EntitySnapshot) -> bool {
        if !entity.is_charge() {
            return false;
        }
        let pos = entity.base_block();
        match self.records.get_mut(&pos) {
            Some(r) if r.state == ChargeState::Attempted => {
                r.state = ChargeState::Confirmed;
                r.entity_id = Some(entity.id);
                trace!(position = %pos, entity = %entity.id, "charge confirmed");
                true
            }
            _ => false,
        }
    }

    /// Authoritative removal. A `Confirmed` record is deleted with a
    /// destroyed notification; a `FastKilled` record is deleted silently
    /// (its notification already fired); anything else is a no-op.
    pub fn on_entity_removed(&mut self, entity: &EntitySnapshot) -> bool {
        if !entity.is_charge() {
            return false;
        }
        let pos = entity.base_block();
        match self.records.get(&pos).map(|r| r.state) {
            Some(ChargeState::Confirmed) => {
                self.records.remove(&pos);
                let _ = self.events.send(EngineEvent::ChargesDestroyed(vec![pos]));
                true
            }
            Some(ChargeState::FastKilled) => {
                self.records.remove(&pos);
                false
            }
            _ => false,
        }
    }

    /// Fast-kill inference from an area-effect event.
    pub fn on_area_effect(&mut self, source: Vec3, world: &dyn WorldView) -> Vec<BlockPos> {
        if !self.policy.fast_on_area_effect {
            return Vec::new();
        }
        self.fast_kill(source, FastKillReason::AreaEffect, world)
    }

    /// Fast-kill inference from an audio cue.
    pub fn on_audio_cue(&mut self, point: Vec3, world: &dyn WorldView) -> Vec<BlockPos> {
        if !self.policy.fast_on_audio {
            return Vec::new();
        }
        self.fast_kill(point, FastKillReason::AudioCue, world)
    }

    /// Every `Confirmed` charge whose blast-check volume takes non-zero raw
    /// damage from `source` is presumed destroyed.
    fn fast_kill(
        &mut self,
        source: Vec3,
        reason: FastKillReason,
        world: &dyn WorldView,
    ) -> Vec<BlockPos> {
        let mut killed = Vec::new();
        for (pos, r) in self.records.iter_mut() {
            if r.state != ChargeState::Confirmed {
                continue;
            }
            let volume = charge_blast_volume(*pos);
            let damage =
                raw_blast_damage(&volume, source, CHARGE_POWER, self.damage_multiplier, world);
            if damage > 0.0 {
                r.state = ChargeState::FastKilled;
                killed.push(*pos);
            }
        }
        for pos in &killed {
            debug!(position = %pos, ?reason, "charge fast-killed");
            let _ = self.events.send(EngineEvent::FastDestroyed {
                reason,
                position: *pos,
            });
        }
        killed
    }

    /// Per-tick garbage collection: drop attempts the host never confirmed
    /// within the retention window. Confirmed and fast-killed records are
    /// never removed by tick alone.
    pub fn on_tick(&mut self, tick: u64) {
        self.current_tick = tick;
        let retention = self.policy.retention_ticks;
        self.records.retain(|pos, r| {
            let keep = r.state != ChargeState::Attempted
                || tick.saturating_sub(r.attempt_tick) <= retention;
            if !keep {
                trace!(position = %pos, "dropping unconfirmed attempt");
            }
            keep
        });
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
