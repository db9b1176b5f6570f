//! The action scheduler: one attack session against one target.
//!
//! A session owns the place/break/refresh loops (desynchronized mode) or the
//! per-tick handler (tick-synchronized mode), plus the event pump feeding
//! host notifications into the tracker. All loops share the tracker and the
//! candidate cache behind short-lived mutexes; every suspension point checks
//! the running flag.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use voxblast_core::aabb::charge_blast_volume;
use voxblast_core::damage::{raw_blast_damage, CHARGE_POWER};
use voxblast_core::{Aabb, BlockPos, EntityId, EntitySnapshot, Vec3};

use crate::candidates::{evaluate_position, find_candidates, PlacementCandidate};
use crate::config::{AabbSource, EngineConfig, ScheduleSection, StaggerMode};
use crate::error::EngineError;
use crate::events::{wait_for, EngineEvent};
use crate::host::{Host, HostEvent, PlaceOptions};
use crate::optimizer::select_placements;
use crate::tracker::{ChargeState, ChargeTracker};

const ENGINE_EVENT_CAPACITY: usize = 64;

/// Backoff while no candidate survives and no world change arrives.
const IDLE_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
pub struct SessionStats {
    placements: AtomicU64,
    attacks: AtomicU64,
    confirms: AtomicU64,
    fast_kills: AtomicU64,
    destroys: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub placements: u64,
    pub attacks: u64,
    pub confirms: u64,
    pub fast_kills: u64,
    pub destroys: u64,
}

impl SessionStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            placements: self.placements.load(Ordering::Relaxed),
            attacks: self.attacks.load(Ordering::Relaxed),
            confirms: self.confirms.load(Ordering::Relaxed),
            fast_kills: self.fast_kills.load(Ordering::Relaxed),
            destroys: self.destroys.load(Ordering::Relaxed),
        }
    }
}

/// One running attack session. Dropping the session aborts its tasks;
/// [`Session::stop`] is the graceful path.
pub struct Session {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

struct Shared {
    host: Arc<dyn Host>,
    config: EngineConfig,
    target: EntityId,
    damage_multiplier: f64,
    running: watch::Sender<bool>,
    tracker: Mutex<ChargeTracker>,
    candidates: Mutex<Vec<PlacementCandidate>>,
    pending_breaks: Mutex<VecDeque<EntityId>>,
    last_hit: Mutex<HashMap<EntityId, Instant>>,
    break_done: Notify,
    events: broadcast::Sender<EngineEvent>,
    stats: SessionStats,
}

impl Session {
    /// Validate the config and spawn the session's tasks. Must be called
    /// from within a tokio runtime.
    pub fn start(
        host: Arc<dyn Host>,
        config: EngineConfig,
        target: EntityId,
    ) -> Result<Session, EngineError> {
        config.validate()?;
        if host.entity(target).is_none() {
            return Err(EngineError::TargetLost(target));
        }

        let (events, _) = broadcast::channel(ENGINE_EVENT_CAPACITY);
        let (running, _) = watch::channel(true);
        let damage_multiplier = config.damage.era.multiplier();
        let tracker = ChargeTracker::new(
            config.tracker.clone(),
            damage_multiplier,
            events.clone(),
        );
        let shared = Arc::new(Shared {
            host,
            target,
            damage_multiplier,
            running,
            tracker: Mutex::new(tracker),
            candidates: Mutex::new(Vec::new()),
            pending_breaks: Mutex::new(VecDeque::new()),
            last_hit: Mutex::new(HashMap::new()),
            break_done: Notify::new(),
            events,
            stats: SessionStats::default(),
            config,
        });

        let mut tasks = vec![tokio::spawn(event_pump(shared.clone()))];
        if let ScheduleSection::Desynced {
            place_interval_ms,
            break_interval_ms,
            concurrent_break,
        } = shared.config.schedule
        {
            tasks.push(tokio::spawn(place_loop(
                shared.clone(),
                place_interval_ms,
                concurrent_break,
            )));
            tasks.push(tokio::spawn(break_loop(shared.clone(), break_interval_ms)));
            if shared.config.lookup.async_refresh {
                tasks.push(tokio::spawn(refresh_loop(
                    shared.clone(),
                    shared.config.lookup.refresh_interval_ms,
                )));
            }
        }
        info!(target = %target, "session started");
        Ok(Session { shared, tasks })
    }

    pub fn is_running(&self) -> bool {
        self.shared.running()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Idempotent. Flips the running flag (observed by every loop at its
    /// next suspension point) and clears the tracker. Actions already
    /// dispatched to the host are not retracted.
    pub fn stop(&self) {
        self.shared.stop();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.stop();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Shared {
    fn running(&self) -> bool {
        *self.running.borrow()
    }

    fn stop(&self) {
        if self.running.send_replace(false) {
            self.tracker.lock().unwrap().clear();
            info!(target = %self.target, "session stopped");
        }
    }

    fn stop_with_error(&self, err: &EngineError) {
        error!(target = %self.target, %err, "session aborting");
        self.stop();
    }

    fn target_snapshot(&self) -> Option<EntitySnapshot> {
        self.host.entity(self.target)
    }

    /// Volumes placements must not overlap, per the configured source.
    fn claimed_volumes(&self) -> Vec<Aabb> {
        let tracked = || self.tracker.lock().unwrap().claimed_volumes();
        let actual = |staleness: Option<Duration>| {
            let last_hit = self.last_hit.lock().unwrap();
            self.host
                .entities()
                .into_iter()
                .filter(|e| e.is_charge())
                .filter(|e| match staleness {
                    None => true,
                    // A recently-hit charge is about to vanish; ignore it.
                    Some(window) => last_hit
                        .get(&e.id)
                        .map_or(true, |at| at.elapsed() > window),
                })
                .map(|e| e.aabb())
                .collect::<Vec<_>>()
        };
        match self.config.lookup.aabb_source {
            AabbSource::Tracked => tracked(),
            AabbSource::Actual => actual(None),
            AabbSource::Both => {
                let mut v = tracked();
                v.extend(actual(None));
                v
            }
            AabbSource::None => Vec::new(),
            AabbSource::RecentNoHit { staleness_ms } => {
                actual(Some(Duration::from_millis(staleness_ms)))
            }
        }
    }

    fn refresh_candidates(&self, target: &EntitySnapshot) {
        let agent = self.host.agent();
        let players = self.host.entities();
        let claimed = self.claimed_volumes();
        let found = find_candidates(
            self.host.world().as_ref(),
            &agent,
            target,
            &players,
            &claimed,
            &self.config,
            self.damage_multiplier,
        );
        *self.candidates.lock().unwrap() = found;
    }

    /// One placement cycle: refresh, filter, select, execute. Returns false
    /// when there was nothing to place.
    async fn place_cycle(&self, cap: u32) -> Result<bool, EngineError> {
        let target = self
            .target_snapshot()
            .ok_or(EngineError::TargetLost(self.target))?;
        if !self.config.lookup.async_refresh {
            self.refresh_candidates(&target);
        }

        let candidates: Vec<PlacementCandidate> = {
            let tracker = self.tracker.lock().unwrap();
            self.candidates
                .lock()
                .unwrap()
                .iter()
                .filter(|c| tracker.can_place_at(c.block))
                .copied()
                .collect()
        };
        if candidates.is_empty() {
            return Ok(false);
        }

        let agent = self.host.agent();
        let cap = cap.max(1) as usize;
        let budget = cap + self.config.placement.backup_positions as usize;
        let picked = select_placements(
            &candidates,
            target.health,
            agent.eye_position,
            self.config.placement.priority,
            budget,
            cap,
            self.config.placement.max_seed_radius,
        );
        let mut batch: Vec<PlacementCandidate> = picked.into_iter().take(cap).collect();
        if batch.is_empty() {
            return Ok(false);
        }

        if !self.host.equip_charge(self.config.placement.use_offhand) {
            return Err(EngineError::EquipFailed);
        }

        match self.config.placement.stagger {
            StaggerMode::Off => {
                // Least view change first, to avoid visible snapping.
                let view = agent.view_direction;
                let eye = agent.eye_position;
                batch.sort_by(|a, b| {
                    let da = view.dot((a.aim_point - eye).normalized());
                    let db = view.dot((b.aim_point - eye).normalized());
                    db.total_cmp(&da)
                });
                for c in &batch {
                    self.place_one(c);
                }
            }
            StaggerMode::On { delay_ms } => {
                let split = batch.len().div_ceil(2);
                for c in &batch[..split] {
                    self.place_one(c);
                }
                if batch.len() > split {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    if !self.running() {
                        return Ok(true);
                    }
                    for c in &batch[split..] {
                        self.place_one(c);
                    }
                }
            }
        }
        Ok(true)
    }

    /// Aim (when needed), place, and record one candidate. The charge item
    /// is already equipped.
    fn place_one(&self, candidate: &PlacementCandidate) {
        {
            // Re-checked under the lock; the event pump may have claimed the
            // key since selection.
            let mut tracker = self.tracker.lock().unwrap();
            if !tracker.can_place_at(candidate.block) {
                return;
            }
            tracker.record_attempt(candidate.block);
        }
        self.aim_if_needed(candidate.aim_point);
        self.host.place_charge(
            candidate.block,
            candidate.face,
            PlaceOptions {
                offhand: self.config.placement.use_offhand,
                swing: true,
            },
        );
        self.stats.placements.fetch_add(1, Ordering::Relaxed);
        debug!(block = %candidate.block, damage = candidate.damage, "placed charge");
    }

    fn aim_if_needed(&self, point: Vec3) {
        let agent = self.host.agent();
        let wanted = (point - agent.eye_position).normalized();
        if agent.view_direction.dot(wanted) < self.config.rotation.look_dot_threshold {
            self.host.look_at(point, true);
        }
    }

    /// Re-evaluate a single freed base block and place immediately if it is
    /// at least as good as the best known candidate.
    fn predict_place(&self, base: BlockPos) {
        if !self.running() {
            return;
        }
        let Some(target) = self.target_snapshot() else {
            return;
        };
        if !self.tracker.lock().unwrap().can_place_at(base) {
            return;
        }
        let agent = self.host.agent();
        let players = self.host.entities();
        let claimed = self.claimed_volumes();
        let world = self.host.world();
        let Some(candidate) = evaluate_position(
            world.as_ref(),
            &agent,
            &target,
            &players,
            &claimed,
            &self.config,
            self.damage_multiplier,
            base,
        ) else {
            return;
        };
        let best = self
            .candidates
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.damage)
            .fold(0.0, f64::max);
        if candidate.damage < best {
            return;
        }
        if !self.host.equip_charge(self.config.placement.use_offhand) {
            self.stop_with_error(&EngineError::EquipFailed);
            return;
        }
        trace!(block = %base, "predicted re-placement");
        self.place_one(&candidate);
    }

    /// Gather this cycle's attack targets: the pending queue first, then
    /// confirmed tracked charges observed in the world.
    fn gather_breaks(&self, cap: usize) -> Vec<EntityId> {
        let mut queue: Vec<EntityId> = {
            let mut pending = self.pending_breaks.lock().unwrap();
            pending.drain(..).collect()
        };
        {
            let tracker = self.tracker.lock().unwrap();
            for e in self.host.entities() {
                if e.is_charge()
                    && !queue.contains(&e.id)
                    && tracker
                        .record(e.base_block())
                        .is_some_and(|r| r.state == ChargeState::Confirmed)
                {
                    queue.push(e.id);
                }
            }
        }
        queue.truncate(cap);
        queue
    }

    async fn break_cycle(&self, cap: usize, wait_for_destroy: bool) {
        let mut queue = self.gather_breaks(cap);
        while !queue.is_empty() {
            if !self.running() {
                return;
            }
            let id = queue.remove(0);
            let Some(charge) = self.attack_one(id, wait_for_destroy).await else {
                continue;
            };
            if !self.config.breaking.hit_all {
                // Charges inside that blast are already dead; don't waste hits.
                let source = charge.position;
                let world = self.host.world();
                queue.retain(|other| {
                    let Some(e) = self.host.entity(*other) else {
                        return false;
                    };
                    let volume = charge_blast_volume(e.base_block());
                    raw_blast_damage(
                        &volume,
                        source,
                        CHARGE_POWER,
                        self.damage_multiplier,
                        world.as_ref(),
                    ) <= 0.0
                });
            }
        }
    }

    /// Attack one charge, with retries and a bounded wait for its
    /// destruction. Returns the charge snapshot when an attack was issued.
    async fn attack_one(&self, id: EntityId, wait_for_destroy: bool) -> Option<EntitySnapshot> {
        let breaking = &self.config.breaking;
        let Some(charge) = self.host.entity(id) else {
            debug!(entity = %id, "charge vanished before attack");
            return None;
        };
        if !charge.is_charge() {
            return None;
        }
        let agent = self.host.agent();
        let hitbox = charge.aabb();
        if hitbox.distance_to(agent.eye_position) > breaking.range {
            return None;
        }
        if breaking.min_damage > 0.0 {
            let target = self.target_snapshot()?;
            let world = self.host.world();
            let damage = raw_blast_damage(
                &target.aabb(),
                charge.position,
                CHARGE_POWER,
                self.damage_multiplier,
                world.as_ref(),
            );
            if damage < breaking.min_damage {
                return None;
            }
        }
        // Skip a charge someone is already hitting this window.
        let wait = Duration::from_millis(breaking.break_wait_ms);
        if !breaking.hit_all {
            let last_hit = self.last_hit.lock().unwrap();
            if last_hit.get(&id).is_some_and(|at| at.elapsed() < wait) {
                return None;
            }
        }
        if breaking.raytrace && self.occluded(agent.eye_position, charge.position) {
            return None;
        }

        let skip_rotation = self.config.rotation.skip_if_volume_hit
            && hitbox.intersects_segment(
                agent.eye_position,
                agent.eye_position + agent.view_direction * (breaking.range + 1.0),
            );
        if !skip_rotation {
            self.aim_if_needed(charge.position);
        }

        let base = charge.base_block();
        let mut rx = self.events.subscribe();
        for attempt in 0..breaking.tries {
            self.host.attack(id, breaking.swing, breaking.use_offhand);
            self.stats.attacks.fetch_add(1, Ordering::Relaxed);
            self.last_hit.lock().unwrap().insert(id, Instant::now());
            if wait_for_destroy {
                let destroyed = wait_for(&mut rx, wait, |ev| match ev {
                    EngineEvent::ChargesDestroyed(batch) => batch.contains(&base),
                    EngineEvent::FastDestroyed { position, .. } => *position == base,
                })
                .await
                .is_some();
                if destroyed {
                    break;
                }
            }
            if attempt + 1 < breaking.tries {
                tokio::time::sleep(Duration::from_millis(breaking.try_delay_ms)).await;
                if !self.running() {
                    break;
                }
            }
        }
        self.break_done.notify_waiters();
        Some(charge)
    }

    fn occluded(&self, eye: Vec3, point: Vec3) -> bool {
        let dir = (point - eye).normalized();
        let distance = eye.distance_to(point);
        self.host
            .world()
            .raycast(eye, dir, distance)
            .is_some_and(|hit| hit.intersection.distance_to(eye) < distance - 1e-6)
    }

    async fn handle_host_event(&self, event: HostEvent) {
        match event {
            HostEvent::Tick(tick) => {
                self.tracker.lock().unwrap().on_tick(tick);
                if let ScheduleSection::TickSynced {
                    places_per_tick,
                    breaks_per_tick,
                } = self.config.schedule
                {
                    match self.place_cycle(places_per_tick).await {
                        Ok(_) => {}
                        Err(err) => {
                            self.stop_with_error(&err);
                            return;
                        }
                    }
                    self.break_cycle(breaks_per_tick as usize, false).await;
                }
            }
            HostEvent::EntitySpawned(entity) => {
                if !entity.is_charge() {
                    return;
                }
                if self.tracker.lock().unwrap().on_entity_observed(&entity) {
                    self.stats.confirms.fetch_add(1, Ordering::Relaxed);
                }
                if self.config.breaking.predict_on_spawn {
                    self.attack_one(entity.id, false).await;
                } else {
                    self.pending_breaks.lock().unwrap().push_back(entity.id);
                }
            }
            HostEvent::EntityRemoved(entity) => {
                if !entity.is_charge() {
                    return;
                }
                let destroyed = self.tracker.lock().unwrap().on_entity_removed(&entity);
                if destroyed {
                    self.stats.destroys.fetch_add(1, Ordering::Relaxed);
                }
                self.pending_breaks.lock().unwrap().retain(|id| *id != entity.id);
                self.last_hit.lock().unwrap().remove(&entity.id);
                self.break_done.notify_waiters();
                if self.config.placement.predict_on_break {
                    self.predict_place(entity.base_block());
                }
            }
            HostEvent::AreaEffect(point) => {
                let killed = {
                    let mut tracker = self.tracker.lock().unwrap();
                    let world = self.host.world();
                    tracker.on_area_effect(point, world.as_ref())
                };
                self.stats
                    .fast_kills
                    .fetch_add(killed.len() as u64, Ordering::Relaxed);
                if self.config.placement.predict_on_explosion {
                    for base in killed {
                        self.predict_place(base);
                    }
                }
            }
            HostEvent::AudioCue(point) => {
                let killed = {
                    let mut tracker = self.tracker.lock().unwrap();
                    let world = self.host.world();
                    tracker.on_audio_cue(point, world.as_ref())
                };
                self.stats
                    .fast_kills
                    .fetch_add(killed.len() as u64, Ordering::Relaxed);
            }
        }
    }
}

async fn event_pump(shared: Arc<Shared>) {
    let mut rx = shared.host.subscribe();
    let mut running = shared.running.subscribe();
    loop {
        // A stop issued before this task first polls is already marked seen
        // by the watch receiver, so changed() alone would never deliver it.
        if !shared.running() {
            break;
        }
        tokio::select! {
            changed = running.changed() => {
                if changed.is_err() || !*running.borrow() {
                    break;
                }
            }
            event = rx.recv() => match event {
                Ok(event) if shared.running() => shared.handle_host_event(event).await,
                Ok(_) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "host event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("host event stream closed");
                    shared.stop();
                    break;
                }
            }
        }
    }
}

async fn place_loop(shared: Arc<Shared>, interval_ms: u64, concurrent_break: bool) {
    let mut running = shared.running.subscribe();
    let mut host_rx = shared.host.subscribe();
    while shared.running() {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
            _ = running.changed() => continue,
        }
        if !shared.running() {
            break;
        }
        if !concurrent_break {
            // Do not place into a volume a pending break is about to clear.
            tokio::select! {
                _ = shared.break_done.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(shared.config.breaking.break_wait_ms)) => {}
            }
        }
        match shared.place_cycle(shared.config.placement.places_per_cycle).await {
            Ok(true) => {}
            Ok(false) => {
                // Nothing placeable; wait for the world to change instead of
                // spinning.
                let _ = wait_for(&mut host_rx, IDLE_BACKOFF, |e| {
                    !matches!(e, HostEvent::Tick(_))
                })
                .await;
            }
            Err(err) => {
                shared.stop_with_error(&err);
                break;
            }
        }
    }
}

async fn break_loop(shared: Arc<Shared>, interval_ms: u64) {
    let mut running = shared.running.subscribe();
    while shared.running() {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
            _ = running.changed() => continue,
        }
        if !shared.running() {
            break;
        }
        shared.break_cycle(usize::MAX, true).await;
    }
}

async fn refresh_loop(shared: Arc<Shared>, interval_ms: u64) {
    let mut running = shared.running.subscribe();
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    while shared.running() {
        tokio::select! {
            _ = interval.tick() => {}
            _ = running.changed() => continue,
        }
        if !shared.running() {
            break;
        }
        if let Some(target) = shared.target_snapshot() {
            shared.refresh_candidates(&target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RaycastMode;
    use crate::testutil::{Action, MockHost};
    use voxblast_core::aabb::charge_occupancy;
    use voxblast_core::grid::GridWorld;
    use voxblast_core::EntityKind;

    const OBSIDIAN: u32 = 1;

    fn arena() -> (Arc<MockHost>, EntityId) {
        let mut world = GridWorld::new();
        world.fill(BlockPos::new(-8, 4, -8), BlockPos::new(8, 4, 8), OBSIDIAN);
        let host = MockHost::new(world, Vec3::new(4.5, 5.0, 0.5));
        let target = EntitySnapshot {
            id: EntityId(1),
            kind: EntityKind::Player,
            position: Vec3::new(0.5, 5.0, 0.5),
            width: 0.6,
            height: 1.8,
            health: 20.0,
            armor: None,
        };
        host.insert_entity(target);
        (Arc::new(host), EntityId(1))
    }

    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.schedule = ScheduleSection::Desynced {
            place_interval_ms: 5,
            break_interval_ms: 5,
            concurrent_break: true,
        };
        config.placement.raycast = RaycastMode::Off;
        config
    }

    async fn eventually<F: Fn() -> bool>(pred: F) -> bool {
        for _ in 0..200 {
            if pred() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    fn charge_at(id: u64, base: BlockPos) -> EntitySnapshot {
        EntitySnapshot {
            id: EntityId(id),
            kind: EntityKind::Charge,
            position: base.charge_center(),
            width: 2.0,
            height: 2.0,
            health: 1.0,
            armor: None,
        }
    }

    #[tokio::test]
    async fn start_rejects_missing_target() {
        let (host, _) = arena();
        let err = Session::start(host, test_config(), EntityId(99)).unwrap_err();
        assert!(matches!(err, EngineError::TargetLost(EntityId(99))));
    }

    #[tokio::test]
    async fn place_loop_places_and_records() {
        let (host, target) = arena();
        let session = Session::start(host.clone(), test_config(), target).unwrap();

        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Place { .. })))
            .await,
            "no placement issued"
        );
        let actions = host.actions();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Equip { offhand: false })));
        assert!(session.stats().placements >= 1);
        session.stop();
    }

    #[tokio::test]
    async fn spawn_confirm_destroy_flow() {
        let (host, target) = arena();
        let session = Session::start(host.clone(), test_config(), target).unwrap();
        let mut events = session.subscribe();

        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Place { .. })))
            .await
        );
        let base = host
            .actions()
            .iter()
            .find_map(|a| match a {
                Action::Place { block, .. } => Some(*block),
                _ => None,
            })
            .unwrap();

        // The host confirms the spawn, then the charge dies.
        let charge = charge_at(50, base);
        host.insert_entity(charge.clone());
        host.emit(HostEvent::EntitySpawned(charge.clone()));
        assert!(eventually(|| session.stats().confirms == 1).await);

        host.remove_entity(charge.id);
        host.emit(HostEvent::EntityRemoved(charge));
        assert!(eventually(|| session.stats().destroys == 1).await);
        let destroyed = wait_for(&mut events, Duration::from_millis(500), |e| {
            matches!(e, EngineEvent::ChargesDestroyed(_))
        })
        .await;
        assert!(destroyed.is_some());
        session.stop();
    }

    #[tokio::test]
    async fn break_loop_attacks_spawned_charge() {
        let (host, target) = arena();
        let mut config = test_config();
        config.breaking.break_wait_ms = 10;
        let session = Session::start(host.clone(), config, target).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let charge = charge_at(60, BlockPos::new(2, 4, 0));
        host.insert_entity(charge.clone());
        host.emit(HostEvent::EntitySpawned(charge));
        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Attack(EntityId(60)))))
            .await,
            "charge never attacked"
        );
        session.stop();
    }

    #[tokio::test]
    async fn equip_failure_stops_session() {
        let (host, target) = arena();
        host.set_equip_ok(false);
        let session = Session::start(host.clone(), test_config(), target).unwrap();
        assert!(eventually(|| !session.is_running()).await);
        assert!(host
            .actions()
            .iter()
            .all(|a| !matches!(a, Action::Place { .. })));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (host, target) = arena();
        let session = Session::start(host, test_config(), target).unwrap();
        assert!(session.is_running());
        session.stop();
        session.stop();
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn tick_synced_waits_for_ticks() {
        let (host, target) = arena();
        let mut config = test_config();
        config.schedule = ScheduleSection::TickSynced {
            places_per_tick: 1,
            breaks_per_tick: 1,
        };
        let session = Session::start(host.clone(), config, target).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            host.actions().is_empty(),
            "placed without a tick notification"
        );
        host.emit(HostEvent::Tick(1));
        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Place { .. })))
            .await
        );
        session.stop();
    }

    #[tokio::test]
    async fn fast_kill_frees_position_for_reuse() {
        let (host, target) = arena();
        let session = Session::start(host.clone(), test_config(), target).unwrap();
        let mut events = session.subscribe();

        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Place { .. })))
            .await
        );
        let base = host
            .actions()
            .iter()
            .find_map(|a| match a {
                Action::Place { block, .. } => Some(*block),
                _ => None,
            })
            .unwrap();
        let charge = charge_at(70, base);
        host.insert_entity(charge.clone());
        host.emit(HostEvent::EntitySpawned(charge.clone()));
        assert!(eventually(|| session.stats().confirms == 1).await);

        host.remove_entity(charge.id);
        host.emit(HostEvent::AreaEffect(base.charge_center()));
        let fast = wait_for(&mut events, Duration::from_millis(500), |e| {
            matches!(e, EngineEvent::FastDestroyed { .. })
        })
        .await;
        assert!(fast.is_some());
        assert!(eventually(|| session.stats().fast_kills == 1).await);
        session.stop();
    }

    #[tokio::test]
    async fn sequenced_place_loop_waits_for_break_signal() {
        let (host, target) = arena();
        let mut config = test_config();
        config.schedule = ScheduleSection::Desynced {
            place_interval_ms: 5,
            break_interval_ms: 5,
            concurrent_break: false,
        };
        config.breaking.break_wait_ms = 2_000;
        config.placement.predict_on_break = false;
        let session = Session::start(host.clone(), config, target).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            host.actions()
                .iter()
                .all(|a| !matches!(a, Action::Place { .. })),
            "placed before any break completed"
        );

        // An authoritative removal counts as a completed break and releases
        // the placement gate.
        host.emit(HostEvent::EntityRemoved(charge_at(80, BlockPos::new(2, 4, 0))));
        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Place { .. })))
            .await,
            "break signal did not release the placement gate"
        );
        session.stop();
    }

    #[tokio::test]
    async fn sequenced_place_loop_times_out_without_break() {
        let (host, target) = arena();
        let mut config = test_config();
        config.schedule = ScheduleSection::Desynced {
            place_interval_ms: 5,
            break_interval_ms: 5,
            concurrent_break: false,
        };
        config.breaking.break_wait_ms = 150;
        let session = Session::start(host.clone(), config, target).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            host.actions()
                .iter()
                .all(|a| !matches!(a, Action::Place { .. })),
            "placed inside the wait window"
        );
        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Place { .. })))
            .await,
            "wait window never timed out"
        );
        session.stop();
    }

    #[tokio::test]
    async fn removal_triggers_predicted_replacement() {
        let (host, target) = arena();
        let mut config = test_config();
        config.schedule = ScheduleSection::TickSynced {
            places_per_tick: 1,
            breaks_per_tick: 1,
        };
        let session = Session::start(host.clone(), config, target).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // No tick ever fires; the only placement path left is the removal
        // handler re-evaluating the freed base.
        let base = BlockPos::new(2, 4, 0);
        host.emit(HostEvent::EntityRemoved(charge_at(90, base)));
        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Place { block, .. } if *block == base)))
            .await,
            "freed base was not re-placed"
        );
        assert_eq!(session.stats().placements, 1);
        session.stop();
    }

    #[tokio::test]
    async fn spawn_prediction_attacks_from_handler() {
        let (host, target) = arena();
        let mut config = test_config();
        config.schedule = ScheduleSection::TickSynced {
            places_per_tick: 1,
            breaks_per_tick: 1,
        };
        config.breaking.predict_on_spawn = true;
        let session = Session::start(host.clone(), config, target).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // No break cycle runs without ticks; the attack must come straight
        // from the spawn handler.
        let charge = charge_at(91, BlockPos::new(2, 4, 0));
        host.insert_entity(charge.clone());
        host.emit(HostEvent::EntitySpawned(charge));
        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Attack(EntityId(91)))))
            .await,
            "spawned charge never attacked"
        );
        assert_eq!(session.stats().attacks, 1);
        session.stop();
    }

    #[tokio::test]
    async fn explosion_prediction_reuses_fast_killed_base() {
        let (host, target) = arena();
        let mut config = test_config();
        config.schedule = ScheduleSection::TickSynced {
            places_per_tick: 1,
            breaks_per_tick: 1,
        };
        config.placement.predict_on_explosion = true;
        let session = Session::start(host.clone(), config, target).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        host.emit(HostEvent::Tick(1));
        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Place { .. })))
            .await
        );
        let base = host
            .actions()
            .iter()
            .find_map(|a| match a {
                Action::Place { block, .. } => Some(*block),
                _ => None,
            })
            .unwrap();
        let charge = charge_at(92, base);
        host.insert_entity(charge.clone());
        host.emit(HostEvent::EntitySpawned(charge.clone()));
        assert!(eventually(|| session.stats().confirms == 1).await);

        host.remove_entity(charge.id);
        host.emit(HostEvent::AreaEffect(base.charge_center()));
        let placed_at_base = || {
            host.actions()
                .iter()
                .filter(|a| matches!(a, Action::Place { block, .. } if *block == base))
                .count()
        };
        assert!(
            eventually(|| placed_at_base() == 2).await,
            "fast-killed base was not re-placed"
        );
        assert_eq!(session.stats().fast_kills, 1);
        session.stop();
    }

    #[tokio::test]
    async fn stagger_delays_second_half_of_batch() {
        let (host, target) = arena();
        // A tough target keeps the lethal shortcut from shrinking the batch
        // to a single placement.
        let mut tough = host.entity(target).unwrap();
        tough.health = 1_000.0;
        host.insert_entity(tough);
        let mut config = test_config();
        config.placement.places_per_cycle = 2;
        config.placement.stagger = StaggerMode::On { delay_ms: 300 };
        let session = Session::start(host.clone(), config, target).unwrap();

        let places = || {
            host.actions()
                .iter()
                .filter(|a| matches!(a, Action::Place { .. }))
                .count()
        };
        assert!(eventually(|| places() == 1).await, "first half never placed");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(places(), 1, "second half placed before the delay elapsed");
        assert!(
            eventually(|| places() >= 2).await,
            "second half never placed"
        );
        session.stop();
    }

    #[tokio::test]
    async fn recently_hit_charge_volume_stops_blocking_placement() {
        let (host, target) = arena();
        let mut config = test_config();
        config.lookup.aabb_source = AabbSource::RecentNoHit {
            staleness_ms: 10_000,
        };
        config.breaking.break_wait_ms = 10;
        let session = Session::start(host.clone(), config, target).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let charge = charge_at(95, BlockPos::new(2, 4, 0));
        let volume = charge.aabb();
        host.insert_entity(charge.clone());
        host.emit(HostEvent::EntitySpawned(charge));
        assert!(
            eventually(|| host
                .actions()
                .iter()
                .any(|a| matches!(a, Action::Attack(EntityId(95)))))
            .await
        );
        // Once hit, the charge's volume no longer vetoes overlapping bases.
        assert!(
            eventually(|| host.actions().iter().any(|a| match a {
                Action::Place { block, .. } => charge_occupancy(*block).intersects(&volume),
                _ => false,
            }))
            .await,
            "hit charge volume still blocks placement"
        );
        session.stop();
    }

    #[tokio::test]
    async fn break_min_damage_skips_weak_charges() {
        let (host, target) = arena();
        let mut config = test_config();
        config.breaking.min_damage = 1_000.0;
        let session = Session::start(host.clone(), config, target).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let charge = charge_at(96, BlockPos::new(2, 4, 0));
        host.insert_entity(charge.clone());
        host.emit(HostEvent::EntitySpawned(charge));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            host.actions()
                .iter()
                .all(|a| !matches!(a, Action::Attack(_))),
            "attacked a charge below the damage floor"
        );
        session.stop();
    }

    #[tokio::test]
    async fn stop_before_pump_runs_suppresses_event_handling() {
        let (host, target) = arena();
        let mut config = test_config();
        config.schedule = ScheduleSection::TickSynced {
            places_per_tick: 1,
            breaks_per_tick: 1,
        };
        let session = Session::start(host.clone(), config, target).unwrap();
        session.stop();

        tokio::time::sleep(Duration::from_millis(20)).await;
        host.emit(HostEvent::Tick(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            host.actions().is_empty(),
            "stopped session still acted on host events"
        );
        assert_eq!(session.stats().placements, 0);
    }
}
