//! A tiny in-process host: flat arena, one hostile target, and just enough
//! blast physics to exercise the whole engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tracing::{debug, info};

use voxblast_core::damage::{blast_damage, Difficulty, CHARGE_POWER};
use voxblast_core::grid::GridWorld;
use voxblast_core::{
    ArmorStats, BlockPos, EntityId, EntityKind, EntitySnapshot, Face, Vec3, WorldView, EYE_HEIGHT,
};
use voxblast_engine::{AgentState, Host, HostEvent, PlaceOptions};

pub struct SimHost {
    world: Arc<GridWorld>,
    state: Mutex<SimState>,
    events: broadcast::Sender<HostEvent>,
    difficulty: Difficulty,
    damage_multiplier: f64,
}

struct SimState {
    agent: AgentState,
    entities: HashMap<EntityId, EntitySnapshot>,
    pending_places: Vec<BlockPos>,
    pending_breaks: Vec<EntityId>,
    next_id: u64,
    rng: StdRng,
    target: EntityId,
    arena_half: f64,
}

impl SimHost {
    pub fn new(
        world: GridWorld,
        agent_feet: Vec3,
        target: EntitySnapshot,
        difficulty: Difficulty,
        damage_multiplier: f64,
        seed: u64,
        arena_half: f64,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let target_id = target.id;
        let mut entities = HashMap::new();
        entities.insert(target.id, target);
        Self {
            world: Arc::new(world),
            state: Mutex::new(SimState {
                agent: AgentState {
                    position: agent_feet,
                    eye_position: agent_feet.offset(0.0, EYE_HEIGHT, 0.0),
                    view_direction: Vec3::new(0.0, 0.0, -1.0),
                },
                entities,
                pending_places: Vec::new(),
                pending_breaks: Vec::new(),
                next_id: 100,
                rng: StdRng::seed_from_u64(seed),
                target: target_id,
                arena_half,
            }),
            events,
            difficulty,
            damage_multiplier,
        }
    }

    pub fn target_health(&self) -> f64 {
        let state = self.state.lock().unwrap();
        state
            .entities
            .get(&state.target)
            .map_or(0.0, |e| e.health)
    }

    /// Advance the simulation one tick: spawn queued placements, detonate
    /// queued attacks, jitter the target, then announce the tick.
    pub fn step(&self, tick: u64) {
        let mut out: Vec<HostEvent> = Vec::new();
        {
            let mut state = self.state.lock().unwrap();

            for base in std::mem::take(&mut state.pending_places) {
                let id = EntityId(state.next_id);
                state.next_id += 1;
                let charge = EntitySnapshot {
                    id,
                    kind: EntityKind::Charge,
                    position: base.charge_center(),
                    width: 2.0,
                    height: 2.0,
                    health: 1.0,
                    armor: None,
                };
                state.entities.insert(id, charge.clone());
                out.push(HostEvent::EntitySpawned(charge));
            }

            for id in std::mem::take(&mut state.pending_breaks) {
                let Some(charge) = state.entities.remove(&id) else {
                    continue;
                };
                let source = charge.position;
                out.push(HostEvent::AreaEffect(source));
                out.push(HostEvent::EntityRemoved(charge));

                // Blast damage to everything still standing, charges included.
                let victims: Vec<EntityId> = state.entities.keys().copied().collect();
                for victim_id in victims {
                    let victim = state.entities[&victim_id].clone();
                    let raw_only = victim.armor.is_none();
                    let damage = blast_damage(
                        &victim,
                        source,
                        CHARGE_POWER,
                        self.damage_multiplier,
                        raw_only,
                        self.difficulty,
                        self.world.as_ref(),
                    )
                    .unwrap_or(0.0);
                    if damage <= 0.0 {
                        continue;
                    }
                    if victim.is_charge() {
                        let dead = state.entities.remove(&victim_id).unwrap();
                        out.push(HostEvent::EntityRemoved(dead));
                        continue;
                    }
                    let entry = state.entities.get_mut(&victim_id).unwrap();
                    entry.health -= damage;
                    debug!(victim = %victim_id, damage, health = entry.health, "blast hit");
                    if entry.health <= 0.0 {
                        let dead = state.entities.remove(&victim_id).unwrap();
                        info!(victim = %victim_id, "entity destroyed by blast");
                        out.push(HostEvent::EntityRemoved(dead));
                    }
                }
            }

            // The target strafes a little each tick, staying inside the arena.
            let target_id = state.target;
            let half = state.arena_half;
            let (dx, dz) = (
                state.rng.gen_range(-0.2..=0.2),
                state.rng.gen_range(-0.2..=0.2),
            );
            if let Some(target) = state.entities.get_mut(&target_id) {
                target.position.x = (target.position.x + dx).clamp(-half, half);
                target.position.z = (target.position.z + dz).clamp(-half, half);
            }
        }
        out.push(HostEvent::Tick(tick));
        for event in out {
            let _ = self.events.send(event);
        }
    }
}

impl Host for SimHost {
    fn world(&self) -> Arc<dyn WorldView> {
        self.world.clone()
    }

    fn agent(&self) -> AgentState {
        self.state.lock().unwrap().agent
    }

    fn entity(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.state.lock().unwrap().entities.get(&id).cloned()
    }

    fn entities(&self) -> Vec<EntitySnapshot> {
        self.state.lock().unwrap().entities.values().cloned().collect()
    }

    fn look_at(&self, point: Vec3, _immediate: bool) {
        let mut state = self.state.lock().unwrap();
        let eye = state.agent.eye_position;
        state.agent.view_direction = (point - eye).normalized();
    }

    fn equip_charge(&self, _offhand: bool) -> bool {
        true
    }

    fn place_charge(&self, block: BlockPos, _face: Face, _options: PlaceOptions) {
        self.state.lock().unwrap().pending_places.push(block);
    }

    fn attack(&self, id: EntityId, _swing: bool, _offhand: bool) {
        self.state.lock().unwrap().pending_breaks.push(id);
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}

/// The standard flat arena: a square obsidian-like platform at y = 4.
pub fn arena_world(half: i32) -> GridWorld {
    let mut world = GridWorld::new();
    world.fill(
        BlockPos::new(-half, 4, -half),
        BlockPos::new(half, 4, half),
        1,
    );
    world
}

/// A target in decent armor, standing mid-arena.
pub fn default_target() -> EntitySnapshot {
    EntitySnapshot {
        id: EntityId(1),
        kind: EntityKind::Player,
        position: Vec3::new(0.5, 5.0, 0.5),
        width: 0.6,
        height: 1.8,
        health: 20.0,
        armor: Some(ArmorStats {
            armor: 20.0,
            toughness: 8.0,
            protection_points: 8,
            resistance_level: 0,
        }),
    }
}
