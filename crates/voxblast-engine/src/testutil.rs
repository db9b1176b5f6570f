//! In-process host double for session tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use voxblast_core::grid::GridWorld;
use voxblast_core::{BlockPos, EntityId, EntitySnapshot, Face, Vec3, WorldView, EYE_HEIGHT};

use crate::host::{AgentState, Host, HostEvent, PlaceOptions};

/// One recorded action primitive, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Look(Vec3),
    Equip { offhand: bool },
    Place { block: BlockPos, face: Face },
    Attack(EntityId),
}

pub struct MockHost {
    world: Arc<GridWorld>,
    agent: Mutex<AgentState>,
    entities: Mutex<HashMap<EntityId, EntitySnapshot>>,
    actions: Mutex<Vec<Action>>,
    equip_ok: AtomicBool,
    events: broadcast::Sender<HostEvent>,
}

impl MockHost {
    pub fn new(world: GridWorld, feet: Vec3) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            world: Arc::new(world),
            agent: Mutex::new(AgentState {
                position: feet,
                eye_position: feet.offset(0.0, EYE_HEIGHT, 0.0),
                view_direction: Vec3::new(0.0, 0.0, -1.0),
            }),
            entities: Mutex::new(HashMap::new()),
            actions: Mutex::new(Vec::new()),
            equip_ok: AtomicBool::new(true),
            events,
        }
    }

    pub fn insert_entity(&self, entity: EntitySnapshot) {
        self.entities.lock().unwrap().insert(entity.id, entity);
    }

    pub fn remove_entity(&self, id: EntityId) {
        self.entities.lock().unwrap().remove(&id);
    }

    pub fn set_equip_ok(&self, ok: bool) {
        self.equip_ok.store(ok, Ordering::Relaxed);
    }

    /// Push a host notification; dropped silently when nothing listens yet.
    pub fn emit(&self, event: HostEvent) {
        let _ = self.events.send(event);
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: Action) {
        self.actions.lock().unwrap().push(action);
    }
}

impl Host for MockHost {
    fn world(&self) -> Arc<dyn WorldView> {
        self.world.clone()
    }

    fn agent(&self) -> AgentState {
        *self.agent.lock().unwrap()
    }

    fn entity(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.entities.lock().unwrap().get(&id).cloned()
    }

    fn entities(&self) -> Vec<EntitySnapshot> {
        self.entities.lock().unwrap().values().cloned().collect()
    }

    fn look_at(&self, point: Vec3, _immediate: bool) {
        let mut agent = self.agent.lock().unwrap();
        agent.view_direction = (point - agent.eye_position).normalized();
        drop(agent);
        self.record(Action::Look(point));
    }

    fn equip_charge(&self, offhand: bool) -> bool {
        self.record(Action::Equip { offhand });
        self.equip_ok.load(Ordering::Relaxed)
    }

    fn place_charge(&self, block: BlockPos, face: Face, _options: PlaceOptions) {
        self.record(Action::Place { block, face });
    }

    fn attack(&self, id: EntityId, _swing: bool, _offhand: bool) {
        self.record(Action::Attack(id));
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}
