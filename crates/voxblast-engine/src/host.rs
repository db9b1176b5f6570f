//! The host boundary: everything the engine consumes from and issues to the
//! surrounding simulation.

use std::sync::Arc;

use tokio::sync::broadcast;

use voxblast_core::{BlockPos, EntityId, EntitySnapshot, Face, Vec3, WorldView};

/// Snapshot of the agent's own position and view at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentState {
    /// Feet position.
    pub position: Vec3,
    pub eye_position: Vec3,
    /// Unit view direction.
    pub view_direction: Vec3,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceOptions {
    pub offhand: bool,
    pub swing: bool,
}

/// Notifications the host pushes into the engine.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// One simulation step completed.
    Tick(u64),
    EntitySpawned(EntitySnapshot),
    EntityRemoved(EntitySnapshot),
    /// An area-effect (explosion-like) event occurred at a point.
    AreaEffect(Vec3),
    /// An audio cue was heard at a point.
    AudioCue(Vec3),
}

/// Host collaborator interface.
///
/// State reads return snapshots valid for one decision cycle at most; the
/// host mutates the real entities every tick. Action primitives are
/// fire-and-forget packet sends, never awaited for an effect; effects come
/// back as [`HostEvent`]s.
pub trait Host: Send + Sync + 'static {
    fn world(&self) -> Arc<dyn WorldView>;

    fn agent(&self) -> AgentState;

    fn entity(&self, id: EntityId) -> Option<EntitySnapshot>;

    /// All currently-known entities near the agent, the agent excluded.
    fn entities(&self) -> Vec<EntitySnapshot>;

    /// Turn the agent's view toward `point`. `immediate` bypasses any host
    /// smoothing.
    fn look_at(&self, point: Vec3, immediate: bool);

    /// Equip a charge item into the chosen hand. False means no usable item,
    /// which is fatal to the session.
    #[must_use]
    fn equip_charge(&self, offhand: bool) -> bool;

    /// Place a charge against `face` of `block`.
    fn place_charge(&self, block: BlockPos, face: Face, options: PlaceOptions);

    fn attack(&self, id: EntityId, swing: bool, offhand: bool);

    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;
}
