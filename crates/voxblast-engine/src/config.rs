//! Engine configuration, loaded from TOML.
//!
//! Mutually exclusive option bundles (sync mode, claimed-volume source,
//! raycast validation, stagger) are tagged enums so an invalid combination
//! cannot be expressed. [`EngineConfig::validate`] runs once at session
//! start; nothing is re-checked per access.

use serde::Deserialize;
use std::path::Path;

use voxblast_core::damage::{Difficulty, DAMAGE_MULTIPLIER_LEGACY, DAMAGE_MULTIPLIER_MODERN};
use voxblast_core::BlockId;

use crate::error::EngineError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub lookup: LookupSection,
    #[serde(default)]
    pub placement: PlacementSection,
    #[serde(default)]
    pub breaking: BreakingSection,
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub rotation: RotationSection,
    #[serde(default)]
    pub damage: DamageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.placement.places_per_cycle == 0 {
            return Err(EngineError::Config(
                "placement.places_per_cycle must be at least 1".into(),
            ));
        }
        if self.placement.range <= 0.0 {
            return Err(EngineError::Config("placement.range must be positive".into()));
        }
        if self.breaking.range <= 0.0 {
            return Err(EngineError::Config("breaking.range must be positive".into()));
        }
        if self.breaking.tries == 0 {
            return Err(EngineError::Config("breaking.tries must be at least 1".into()));
        }
        if self.lookup.search_radius <= 0.0 {
            return Err(EngineError::Config(
                "lookup.search_radius must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rotation.look_dot_threshold) {
            return Err(EngineError::Config(
                "rotation.look_dot_threshold must be within 0..=1".into(),
            ));
        }
        Ok(())
    }
}

/// How the engine's decision points relate to host ticks.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleSection {
    /// All decisions run inside the per-tick notification, bounded per tick.
    TickSynced {
        #[serde(default = "default_places_per_tick")]
        places_per_tick: u32,
        #[serde(default = "default_breaks_per_tick")]
        breaks_per_tick: u32,
    },
    /// Independent timer-driven place/break loops.
    Desynced {
        #[serde(default = "default_place_interval_ms")]
        place_interval_ms: u64,
        #[serde(default = "default_break_interval_ms")]
        break_interval_ms: u64,
        /// When false, the place loop waits for a break-completed signal
        /// (or timeout) before its next cycle.
        #[serde(default = "default_true")]
        concurrent_break: bool,
    },
}

fn default_places_per_tick() -> u32 {
    1
}

fn default_breaks_per_tick() -> u32 {
    1
}

fn default_place_interval_ms() -> u64 {
    50
}

fn default_break_interval_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

impl Default for ScheduleSection {
    fn default() -> Self {
        ScheduleSection::Desynced {
            place_interval_ms: default_place_interval_ms(),
            break_interval_ms: default_break_interval_ms(),
            concurrent_break: true,
        }
    }
}

/// Which volumes count as "already spoken for" when filtering candidates.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum AabbSource {
    /// Volumes of charges the tracker believes are live.
    Tracked,
    /// Volumes of charge entities actually present in the world.
    Actual,
    /// Union of both.
    Both,
    /// No overlap filtering against charges.
    None,
    /// Like `Actual`, but a charge the agent hit recently stops counting.
    RecentNoHit {
        #[serde(default = "default_staleness_ms")]
        staleness_ms: u64,
    },
}

fn default_staleness_ms() -> u64 {
    100
}

impl Default for AabbSource {
    fn default() -> Self {
        AabbSource::Both
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupSection {
    /// Run candidate search on its own timer instead of inline per place cycle.
    #[serde(default)]
    pub async_refresh: bool,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Block search radius around the target.
    #[serde(default = "default_search_radius")]
    pub search_radius: f64,
    /// Hard cap on surviving candidates per cycle. 0 = unlimited.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// Block ids a charge may be placed on.
    #[serde(default = "default_placeable")]
    pub placeable: Vec<BlockId>,
    #[serde(default)]
    pub aabb_source: AabbSource,
}

fn default_refresh_interval_ms() -> u64 {
    50
}

fn default_search_radius() -> f64 {
    5.0
}

fn default_candidate_limit() -> usize {
    20
}

fn default_placeable() -> Vec<BlockId> {
    vec![1]
}

impl Default for LookupSection {
    fn default() -> Self {
        Self {
            async_refresh: false,
            refresh_interval_ms: default_refresh_interval_ms(),
            search_radius: default_search_radius(),
            candidate_limit: default_candidate_limit(),
            placeable: default_placeable(),
            aabb_source: AabbSource::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPriority {
    #[default]
    Damage,
    Nearest,
    Farthest,
    /// Keep search order.
    None,
}

/// Line-of-sight validation of placement candidates.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RaycastMode {
    Off,
    On {
        /// Player hitboxes additionally occlude the validation ray.
        #[serde(default)]
        entity_occlusion: bool,
    },
}

impl Default for RaycastMode {
    fn default() -> Self {
        RaycastMode::On {
            entity_occlusion: false,
        }
    }
}

/// Splitting each cycle's placements into an immediate and a delayed batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StaggerMode {
    Off,
    On {
        #[serde(default = "default_stagger_delay_ms")]
        delay_ms: u64,
    },
}

fn default_stagger_delay_ms() -> u64 {
    25
}

impl Default for StaggerMode {
    fn default() -> Self {
        StaggerMode::Off
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacementSection {
    #[serde(default)]
    pub priority: PlacementPriority,
    /// Candidates dealing less raw damage than this are dropped.
    #[serde(default = "default_place_min_damage")]
    pub min_damage: f64,
    #[serde(default = "default_places_per_cycle")]
    pub places_per_cycle: u32,
    /// Extra combination members beyond the per-cycle batch.
    #[serde(default = "default_backup_positions")]
    pub backup_positions: u32,
    /// Maximum distance a combination member may sit from its seed.
    #[serde(default)]
    pub max_seed_radius: Option<f64>,
    #[serde(default = "default_place_range")]
    pub range: f64,
    #[serde(default)]
    pub stagger: StaggerMode,
    #[serde(default)]
    pub raycast: RaycastMode,
    #[serde(default)]
    pub use_offhand: bool,
    /// Re-evaluate a freed base block as soon as its charge is removed.
    #[serde(default = "default_true")]
    pub predict_on_break: bool,
    /// Same re-evaluation on an area-effect event.
    #[serde(default)]
    pub predict_on_explosion: bool,
}

fn default_place_min_damage() -> f64 {
    1.0
}

fn default_places_per_cycle() -> u32 {
    1
}

fn default_backup_positions() -> u32 {
    0
}

fn default_place_range() -> f64 {
    4.5
}

impl Default for PlacementSection {
    fn default() -> Self {
        Self {
            priority: PlacementPriority::default(),
            min_damage: default_place_min_damage(),
            places_per_cycle: default_places_per_cycle(),
            backup_positions: default_backup_positions(),
            max_seed_radius: None,
            range: default_place_range(),
            stagger: StaggerMode::default(),
            raycast: RaycastMode::default(),
            use_offhand: false,
            predict_on_break: true,
            predict_on_explosion: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakingSection {
    /// Attack every queued charge instead of pruning ones an earlier blast
    /// already destroys.
    #[serde(default)]
    pub hit_all: bool,
    /// Charges dealing less raw damage than this to the target are not worth
    /// detonating. 0 disables the check.
    #[serde(default)]
    pub min_damage: f64,
    #[serde(default = "default_break_tries")]
    pub tries: u32,
    #[serde(default = "default_try_delay_ms")]
    pub try_delay_ms: u64,
    /// Bounded wait for the charge's destruction between tries.
    #[serde(default = "default_break_wait_ms")]
    pub break_wait_ms: u64,
    #[serde(default = "default_break_range")]
    pub range: f64,
    /// Require an unobstructed eye-to-charge segment before attacking.
    #[serde(default)]
    pub raytrace: bool,
    #[serde(default = "default_true")]
    pub swing: bool,
    #[serde(default)]
    pub use_offhand: bool,
    /// Attack a just-spawned charge straight from the spawn handler instead
    /// of queueing it for the break loop.
    #[serde(default)]
    pub predict_on_spawn: bool,
}

fn default_break_tries() -> u32 {
    1
}

fn default_try_delay_ms() -> u64 {
    25
}

fn default_break_wait_ms() -> u64 {
    100
}

fn default_break_range() -> f64 {
    4.5
}

impl Default for BreakingSection {
    fn default() -> Self {
        Self {
            hit_all: false,
            min_damage: 0.0,
            tries: default_break_tries(),
            try_delay_ms: default_try_delay_ms(),
            break_wait_ms: default_break_wait_ms(),
            range: default_break_range(),
            raytrace: false,
            swing: true,
            use_offhand: false,
            predict_on_spawn: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerSection {
    /// Infer destruction from area-effect events before the authoritative
    /// removal arrives.
    #[serde(default = "default_true")]
    pub fast_on_area_effect: bool,
    /// Same inference from audio cues.
    #[serde(default)]
    pub fast_on_audio: bool,
    /// Refuse to place where a non-expired attempt is still pending.
    #[serde(default = "default_true")]
    pub care_about_past_attempts: bool,
    /// Attempts unconfirmed for longer than this are presumed lost.
    #[serde(default = "default_retention_ticks")]
    pub retention_ticks: u64,
    /// A fast-killed position becomes placeable immediately.
    #[serde(default = "default_true")]
    pub reuse_after_fast_kill: bool,
}

fn default_retention_ticks() -> u64 {
    10
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            fast_on_area_effect: true,
            fast_on_audio: false,
            care_about_past_attempts: true,
            retention_ticks: default_retention_ticks(),
            reuse_after_fast_kill: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RotationSection {
    /// Skip re-aiming while the current view direction's dot product with
    /// the required one is at least this.
    #[serde(default = "default_look_dot_threshold")]
    pub look_dot_threshold: f64,
    /// While breaking, skip rotation entirely if the current view ray
    /// already passes through the charge's hitbox.
    #[serde(default)]
    pub skip_if_volume_hit: bool,
}

fn default_look_dot_threshold() -> f64 {
    0.999
}

impl Default for RotationSection {
    fn default() -> Self {
        Self {
            look_dot_threshold: default_look_dot_threshold(),
            skip_if_volume_hit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageEra {
    #[default]
    Modern,
    Legacy,
}

impl DamageEra {
    pub fn multiplier(self) -> f64 {
        match self {
            DamageEra::Modern => DAMAGE_MULTIPLIER_MODERN,
            DamageEra::Legacy => DAMAGE_MULTIPLIER_LEGACY,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DamageSection {
    #[serde(default)]
    pub era: DamageEra,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
