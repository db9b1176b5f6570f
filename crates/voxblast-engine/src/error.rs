//! Engine error types.

use thiserror::Error;

use voxblast_core::EntityId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// No usable charge item; fatal to the session.
    #[error("no charge item available to equip")]
    EquipFailed,

    #[error("target entity {0} not found")]
    TargetLost(EntityId),
}
