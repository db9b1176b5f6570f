//! Geometry, entity snapshots, world access, and the blast damage model.

pub mod aabb;
pub mod damage;
pub mod entity;
pub mod grid;
pub mod math;
pub mod world;

pub use aabb::Aabb;
pub use entity::{ArmorStats, EntityId, EntityKind, EntitySnapshot, EYE_HEIGHT};
pub use math::{BlockPos, Face, Vec3};
pub use world::{BlockId, RayHit, WorldView, AIR};
