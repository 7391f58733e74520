//! Resource-allocation core for the dual-connectivity RAN planner.
//!
//! The modules model a pair of co-located stations (one legacy, one
//! next-generation with spatial-multiplexing layers), their frequency-time
//! resource grids, a SINR-driven channel model, and the journaled allocation
//! primitives the strategy drivers compose into complete planning runs.

pub mod alloc;
pub mod channel;
pub mod geometry;
pub mod grid;
pub mod journal;
pub mod network;
pub mod prelude;
pub mod radio;
pub mod strategy;
pub mod zone;

/// Common error type for scenario construction.
///
/// Allocation failure is never an error: a placement that finds no room is
/// an expected outcome reported as a plain result value. Errors cover only
/// topology and profile inputs that cannot produce a well-formed model.
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
    #[error("invalid UE profile: {0}")]
    InvalidProfile(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
