//! Deterministic simulation module
//!
//! Character kinematics, local physics and goal scoring. This module must stay
//! pure and deterministic:
//! - No network or platform dependencies
//! - Seeded RNG only
//! - Time enters only through explicit `dt` / clock arguments

pub mod goal;
pub mod physics;
pub mod state;

pub use goal::{CollisionCheck, Goal, GoalTracker};
pub use physics::{
    DirectionalInput, StepEnv, apply_layer_change, apply_stop, attraction_force,
    effective_speed, is_walking, layer_multiplier, step_directional, step_magnet,
};
pub use state::{Gait, KinematicState, Layer, Playfield, PointerTarget, Session};
