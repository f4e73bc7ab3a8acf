//! Local physics used while no remote authority is reachable
//!
//! Every step is a pure function of the previous kinematic state, the input
//! and the active layer/gait. Nothing here reads the clock or the mode.

use glam::Vec2;

use super::state::{Gait, KinematicState, Layer, Playfield, PointerTarget};
use crate::consts::*;
use crate::yaw_degrees;

/// Speed scale applied by a layer (and gait, for advanced walking)
pub fn layer_multiplier(layer: Layer, gait: Gait) -> f32 {
    match layer {
        Layer::BasicWalking => 1.0,
        Layer::Running => 2.0,
        Layer::Idle => 0.0,
        Layer::AdvancedWalking => match gait {
            Gait::Normal => 1.0,
            Gait::Sneaking => 0.6,
            Gait::Limping => 0.8,
        },
    }
}

/// Drives the cosmetic vertical bob
pub fn is_walking(layer: Layer, speed: f32) -> bool {
    layer == Layer::BasicWalking && speed > 0.0
}

/// Everything a step needs besides the state and the input
#[derive(Debug, Clone, Copy)]
pub struct StepEnv {
    pub layer: Layer,
    /// Ignored unless `layer` is advanced walking
    pub gait: Gait,
    pub playfield: Playfield,
    /// Session time in seconds
    pub clock: f32,
}

impl StepEnv {
    fn multiplier(&self) -> f32 {
        layer_multiplier(self.layer, self.gait)
    }
}

/// A discrete button/keyboard move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalInput {
    pub dir_x: f32,
    pub dir_z: f32,
    /// Base magnitude before layer scaling
    pub speed: f32,
}

impl DirectionalInput {
    pub fn new(dir_x: f32, dir_z: f32, speed: f32) -> Self {
        Self { dir_x, dir_z, speed }
    }
}

fn prepare(state: &KinematicState, field: &Playfield) -> KinematicState {
    let mut next = state.clone();
    if let Some(problem) = next.sanitize(field) {
        log::warn!("{problem}, resetting to playfield centre");
    }
    next
}

fn apply_bob(state: &mut KinematicState, env: &StepEnv) {
    if is_walking(env.layer, state.speed) {
        state.position.y = (env.clock * BOB_RATE).sin() * BOB_AMPLITUDE;
    }
}

/// Effective speed for a directional move
pub fn effective_speed(base: f32, layer: Layer, gait: Gait) -> f32 {
    (base.max(0.0) * layer_multiplier(layer, gait)).min(MAX_SPEED)
}

/// Advance one discrete directional step
pub fn step_directional(
    state: &KinematicState,
    input: &DirectionalInput,
    env: &StepEnv,
) -> KinematicState {
    let mut next = prepare(state, &env.playfield);

    next.rotation.y = yaw_degrees(input.dir_x, input.dir_z);

    let speed = effective_speed(input.speed, env.layer, env.gait);
    next.position.x += input.dir_x * speed * MOVE_SCALE;
    next.position.z += input.dir_z * speed * MOVE_SCALE;
    next.position = env.playfield.clamp(next.position);

    next.speed = speed;
    next.is_moving = speed > 0.0;
    apply_bob(&mut next, env);
    next
}

/// Attraction force toward a pointer `distance` pixels away
pub fn attraction_force(distance: f32) -> f32 {
    (BASE_FORCE * (1.0 + distance / 100.0)).min(FORCE_CAP)
}

fn decay(state: &mut KinematicState) {
    state.speed *= SPEED_RETENTION;
    state.settle();
}

/// Advance the pointer-attraction integrator by `dt` seconds.
///
/// Returns the new state and the (possibly deactivated) pointer.
pub fn step_magnet(
    state: &KinematicState,
    pointer: &PointerTarget,
    env: &StepEnv,
    dt: f32,
) -> (KinematicState, PointerTarget) {
    let mut next = prepare(state, &env.playfield);
    let mut pointer = *pointer;

    if !pointer.active {
        decay(&mut next);
        return (next, pointer);
    }

    let to_target = pointer.position() - next.planar();
    let distance = to_target.length();

    if distance < SNAP_DISTANCE {
        pointer.active = false;
        decay(&mut next);
        return (next, pointer);
    }

    let dir: Vec2 = to_target / distance;
    let force = attraction_force(distance);
    let target_speed = DEFAULT_SPEED * env.multiplier();

    next.speed = (next.speed * SPEED_RETENTION + target_speed * (1.0 - SPEED_RETENTION))
        .min(MAX_SPEED);

    let frames = dt.max(0.0) * REFERENCE_FPS;
    let step = dir * next.speed * force * MAGNET_SCALE * frames;
    next.position.x += step.x;
    next.position.z += step.y;
    next.position = env.playfield.clamp(next.position);

    next.rotation.y = yaw_degrees(dir.x, dir.y);
    next.is_moving = true;
    next.settle();
    apply_bob(&mut next, env);

    (next, pointer)
}

/// Offline stop
pub fn apply_stop(state: &KinematicState) -> KinematicState {
    let mut next = state.clone();
    next.speed = 0.0;
    next.is_moving = false;
    next.current_animation = None;
    next
}

/// Offline speed adjustment when the active layer changes
pub fn apply_layer_change(state: &KinematicState, layer: Layer) -> KinematicState {
    let mut next = state.clone();
    match layer {
        Layer::Idle => {
            next.speed = 0.0;
            next.is_moving = false;
        }
        Layer::Running if next.is_moving => next.speed = DEFAULT_SPEED * 2.0,
        _ if next.is_moving => next.speed = DEFAULT_SPEED,
        _ => {}
    }
    next
}
