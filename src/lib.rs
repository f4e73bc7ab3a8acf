//! Motion Master - layer-driven character motion with online/offline authority
//!
//! Core modules:
//! - `sim`: Kinematic state, local physics and goal tracking (pure, deterministic)
//! - `net`: Remote authority client, wire format and push channel supervision
//! - `mode`: Online/offline mode reconciliation
//! - `motion`: Per-frame driver tying input, authority and physics together
//! - `platform`: Host bindings (task spawners, push socket, page origin)
//! - `settings`: Persisted configuration

pub mod error;
pub mod mode;
pub mod motion;
pub mod net;
pub mod platform;
pub mod settings;
pub mod sim;

pub use error::{InvalidState, SettingsError, Unreachable, UserActionRejected};
pub use mode::{Mode, ModeReconciler};
pub use motion::{FrameSnapshot, MotionLoop, Notice, Spawn};
pub use settings::Settings;

/// Engine tuning constants
pub mod consts {
    /// Default playfield size when the host has not reported a canvas yet
    pub const DEFAULT_EXTENT_X: f32 = 600.0;
    pub const DEFAULT_EXTENT_Y: f32 = 400.0;
    /// Distance kept between the character and the playfield edge
    pub const BOUNDARY_MARGIN: f32 = 20.0;

    /// Base speed used for button/keyboard moves
    pub const DEFAULT_SPEED: f32 = 1.0;
    /// Hard cap on character speed
    pub const MAX_SPEED: f32 = 8.0;
    /// Speed below which the character counts as stopped
    pub const SPEED_EPSILON: f32 = 0.01;
    /// Pixels per unit of effective speed for a discrete directional step
    pub const MOVE_SCALE: f32 = 5.0;

    /// Magnet: pointer is considered reached inside this distance
    pub const SNAP_DISTANCE: f32 = 5.0;
    /// Magnet: attraction force at zero distance
    pub const BASE_FORCE: f32 = 0.5;
    /// Magnet: attraction force never exceeds this
    pub const FORCE_CAP: f32 = 2.0;
    /// Magnet: per-frame speed retention (exponential smoothing / decay)
    pub const SPEED_RETENTION: f32 = 0.95;
    /// Magnet: pixels per unit of speed*force at 60 fps
    pub const MAGNET_SCALE: f32 = 3.0;
    /// Reference frame rate the magnet integrator is tuned for
    pub const REFERENCE_FPS: f32 = 60.0;

    /// Walking bob amplitude (world units on y)
    pub const BOB_AMPLITUDE: f32 = 0.05;
    /// Walking bob angular rate (radians per second)
    pub const BOB_RATE: f32 = 2.0;

    /// Goal collision radius (strict less-than)
    pub const GOAL_RADIUS: f32 = 30.0;
    /// Points per reached goal
    pub const GOAL_AWARD: u64 = 10;
    /// Goals spawn at least this far from the playfield edge
    pub const GOAL_PADDING: f32 = 50.0;

    /// Priority sent with every layer registration
    pub const LAYER_PRIORITY: i32 = 1;
}

/// Yaw in degrees for a movement direction on the XZ plane
#[inline]
pub fn yaw_degrees(dir_x: f32, dir_z: f32) -> f32 {
    dir_x.atan2(dir_z).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaw_degrees() {
        assert!((yaw_degrees(0.0, 1.0) - 0.0).abs() < 1e-4);
        assert!((yaw_degrees(1.0, 0.0) - 90.0).abs() < 1e-4);
        assert!((yaw_degrees(-1.0, 0.0) + 90.0).abs() < 1e-4);
        assert!((yaw_degrees(0.0, -1.0).abs() - 180.0).abs() < 1e-4);
    }
}
