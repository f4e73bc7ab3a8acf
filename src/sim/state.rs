//! Session state and core simulation types
//!
//! Everything the engine mutates between frames lives here, owned by one
//! `Session` value instead of a shared global.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::InvalidState;

/// Mutually exclusive motion behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Layer {
    #[default]
    #[serde(rename = "BasicWalkingLayer")]
    BasicWalking,
    #[serde(rename = "RunningLayer")]
    Running,
    #[serde(rename = "IdleLayer")]
    Idle,
    #[serde(rename = "AdvancedWalkingLayer")]
    AdvancedWalking,
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::BasicWalking,
        Layer::Running,
        Layer::Idle,
        Layer::AdvancedWalking,
    ];

    /// Behaviour class name without namespace
    pub fn class_name(&self) -> &'static str {
        match self {
            Layer::BasicWalking => "BasicWalkingLayer",
            Layer::Running => "RunningLayer",
            Layer::Idle => "IdleLayer",
            Layer::AdvancedWalking => "AdvancedWalkingLayer",
        }
    }

    /// Fully qualified behaviour class the authority registers
    pub fn wire_class(&self, namespace: &str) -> String {
        if namespace.is_empty() {
            self.class_name().to_string()
        } else {
            format!("{namespace}.{}", self.class_name())
        }
    }

    /// Accepts short (`RunningLayer`) or fully qualified
    /// (`com.example...RunningLayer`) names
    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.rsplit('.').next().unwrap_or(name);
        Layer::ALL.into_iter().find(|l| l.class_name() == short)
    }

    /// Layers that must be retired before switching to `self`
    pub fn others(self) -> impl Iterator<Item = Layer> {
        Layer::ALL.into_iter().filter(move |l| *l != self)
    }
}

/// Sub-mode of `Layer::AdvancedWalking`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gait {
    #[default]
    Normal,
    Sneaking,
    Limping,
}

impl Gait {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gait::Normal => "NORMAL",
            Gait::Sneaking => "SNEAKING",
            Gait::Limping => "LIMPING",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NORMAL" => Some(Gait::Normal),
            "SNEAKING" => Some(Gait::Sneaking),
            "LIMPING" => Some(Gait::Limping),
            _ => None,
        }
    }
}

/// Last pointer location driving the magnet integrator
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointerTarget {
    pub x: f32,
    pub y: f32,
    /// No attraction force is applied while false
    pub active: bool,
}

impl PointerTarget {
    pub fn at(x: f32, y: f32) -> Self {
        Self { x, y, active: true }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Rectangular play area in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Playfield {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl Default for Playfield {
    fn default() -> Self {
        Self {
            width: DEFAULT_EXTENT_X,
            height: DEFAULT_EXTENT_Y,
            margin: BOUNDARY_MARGIN,
        }
    }
}

impl Playfield {
    pub fn new(width: f32, height: f32, margin: f32) -> Self {
        Self {
            width,
            height,
            margin,
        }
    }

    /// Character spawn / recovery point (x, z)
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Clamp a coordinate into `[margin, extent - margin]`.
    /// Degenerate playfields collapse onto the centre line.
    fn clamp_axis(value: f32, extent: f32, margin: f32) -> f32 {
        let lo = margin;
        let hi = extent - margin;
        if hi < lo {
            return extent / 2.0;
        }
        value.clamp(lo, hi)
    }

    /// Clamp x and z of a world position
    pub fn clamp(&self, pos: Vec3) -> Vec3 {
        Vec3::new(
            Self::clamp_axis(pos.x, self.width, self.margin),
            pos.y,
            Self::clamp_axis(pos.z, self.height, self.margin),
        )
    }

    pub fn contains(&self, pos: Vec3) -> bool {
        self.clamp(pos) == pos
    }
}

/// Kinematic record of the character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    /// Assigned by the authority, `None` until then
    pub character_id: Option<String>,
    pub position: Vec3,
    pub speed: f32,
    /// Degrees; only `y` (yaw) follows movement
    pub rotation: Vec3,
    pub is_moving: bool,
    pub current_animation: Option<String>,
}

impl Default for KinematicState {
    fn default() -> Self {
        Self {
            character_id: None,
            position: Vec3::ZERO,
            speed: 0.0,
            rotation: Vec3::ZERO,
            is_moving: false,
            current_animation: None,
        }
    }
}

impl KinematicState {
    /// Re-centre a corrupted position, then clamp into the playfield
    pub fn sanitize(&mut self, field: &Playfield) -> Option<InvalidState> {
        let mut repaired = None;
        if !self.position.x.is_finite() || !self.position.z.is_finite() {
            let c = field.center();
            self.position.x = c.x;
            self.position.z = c.y;
            repaired = Some(InvalidState::NonFinitePosition);
        }
        if !self.position.y.is_finite() {
            self.position.y = 0.0;
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            self.speed = 0.0;
        }
        self.speed = self.speed.min(MAX_SPEED);
        self.position = field.clamp(self.position);
        repaired
    }

    /// Drop the moving flag once speed has died out
    pub fn settle(&mut self) {
        if self.speed < SPEED_EPSILON {
            self.speed = 0.0;
            self.is_moving = false;
        }
    }

    /// Planar position used for goal checks (x, z)
    pub fn planar(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }
}

/// The per-game mutable session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub kinematic: KinematicState,
    pub layer: Layer,
    pub gait: Gait,
    pub pointer: PointerTarget,
    pub playfield: Playfield,
    /// Seconds of simulated time, drives the walking bob
    pub clock: f32,
}

impl Session {
    pub fn new(playfield: Playfield) -> Self {
        let c = playfield.center();
        Self {
            kinematic: KinematicState {
                position: Vec3::new(c.x, 0.0, c.y),
                ..KinematicState::default()
            },
            layer: Layer::default(),
            gait: Gait::default(),
            pointer: PointerTarget::default(),
            playfield,
            clock: 0.0,
        }
    }

    /// Forget the character, keep layer/gait and the playfield
    pub fn reset_character(&mut self) {
        let c = self.playfield.center();
        self.kinematic = KinematicState {
            position: Vec3::new(c.x, 0.0, c.y),
            ..KinematicState::default()
        };
        self.pointer = PointerTarget::default();
    }

    /// Gait only modulates advanced walking
    pub fn effective_gait(&self) -> Gait {
        if self.layer == Layer::AdvancedWalking {
            self.gait
        } else {
            Gait::Normal
        }
    }
}
