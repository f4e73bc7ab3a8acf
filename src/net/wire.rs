//! JSON shapes exchanged with the remote authority

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::sim::KinematicState;

/// Full kinematic record returned after any character action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default)]
    pub speed: f32,
    #[serde(default)]
    pub rotation_x: f32,
    #[serde(default)]
    pub rotation_y: f32,
    #[serde(default)]
    pub rotation_z: f32,
}

impl CharacterSnapshot {
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn rotation(&self) -> Vec3 {
        Vec3::new(self.rotation_x, self.rotation_y, self.rotation_z)
    }

    /// Merge into local state in one step. The character id is only taken
    /// when the snapshot carries one.
    pub fn apply_to(&self, state: &mut KinematicState) {
        if let Some(id) = &self.character_id {
            state.character_id = Some(id.clone());
        }
        state.position = self.position();
        state.rotation = self.rotation();
        state.speed = self.speed;
        state.is_moving = self.speed > 0.0;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRequest {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub direction_x: f32,
    pub direction_y: f32,
    pub direction_z: f32,
    pub speed: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimateRequest {
    pub animation_id: String,
    pub speed: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRequest {
    pub class_name: String,
    pub priority: i32,
}

/// Layer acknowledgement; `DELETE` answers with an empty body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Inbound push-channel message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushMessage {
    #[serde(rename_all = "camelCase")]
    PositionUpdate {
        character_id: String,
        position: WirePosition,
    },
    #[serde(rename_all = "camelCase")]
    AnimationUpdate {
        character_id: String,
        #[serde(default)]
        animation_id: Option<String>,
        #[serde(default)]
        progress: f32,
    },
    #[serde(rename_all = "camelCase")]
    LayerUpdate {
        character_id: String,
        active_layer: String,
    },
}

impl PushMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn character_id(&self) -> &str {
        match self {
            PushMessage::PositionUpdate { character_id, .. }
            | PushMessage::AnimationUpdate { character_id, .. }
            | PushMessage::LayerUpdate { character_id, .. } => character_id,
        }
    }
}
