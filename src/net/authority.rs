//! Remote authority client
//!
//! Turns intents into REST calls. Every failure (transport, non-2xx status,
//! undecodable body) comes back as `Unreachable`; nothing here panics or
//! touches session state. Callers apply returned snapshots themselves.

use std::rc::Rc;

use async_trait::async_trait;
use glam::Vec3;
use serde::de::DeserializeOwned;

use super::wire::{
    Ack, AnimateRequest, CharacterSnapshot, CreateRequest, LayerRequest, MoveRequest,
};
use crate::error::Unreachable;
use crate::sim::Layer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Raw transport answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP mechanics behind the client. Paths are relative to the API base.
#[async_trait(?Send)]
pub trait Transport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Reply, Unreachable>;
}

fn encode_body<T: serde::Serialize>(body: &T) -> Result<serde_json::Value, Unreachable> {
    serde_json::to_value(body).map_err(|e| Unreachable::Decode(e.to_string()))
}

fn decode<T: DeserializeOwned>(reply: &Reply) -> Result<T, Unreachable> {
    serde_json::from_str(&reply.body).map_err(|e| Unreachable::Decode(e.to_string()))
}

fn decode_ack(reply: &Reply) -> Result<Ack, Unreachable> {
    if reply.body.trim().is_empty() {
        return Ok(Ack::default());
    }
    decode(reply)
}

#[derive(Clone)]
pub struct AuthorityClient {
    transport: Rc<dyn Transport>,
    /// Prefix that turns a layer name into a behaviour class
    namespace: String,
}

impl AuthorityClient {
    pub fn new(transport: Rc<dyn Transport>, namespace: impl Into<String>) -> Self {
        Self {
            transport,
            namespace: namespace.into(),
        }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Reply, Unreachable> {
        log::debug!("{} {}", method.as_str(), path);
        let reply = self.transport.request(method, path, body).await?;
        if !reply.is_success() {
            return Err(Unreachable::Status {
                status: reply.status,
            });
        }
        Ok(reply)
    }

    fn character_path(id: &str, action: &str) -> String {
        format!("/characters/{}/{action}", urlencoding::encode(id))
    }

    /// Connectivity probe (`GET /layers`), body ignored
    pub async fn probe(&self) -> Result<(), Unreachable> {
        self.call(Method::Get, "/layers", None).await.map(|_| ())
    }

    pub async fn create_character(&self, spawn: Vec3) -> Result<CharacterSnapshot, Unreachable> {
        let body = encode_body(&CreateRequest {
            x: spawn.x,
            y: spawn.y,
            z: spawn.z,
        })?;
        let reply = self.call(Method::Post, "/characters", Some(body)).await?;
        let snapshot: CharacterSnapshot = decode(&reply)?;
        if snapshot.character_id.is_none() {
            return Err(Unreachable::Decode("creation response lacks characterId".into()));
        }
        Ok(snapshot)
    }

    /// `direction` does not need to be normalized
    pub async fn move_character(
        &self,
        id: &str,
        direction: Vec3,
        speed: f32,
    ) -> Result<CharacterSnapshot, Unreachable> {
        let body = encode_body(&MoveRequest {
            direction_x: direction.x,
            direction_y: direction.y,
            direction_z: direction.z,
            speed,
        })?;
        let reply = self
            .call(Method::Post, &Self::character_path(id, "move"), Some(body))
            .await?;
        decode(&reply)
    }

    pub async fn stop(&self, id: &str) -> Result<CharacterSnapshot, Unreachable> {
        let reply = self
            .call(Method::Post, &Self::character_path(id, "stop"), None)
            .await?;
        decode(&reply)
    }

    pub async fn animate(
        &self,
        id: &str,
        animation_id: &str,
        speed: f32,
    ) -> Result<CharacterSnapshot, Unreachable> {
        let body = encode_body(&AnimateRequest {
            animation_id: animation_id.to_string(),
            speed,
        })?;
        let reply = self
            .call(Method::Post, &Self::character_path(id, "animate"), Some(body))
            .await?;
        decode(&reply)
    }

    /// Register `layer`. Retiring the previous layer is the caller's job.
    pub async fn set_layer(&self, layer: Layer, priority: i32) -> Result<Ack, Unreachable> {
        let body = encode_body(&LayerRequest {
            class_name: layer.wire_class(&self.namespace),
            priority,
        })?;
        let reply = self.call(Method::Post, "/layers", Some(body)).await?;
        decode_ack(&reply)
    }

    /// Best-effort removal
    pub async fn remove_layer(&self, layer: Layer) -> Result<Ack, Unreachable> {
        let class = layer.wire_class(&self.namespace);
        let path = format!("/layers/{}", urlencoding::encode(&class));
        let reply = self.call(Method::Delete, &path, None).await?;
        decode_ack(&reply)
    }
}
