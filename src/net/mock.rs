//! In-memory fake authority for tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use async_trait::async_trait;
use futures::channel::oneshot;
use serde_json::Value;

use super::authority::{Method, Reply, Transport};
use super::wire::CharacterSnapshot;
use crate::error::Unreachable;

type Call = (Method, String, Option<Value>);

/// Behaves like a tiny motion server. Requests can be held to model
/// in-flight calls, and the whole server can drop off the network.
pub(crate) struct MockTransport {
    reachable: Cell<bool>,
    status: Cell<Option<u16>>,
    body: RefCell<Option<String>>,
    fail_deletes: Cell<bool>,
    holding: Cell<bool>,
    waiters: RefCell<Vec<oneshot::Sender<()>>>,
    calls: RefCell<Vec<Call>>,
    characters: RefCell<HashMap<String, CharacterSnapshot>>,
    next_id: Cell<u32>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            reachable: Cell::new(true),
            status: Cell::new(None),
            body: RefCell::new(None),
            fail_deletes: Cell::new(false),
            holding: Cell::new(false),
            waiters: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            characters: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.set(reachable);
    }

    pub fn force_status(&self, status: Option<u16>) {
        self.status.set(status);
    }

    pub fn force_body(&self, body: Option<String>) {
        *self.body.borrow_mut() = body;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.set(fail);
    }

    /// Park every following request until `release`
    pub fn hold(&self) {
        self.holding.set(true);
    }

    pub fn release(&self) {
        self.holding.set(false);
        for tx in self.waiters.borrow_mut().drain(..) {
            let _ = tx.send(());
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, method: Method, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|(m, p, _)| *m == method && p.starts_with(prefix))
            .count()
    }

    fn json(value: &impl serde::Serialize) -> Reply {
        Reply::ok(serde_json::to_string(value).unwrap_or_default())
    }

    fn not_found() -> Reply {
        Reply {
            status: 404,
            body: String::new(),
        }
    }

    fn route(&self, method: Method, path: &str, body: Option<&Value>) -> Reply {
        let num = |key: &str| {
            body.and_then(|b| b.get(key))
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as f32
        };
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        match (method, segments.as_slice()) {
            (Method::Get, ["layers"]) => Reply::ok("[]"),
            (Method::Post, ["layers"]) => {
                let class = body
                    .and_then(|b| b.get("className"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let name = class.rsplit('.').next().unwrap_or_default().to_string();
                Self::json(&serde_json::json!({ "name": name, "className": class }))
            }
            (Method::Delete, ["layers", _]) if self.fail_deletes.get() => Self::not_found(),
            (Method::Delete, ["layers", _]) => Reply::ok(""),
            (Method::Post, ["characters"]) => {
                let id = format!("srv-{}", self.next_id.get());
                self.next_id.set(self.next_id.get() + 1);
                let snap = CharacterSnapshot {
                    character_id: Some(id.clone()),
                    x: num("x"),
                    y: num("y"),
                    z: num("z"),
                    speed: 0.0,
                    rotation_x: 0.0,
                    rotation_y: 0.0,
                    rotation_z: 0.0,
                };
                self.characters.borrow_mut().insert(id, snap.clone());
                Self::json(&snap)
            }
            (Method::Post, ["characters", id, action]) => {
                let id = urlencoding::decode(id)
                    .map(|s| s.into_owned())
                    .unwrap_or_default();
                let mut characters = self.characters.borrow_mut();
                let Some(snap) = characters.get_mut(&id) else {
                    return Self::not_found();
                };
                match *action {
                    "move" => {
                        let speed = num("speed");
                        snap.x += num("directionX") * speed * 10.0;
                        snap.z += num("directionZ") * speed * 10.0;
                        snap.speed = speed;
                    }
                    "stop" => snap.speed = 0.0,
                    "animate" => {}
                    _ => return Self::not_found(),
                }
                Self::json(snap)
            }
            _ => Self::not_found(),
        }
    }
}

#[async_trait(?Send)]
impl Transport for MockTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Reply, Unreachable> {
        self.calls
            .borrow_mut()
            .push((method, path.to_string(), body.clone()));

        if self.holding.get() {
            let (tx, rx) = oneshot::channel();
            self.waiters.borrow_mut().push(tx);
            let _ = rx.await;
        }

        if !self.reachable.get() {
            return Err(Unreachable::Transport("connection refused".into()));
        }
        if let Some(status) = self.status.get() {
            return Ok(Reply {
                status,
                body: String::new(),
            });
        }
        if let Some(body) = self.body.borrow().clone() {
            return Ok(Reply::ok(body));
        }
        Ok(self.route(method, path, body.as_ref()))
    }
}
