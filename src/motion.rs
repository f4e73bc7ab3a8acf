//! Per-frame motion driver
//!
//! Owns the session and decides per intent whether the remote authority or
//! the local physics computes the next state. Authority calls run as local
//! tasks and report back through an inbox that is drained at the start of
//! every frame, so a frame never waits on the network and every snapshot is
//! applied in one step.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::Serialize;

use crate::consts::*;
use crate::error::{InvalidState, UserActionRejected};
use crate::mode::{Mode, ModeReconciler};
use crate::net::{
    AuthorityClient, ChannelEvent, ChannelSupervisor, CharacterSnapshot, PushMessage, Transport,
};
use crate::settings::Settings;
use crate::sim::{
    DirectionalInput, Gait, Goal, GoalTracker, KinematicState, Layer, Playfield, PointerTarget,
    Session, StepEnv, apply_layer_change, apply_stop, is_walking, step_directional, step_magnet,
};

pub type LocalTask = LocalBoxFuture<'static, ()>;

/// Runs authority tasks on the host's single-threaded executor
pub trait Spawn {
    fn spawn(&self, task: LocalTask);
}

impl Spawn for futures::executor::LocalSpawner {
    fn spawn(&self, task: LocalTask) {
        if let Err(e) = self.spawn_local(task) {
            log::error!("Failed to spawn authority task: {e}");
        }
    }
}

/// User-facing events, drained by the UI with `take_notices`
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    GoalReached { score: u64 },
    ModeChanged(Mode),
    Rejected(UserActionRejected),
    Info(String),
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::GoalReached { score } => format!("Goal reached! +{GOAL_AWARD} points ({score})"),
            Notice::ModeChanged(Mode::Online) => "Connected".to_string(),
            Notice::ModeChanged(Mode::Offline) => "Offline mode".to_string(),
            Notice::Rejected(reason) => reason.to_string(),
            Notice::Info(text) => text.clone(),
        }
    }
}

/// Read-only view handed to the renderer once per frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub kinematic: KinematicState,
    pub layer: Layer,
    pub gait: Gait,
    pub mode: Mode,
    pub score: u64,
    pub goal: Goal,
    pub pointer: PointerTarget,
    /// Drives the walking bob in the renderer
    pub walking: bool,
    pub channel_open: bool,
}

#[derive(Debug, Clone)]
enum Intent {
    Move {
        direction: Vec3,
        speed: f32,
        from_pointer: bool,
    },
    Stop,
    Animate(String),
}

#[derive(Debug)]
enum Completion {
    Applied {
        seq: u64,
        snapshot: CharacterSnapshot,
        intent: Intent,
    },
    Failed {
        seq: u64,
        intent: Intent,
    },
    Created {
        seq: u64,
        snapshot: CharacterSnapshot,
    },
    CreateFailed {
        seq: u64,
    },
    LayerSet {
        seq: u64,
        layer: Layer,
    },
    LayerFallback {
        seq: u64,
        layer: Layer,
    },
    Probed(bool),
}

type Inbox = Rc<RefCell<VecDeque<Completion>>>;

fn mock_id(rng: &mut Pcg32) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let suffix: String = (0..7)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    format!("mock-{suffix}")
}

pub struct MotionLoop {
    session: Session,
    goals: GoalTracker,
    mode: ModeReconciler,
    client: AuthorityClient,
    spawner: Rc<dyn Spawn>,
    inbox: Inbox,
    channel: ChannelSupervisor,
    notices: Vec<Notice>,
    rng: Pcg32,
    /// Last sequence number handed to a request
    seq: u64,
    /// Newest snapshot sequence applied to the session
    last_applied_seq: u64,
    /// Completions at or below this belong to a previous game
    seq_floor: u64,
    character_is_mock: bool,
    adopting: bool,
    magnet_in_flight: bool,
    last_magnet_ms: f64,
    magnet_interval_ms: f64,
    boundary_margin: f32,
    now_ms: f64,
}

impl MotionLoop {
    pub fn new(
        settings: &Settings,
        extent: (f32, f32),
        transport: Rc<dyn Transport>,
        spawner: Rc<dyn Spawn>,
        seed: u64,
    ) -> Self {
        let seed = settings.seed.unwrap_or(seed);
        let playfield = Playfield::new(extent.0, extent.1, settings.boundary_margin);
        Self {
            session: Session::new(playfield),
            goals: GoalTracker::new(seed, playfield, settings.goal_padding),
            mode: ModeReconciler::new(Mode::Online),
            client: AuthorityClient::new(transport, settings.layer_namespace.clone()),
            spawner,
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            channel: ChannelSupervisor::new(settings.reconnect_delay_ms),
            notices: Vec::new(),
            rng: Pcg32::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15),
            seq: 0,
            last_applied_seq: 0,
            seq_floor: 0,
            character_is_mock: false,
            adopting: false,
            magnet_in_flight: false,
            last_magnet_ms: f64::NEG_INFINITY,
            magnet_interval_ms: settings.remote_magnet_interval_ms,
            boundary_margin: settings.boundary_margin,
            now_ms: 0.0,
        }
    }

    // === Accessors ===

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn mode(&self) -> &ModeReconciler {
        &self.mode
    }

    pub fn score(&self) -> u64 {
        self.goals.score()
    }

    pub fn goal(&self) -> Goal {
        self.goals.goal()
    }

    pub fn character_is_mock(&self) -> bool {
        self.character_is_mock
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            kinematic: self.session.kinematic.clone(),
            layer: self.session.layer,
            gait: self.session.gait,
            mode: self.mode.mode(),
            score: self.goals.score(),
            goal: self.goals.goal(),
            pointer: self.session.pointer,
            walking: is_walking(self.session.layer, self.session.kinematic.speed),
            channel_open: self.channel.is_open(),
        }
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, text: impl Into<String>) {
        self.notices.push(Notice::Info(text.into()));
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.spawner.spawn(Box::pin(task));
    }

    fn env(&self) -> StepEnv {
        StepEnv {
            layer: self.session.layer,
            gait: self.session.effective_gait(),
            playfield: self.session.playfield,
            clock: self.session.clock,
        }
    }

    /// Intents go to the authority only with a server-assigned character
    fn authority_ready(&self) -> bool {
        self.mode.is_online() && !self.character_is_mock
    }

    fn character_id(&self) -> Option<String> {
        let id = self.session.kinematic.character_id.clone();
        if id.is_none() {
            log::debug!("Ignoring intent: {}", InvalidState::MissingCharacter);
        }
        id
    }

    // === Game lifecycle ===

    /// Probe the authority, then create the character remotely or fall
    /// back to a local mock character
    pub fn start(&mut self) {
        let seq = self.next_seq();
        let spawn = self.spawn_point();
        let client = self.client.clone();
        let mode = self.mode.clone();
        let inbox = self.inbox.clone();

        self.spawn(async move {
            match client.probe().await {
                Ok(()) => {
                    mode.probe_succeeded();
                }
                Err(e) => {
                    log::warn!("Authority probe failed: {e}");
                    mode.probe_failed();
                }
            }

            let completion = if mode.is_online() {
                match client.create_character(spawn).await {
                    Ok(snapshot) => Completion::Created { seq, snapshot },
                    Err(e) => {
                        mode.report_unreachable(&e);
                        Completion::CreateFailed { seq }
                    }
                }
            } else {
                Completion::CreateFailed { seq }
            };
            inbox.borrow_mut().push_back(completion);
        });
    }

    fn spawn_point(&self) -> Vec3 {
        let c = self.session.playfield.center();
        Vec3::new(c.x, 0.0, c.y)
    }

    /// Discard the character and score and start over
    pub fn new_game(&mut self) {
        self.seq_floor = self.seq;
        self.last_applied_seq = self.seq;
        self.session.reset_character();
        self.character_is_mock = false;
        self.adopting = false;
        self.goals.reset();
        self.notify("New game started!");
        log::info!("New game");
        self.start();
    }

    pub fn next_goal(&mut self) {
        self.goals.regenerate();
        self.notify("New goal generated!");
    }

    /// Explicit reconnect: probe once and report the outcome
    pub fn reconnect(&mut self) {
        let client = self.client.clone();
        let mode = self.mode.clone();
        let inbox = self.inbox.clone();
        self.spawn(async move {
            let ok = match client.probe().await {
                Ok(()) => {
                    mode.probe_succeeded();
                    true
                }
                Err(e) => {
                    log::warn!("Reconnect probe failed: {e}");
                    mode.probe_failed();
                    false
                }
            };
            inbox.borrow_mut().push_back(Completion::Probed(ok));
        });
    }

    /// Track a canvas resize; the character is pulled back inside
    pub fn resize(&mut self, width: f32, height: f32) {
        let field = Playfield::new(width, height, self.boundary_margin);
        self.session.playfield = field;
        self.session.kinematic.sanitize(&field);
        self.goals.resize(field);
    }

    /// Register a server-side character for a mock one created offline
    fn adopt_mock_character(&mut self) {
        if !self.character_is_mock || self.adopting {
            return;
        }
        self.adopting = true;
        let seq = self.next_seq();
        let spawn = self.session.kinematic.position;
        let client = self.client.clone();
        let mode = self.mode.clone();
        let inbox = self.inbox.clone();
        log::info!("Registering offline character with the authority");
        self.spawn(async move {
            let completion = match client.create_character(spawn).await {
                Ok(snapshot) => Completion::Created { seq, snapshot },
                Err(e) => {
                    mode.report_unreachable(&e);
                    Completion::CreateFailed { seq }
                }
            };
            inbox.borrow_mut().push_back(completion);
        });
    }

    fn create_mock_character(&mut self) {
        let id = mock_id(&mut self.rng);
        let spawn = self.spawn_point();
        self.session.kinematic = KinematicState {
            character_id: Some(id.clone()),
            position: spawn,
            ..KinematicState::default()
        };
        self.character_is_mock = true;
        log::info!("Mock character {id} created at ({}, {})", spawn.x, spawn.z);
        self.notify("Offline mode active");
    }

    // === Discrete intents ===

    /// Button/keyboard move. `direction` need not be normalized.
    pub fn move_direction(&mut self, direction: Vec3, speed: f32) {
        self.dispatch(Intent::Move {
            direction,
            speed,
            from_pointer: false,
        });
    }

    pub fn stop(&mut self) {
        self.session.pointer.active = false;
        self.session.kinematic = apply_stop(&self.session.kinematic);
        self.dispatch(Intent::Stop);
    }

    pub fn play_animation(&mut self, animation_id: &str) {
        self.session.kinematic.current_animation = Some(animation_id.to_string());
        self.dispatch(Intent::Animate(animation_id.to_string()));
    }

    fn dispatch(&mut self, intent: Intent) {
        let Some(id) = self.character_id() else {
            return;
        };
        if !self.authority_ready() {
            self.resolve_locally(&intent);
            return;
        }

        let seq = self.next_seq();
        let client = self.client.clone();
        let mode = self.mode.clone();
        let inbox = self.inbox.clone();
        self.spawn(async move {
            let result = match &intent {
                Intent::Move {
                    direction, speed, ..
                } => client.move_character(&id, *direction, *speed).await,
                Intent::Stop => client.stop(&id).await,
                Intent::Animate(animation) => client.animate(&id, animation, 1.0).await,
            };
            let completion = match result {
                Ok(snapshot) => Completion::Applied {
                    seq,
                    snapshot,
                    intent,
                },
                Err(e) => {
                    mode.report_unreachable(&e);
                    Completion::Failed { seq, intent }
                }
            };
            inbox.borrow_mut().push_back(completion);
        });
    }

    /// Compute an intent with the local physics
    fn resolve_locally(&mut self, intent: &Intent) {
        match intent {
            Intent::Move {
                direction,
                speed,
                from_pointer,
            } => {
                // Pointer moves are picked up by the offline magnet integrator instead
                if *from_pointer {
                    return;
                }
                let input = DirectionalInput::new(direction.x, direction.z, *speed);
                self.session.kinematic =
                    step_directional(&self.session.kinematic, &input, &self.env());
                log::debug!(
                    "Local move to ({:.1}, {:.1}) at speed {:.2}",
                    self.session.kinematic.position.x,
                    self.session.kinematic.position.z,
                    self.session.kinematic.speed
                );
                self.check_goal();
            }
            Intent::Stop => {
                self.session.kinematic = apply_stop(&self.session.kinematic);
                self.notify("Movement stopped");
            }
            Intent::Animate(animation) => {
                self.notify(format!("Animation: {animation}"));
            }
        }
    }

    /// Retire every other layer (best-effort), then activate `layer`
    pub fn switch_layer(&mut self, layer: Layer) {
        self.activate_layer(layer, true);
    }

    fn activate_layer(&mut self, layer: Layer, retire_others: bool) {
        if !self.mode.is_online() {
            self.apply_layer_locally(layer);
            return;
        }

        let seq = self.next_seq();
        let client = self.client.clone();
        let mode = self.mode.clone();
        let inbox = self.inbox.clone();
        self.spawn(async move {
            if retire_others {
                for other in layer.others() {
                    if !mode.is_online() {
                        break;
                    }
                    match client.remove_layer(other).await {
                        Ok(_) => {}
                        // The authority answered; a refused removal does not block the switch
                        Err(crate::error::Unreachable::Status { status }) => {
                            log::warn!("Removing {} answered HTTP {status}", other.class_name());
                        }
                        Err(e) => {
                            mode.report_unreachable(&e);
                        }
                    }
                }
            }

            let completion = if mode.is_online() {
                match client.set_layer(layer, LAYER_PRIORITY).await {
                    Ok(_) => Completion::LayerSet { seq, layer },
                    Err(e) => {
                        mode.report_unreachable(&e);
                        Completion::LayerFallback { seq, layer }
                    }
                }
            } else {
                Completion::LayerFallback { seq, layer }
            };
            inbox.borrow_mut().push_back(completion);
        });
    }

    fn apply_layer_locally(&mut self, layer: Layer) {
        let previous = self.session.layer;
        self.session.layer = layer;
        self.session.kinematic = apply_layer_change(&self.session.kinematic, layer);
        if previous != layer {
            log::info!("Layer {} -> {}", previous.class_name(), layer.class_name());
        }
        self.notify(format!("Layer changed: {}", layer.class_name()));
    }

    /// Only allowed while advanced walking is active
    pub fn set_gait(&mut self, gait: Gait) -> Result<(), UserActionRejected> {
        if self.session.layer != Layer::AdvancedWalking {
            let rejected = UserActionRejected::GaitRequiresAdvancedWalking;
            self.notices.push(Notice::Rejected(rejected));
            return Err(rejected);
        }
        self.session.gait = gait;
        self.notify(format!("Gait changed: {}", gait.as_str()));
        Ok(())
    }

    // === Pointer ===

    pub fn set_pointer_target(&mut self, x: f32, y: f32) {
        self.session.pointer = PointerTarget::at(x, y);
    }

    pub fn release_pointer(&mut self) {
        self.session.pointer.active = false;
    }

    // === Push channel ===

    /// Feed a push-channel event from the platform socket
    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        self.channel.observe(&event, self.now_ms);
        match event {
            ChannelEvent::Opened => {
                log::info!("Push channel open");
                self.mode.channel_opened();
            }
            ChannelEvent::Closed => {
                self.mode.channel_closed();
            }
            ChannelEvent::Error(e) => {
                log::error!("Push channel error: {e}");
                self.mode.channel_error();
            }
            ChannelEvent::Message(text) => match PushMessage::parse(&text) {
                Ok(message) => self.apply_push(message),
                Err(e) => log::warn!("Dropping push message: {e}"),
            },
        }
    }

    /// True when the host should open a new push socket
    pub fn take_reconnect_request(&mut self, now_ms: f64) -> bool {
        self.channel.poll_reconnect(now_ms)
    }

    /// The host failed to construct a socket
    pub fn channel_dial_failed(&mut self) {
        self.channel.dial_failed(self.now_ms);
        self.mode.channel_error();
    }

    fn apply_push(&mut self, message: PushMessage) {
        if self.session.kinematic.character_id.as_deref() != Some(message.character_id()) {
            log::trace!("Push message for another character ignored");
            return;
        }
        match message {
            PushMessage::PositionUpdate { position, .. } => {
                self.session.kinematic.position = Vec3::new(position.x, position.y, position.z);
                if let Some(problem) = self.session.kinematic.sanitize(&self.session.playfield) {
                    log::warn!("Push update: {problem}");
                }
                self.check_goal();
            }
            PushMessage::AnimationUpdate { animation_id, .. } => {
                if animation_id.is_some() {
                    self.session.kinematic.current_animation = animation_id;
                }
            }
            PushMessage::LayerUpdate { active_layer, .. } => match Layer::from_name(&active_layer) {
                Some(layer) => self.session.layer = layer,
                None => log::warn!("Unknown layer in push update: {active_layer}"),
            },
        }
    }

    // === Frame ===

    /// One animation frame: apply finished authority calls, then run the
    /// pointer pipeline and goal check
    pub fn frame(&mut self, dt: f32, now_ms: f64) {
        let dt = dt.clamp(0.0, 0.1);
        self.now_ms = now_ms;

        self.drain_completions();
        self.process_transitions();

        if self.session.kinematic.character_id.is_some() {
            if self.authority_ready() {
                self.drive_remote_magnet(now_ms);
            } else {
                let (next, pointer) =
                    step_magnet(&self.session.kinematic, &self.session.pointer, &self.env(), dt);
                self.session.kinematic = next;
                self.session.pointer = pointer;
            }
        }

        self.session.kinematic.settle();
        self.check_goal();
        self.session.clock += dt;
    }

    fn drive_remote_magnet(&mut self, now_ms: f64) {
        let pointer = self.session.pointer;
        if !pointer.active || self.magnet_in_flight {
            return;
        }
        if now_ms - self.last_magnet_ms < self.magnet_interval_ms {
            return;
        }

        let to_target = pointer.position() - self.session.kinematic.planar();
        let distance = to_target.length();
        if distance < SNAP_DISTANCE {
            self.session.pointer.active = false;
            return;
        }

        let dir = to_target / distance;
        self.last_magnet_ms = now_ms;
        self.magnet_in_flight = true;
        self.dispatch(Intent::Move {
            direction: Vec3::new(dir.x, 0.0, dir.y),
            speed: DEFAULT_SPEED,
            from_pointer: true,
        });
    }

    fn process_transitions(&mut self) {
        let mut went_online = false;
        for t in self.mode.take_transitions() {
            went_online |= t.to == Mode::Online;
            self.notices.push(Notice::ModeChanged(t.to));
        }
        if went_online && self.mode.is_online() {
            self.adopt_mock_character();
        }
    }

    fn drain_completions(&mut self) {
        let completions: Vec<_> = self.inbox.borrow_mut().drain(..).collect();
        for completion in completions {
            self.apply_completion(completion);
        }
    }

    fn apply_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Applied {
                seq,
                snapshot,
                intent,
            } => {
                self.clear_magnet_flag(&intent);
                self.apply_snapshot(seq, &snapshot);
            }
            Completion::Failed { seq, intent } => {
                self.clear_magnet_flag(&intent);
                if seq <= self.seq_floor {
                    return;
                }
                log::warn!("Recomputing {:?} locally", intent);
                self.resolve_locally(&intent);
            }
            Completion::Created { seq, snapshot } => {
                self.adopting = false;
                if self.apply_snapshot(seq, &snapshot) {
                    self.character_is_mock = false;
                    log::info!(
                        "Character {} created at ({}, {}, {})",
                        snapshot.character_id.as_deref().unwrap_or("?"),
                        snapshot.x,
                        snapshot.y,
                        snapshot.z
                    );
                    self.activate_layer(self.session.layer, false);
                }
            }
            Completion::CreateFailed { seq } => {
                self.adopting = false;
                if seq <= self.seq_floor || self.session.kinematic.character_id.is_some() {
                    return;
                }
                self.create_mock_character();
                self.activate_layer(self.session.layer, false);
            }
            Completion::LayerSet { seq, .. } | Completion::LayerFallback { seq, .. }
                if seq <= self.seq_floor =>
            {
                log::debug!("Dropping layer result from a previous game");
            }
            Completion::LayerSet { layer, .. } => {
                self.session.layer = layer;
                self.notify(format!("Layer changed: {}", layer.class_name()));
            }
            Completion::LayerFallback { layer, .. } => self.apply_layer_locally(layer),
            Completion::Probed(true) => self.notify("Connection established!"),
            Completion::Probed(false) => self.notify("Connection failed"),
        }
    }

    fn clear_magnet_flag(&mut self, intent: &Intent) {
        if let Intent::Move {
            from_pointer: true, ..
        } = intent
        {
            self.magnet_in_flight = false;
        }
    }

    /// Apply an authority snapshot unless a newer one already landed
    fn apply_snapshot(&mut self, seq: u64, snapshot: &CharacterSnapshot) -> bool {
        if seq <= self.last_applied_seq {
            log::debug!(
                "Discarding stale snapshot #{seq} (applied #{})",
                self.last_applied_seq
            );
            return false;
        }
        self.last_applied_seq = seq;
        snapshot.apply_to(&mut self.session.kinematic);
        if let Some(problem) = self.session.kinematic.sanitize(&self.session.playfield) {
            log::warn!("Authority snapshot: {problem}");
        }
        self.check_goal();
        true
    }

    fn check_goal(&mut self) {
        if self.session.kinematic.character_id.is_none() {
            return;
        }
        if self.goals.check_collision(self.session.kinematic.position).hit {
            self.notices.push(Notice::GoalReached {
                score: self.goals.score(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Method;
    use crate::net::mock::MockTransport;
    use futures::executor::LocalPool;
    use glam::Vec2;

    const DT: f32 = 1.0 / 60.0;

    struct Harness {
        pool: LocalPool,
        mock: Rc<MockTransport>,
        motion: MotionLoop,
        now: f64,
    }

    impl Harness {
        fn new(reachable: bool) -> Self {
            let pool = LocalPool::new();
            let mock = Rc::new(MockTransport::new());
            mock.set_reachable(reachable);
            let mut motion = MotionLoop::new(
                &Settings::default(),
                (600.0, 400.0),
                mock.clone(),
                Rc::new(pool.spawner()),
                42,
            );
            // Keep the goal out of the way of movement tests
            motion.goals.place(Vec2::new(550.0, 350.0));
            Self {
                pool,
                mock,
                motion,
                now: 0.0,
            }
        }

        fn started(reachable: bool) -> Self {
            let mut h = Self::new(reachable);
            h.motion.start();
            h.settle();
            h.motion.take_notices();
            h
        }

        /// Run tasks and frames until nothing is pending
        fn settle(&mut self) {
            for _ in 0..4 {
                self.pool.run_until_stalled();
                self.frame();
            }
        }

        fn frame(&mut self) {
            self.now += 1000.0 / 60.0;
            self.motion.frame(DT, self.now);
        }

        fn pos(&self) -> Vec3 {
            self.motion.session().kinematic.position
        }
    }

    #[test]
    fn test_start_online_creates_remote_character() {
        let h = Harness::started(true);
        let k = &h.motion.session().kinematic;
        assert_eq!(k.character_id.as_deref(), Some("srv-1"));
        assert_eq!(k.position, Vec3::new(300.0, 0.0, 200.0));
        assert!(h.motion.mode().is_online());
        assert!(!h.motion.character_is_mock());
        assert_eq!(h.mock.count(Method::Post, "/layers"), 1);
    }

    #[test]
    fn test_start_offline_creates_mock_character() {
        let mut h = Harness::new(false);
        h.motion.start();
        h.settle();
        let k = &h.motion.session().kinematic;
        assert!(k.character_id.as_deref().unwrap().starts_with("mock-"));
        assert_eq!(k.character_id.as_ref().unwrap().len(), 12);
        assert_eq!(k.position, Vec3::new(300.0, 0.0, 200.0));
        assert_eq!(h.motion.mode().mode(), Mode::Offline);
        assert_eq!(h.motion.mode().offline_flips(), 1);
        let notices = h.motion.take_notices();
        assert!(notices.contains(&Notice::ModeChanged(Mode::Offline)));
        assert!(notices.contains(&Notice::Info("Offline mode active".into())));
    }

    #[test]
    fn test_move_failure_recomputes_locally() {
        let mut h = Harness::started(true);
        h.mock.set_reachable(false);

        h.motion.move_direction(Vec3::new(1.0, 0.0, 0.0), 1.0);
        h.pool.run_until_stalled();
        assert_eq!(h.motion.mode().mode(), Mode::Offline);
        h.frame();

        assert_eq!(h.pos().x, 305.0);
        assert_eq!(h.motion.mode().offline_flips(), 1);
        // Replayed at the start of the frame, then decayed by the idle magnet
        let k = &h.motion.session().kinematic;
        assert!((k.speed - SPEED_RETENTION).abs() < 1e-6);
        assert!(k.is_moving);
    }

    #[test]
    fn test_frame_does_not_wait_for_authority() {
        let mut h = Harness::started(true);
        h.mock.hold();
        h.motion.move_direction(Vec3::new(0.0, 0.0, 1.0), 1.0);
        h.pool.run_until_stalled();
        h.frame();
        assert_eq!(h.pos().z, 200.0);

        h.mock.release();
        h.pool.run_until_stalled();
        assert_eq!(h.pos().z, 200.0);
        h.frame();
        assert_eq!(h.pos().z, 210.0);
    }

    #[test]
    fn test_stale_snapshot_is_discarded() {
        let mut h = Harness::started(true);
        let id = Some("srv-1".to_string());
        let snap = |x: f32| CharacterSnapshot {
            character_id: id.clone(),
            x,
            y: 0.0,
            z: 200.0,
            speed: 1.0,
            rotation_x: 0.0,
            rotation_y: 0.0,
            rotation_z: 0.0,
        };
        let base = h.motion.seq;
        let intent = || Intent::Move {
            direction: Vec3::X,
            speed: 1.0,
            from_pointer: false,
        };
        h.motion.inbox.borrow_mut().extend([
            Completion::Applied {
                seq: base + 2,
                snapshot: snap(400.0),
                intent: intent(),
            },
            Completion::Applied {
                seq: base + 1,
                snapshot: snap(350.0),
                intent: intent(),
            },
        ]);
        h.frame();
        assert_eq!(h.pos().x, 400.0);
    }

    #[test]
    fn test_late_snapshot_still_applies_after_offline_flip() {
        let mut h = Harness::started(true);
        h.mock.hold();
        h.motion.move_direction(Vec3::new(1.0, 0.0, 0.0), 1.0);
        h.pool.run_until_stalled();
        h.motion.handle_channel_event(ChannelEvent::Closed);
        assert_eq!(h.motion.mode().mode(), Mode::Offline);

        h.mock.release();
        h.pool.run_until_stalled();
        h.frame();
        assert_eq!(h.pos().x, 310.0);
    }

    #[test]
    fn test_sneaking_scenario() {
        let mut h = Harness::started(false);
        h.motion.switch_layer(Layer::AdvancedWalking);
        assert_eq!(h.motion.session().layer, Layer::AdvancedWalking);
        h.motion.set_gait(Gait::Sneaking).unwrap();
        h.motion.move_direction(Vec3::new(0.0, 0.0, 1.0), 1.0);
        let k = &h.motion.session().kinematic;
        assert!((k.speed - 0.6).abs() < 1e-6);
        assert!((k.position.z - 203.0).abs() < 1e-4);
    }

    #[test]
    fn test_gait_rejected_on_wrong_layer() {
        let mut h = Harness::started(false);
        let err = h.motion.set_gait(Gait::Limping).unwrap_err();
        assert_eq!(err, UserActionRejected::GaitRequiresAdvancedWalking);
        assert_eq!(h.motion.session().gait, Gait::Normal);
        assert_eq!(
            h.motion.take_notices(),
            vec![Notice::Rejected(UserActionRejected::GaitRequiresAdvancedWalking)]
        );
    }

    #[test]
    fn test_online_layer_switch_removes_then_adds() {
        let mut h = Harness::started(true);
        h.mock.fail_deletes(true);
        h.motion.switch_layer(Layer::Running);
        h.settle();

        assert_eq!(h.motion.session().layer, Layer::Running);
        assert!(h.motion.mode().is_online());
        assert_eq!(h.mock.count(Method::Delete, "/layers/"), 3);

        let calls = h.mock.calls();
        let last = calls.last().unwrap();
        assert_eq!(last.0, Method::Post);
        assert_eq!(last.1, "/layers");
        let deletes: Vec<_> = calls
            .iter()
            .filter(|(m, _, _)| *m == Method::Delete)
            .map(|(_, p, _)| p.clone())
            .collect();
        assert!(deletes.iter().all(|p| !p.ends_with("RunningLayer")));
    }

    #[test]
    fn test_layer_switch_survives_transport_failure() {
        let mut h = Harness::started(true);
        h.mock.set_reachable(false);
        h.motion.switch_layer(Layer::Idle);
        h.settle();

        assert_eq!(h.motion.session().layer, Layer::Idle);
        assert_eq!(h.motion.mode().mode(), Mode::Offline);
        assert_eq!(h.motion.mode().offline_flips(), 1);
        // Removal stops at the first failure, nothing else is attempted
        assert_eq!(h.mock.count(Method::Delete, "/layers/"), 1);
        assert_eq!(h.mock.count(Method::Post, "/layers"), 1);
    }

    #[test]
    fn test_idle_layer_freezes_local_moves() {
        let mut h = Harness::started(false);
        h.motion.switch_layer(Layer::Idle);
        let before = h.pos();
        h.motion.move_direction(Vec3::new(1.0, 0.0, 1.0), 3.0);
        assert_eq!(h.pos(), before);
        assert!(!h.motion.session().kinematic.is_moving);
    }

    #[test]
    fn test_push_updates_follow_character_id() {
        let mut h = Harness::started(true);
        h.motion.handle_channel_event(ChannelEvent::Message(
            r#"{"type":"POSITION_UPDATE","characterId":"other","position":{"x":50,"y":0,"z":50}}"#
                .into(),
        ));
        assert_eq!(h.pos(), Vec3::new(300.0, 0.0, 200.0));

        h.motion.handle_channel_event(ChannelEvent::Message(
            r#"{"type":"POSITION_UPDATE","characterId":"srv-1","position":{"x":50,"y":0,"z":9000}}"#
                .into(),
        ));
        assert_eq!(h.pos(), Vec3::new(50.0, 0.0, 380.0));

        h.motion.handle_channel_event(ChannelEvent::Message(
            r#"{"type":"LAYER_UPDATE","characterId":"srv-1","activeLayer":"com.example.motion.sys.behavior.RunningLayer"}"#
                .into(),
        ));
        assert_eq!(h.motion.session().layer, Layer::Running);

        h.motion.handle_channel_event(ChannelEvent::Message("{not json".into()));
        assert_eq!(h.motion.session().layer, Layer::Running);
    }

    #[test]
    fn test_push_animation_update_follows_character_id() {
        let mut h = Harness::started(true);
        h.motion.handle_channel_event(ChannelEvent::Message(
            r#"{"type":"ANIMATION_UPDATE","characterId":"other","animationId":"running","progress":0.2}"#
                .into(),
        ));
        assert_eq!(h.motion.session().kinematic.current_animation, None);

        h.motion.handle_channel_event(ChannelEvent::Message(
            r#"{"type":"ANIMATION_UPDATE","characterId":"srv-1","animationId":"basic_walk","progress":0.5}"#
                .into(),
        ));
        assert_eq!(
            h.motion.session().kinematic.current_animation.as_deref(),
            Some("basic_walk")
        );

        // An update without an animation id keeps the current one
        h.motion.handle_channel_event(ChannelEvent::Message(
            r#"{"type":"ANIMATION_UPDATE","characterId":"srv-1","progress":1.0}"#.into(),
        ));
        assert_eq!(
            h.motion.session().kinematic.current_animation.as_deref(),
            Some("basic_walk")
        );
    }

    #[test]
    fn test_push_position_scores_goal() {
        let mut h = Harness::started(true);
        h.motion.goals.place(Vec2::new(110.0, 105.0));
        h.motion.handle_channel_event(ChannelEvent::Message(
            r#"{"type":"POSITION_UPDATE","characterId":"srv-1","position":{"x":100,"y":0,"z":100}}"#
                .into(),
        ));
        assert_eq!(h.motion.score(), 10);
        assert!(
            h.motion
                .take_notices()
                .contains(&Notice::GoalReached { score: 10 })
        );
    }

    #[test]
    fn test_channel_lifecycle_drives_mode_and_reconnect() {
        let mut h = Harness::started(true);
        assert!(h.motion.take_reconnect_request(h.now));
        h.motion.handle_channel_event(ChannelEvent::Opened);
        assert!(h.motion.snapshot().channel_open);

        h.motion.handle_channel_event(ChannelEvent::Error("reset".into()));
        h.motion.handle_channel_event(ChannelEvent::Closed);
        assert_eq!(h.motion.mode().mode(), Mode::Offline);
        assert_eq!(h.motion.mode().offline_flips(), 1);

        assert!(!h.motion.take_reconnect_request(h.now + 2000.0));
        assert!(h.motion.take_reconnect_request(h.now + 3000.0));
        h.motion.handle_channel_event(ChannelEvent::Opened);
        assert!(h.motion.mode().is_online());
    }

    #[test]
    fn test_offline_magnet_follows_pointer() {
        let mut h = Harness::started(false);
        h.motion.set_pointer_target(400.0, 200.0);
        for _ in 0..2000 {
            h.frame();
            if !h.motion.session().pointer.active {
                break;
            }
        }
        assert!(!h.motion.session().pointer.active);
        assert!((h.pos().x - 400.0).abs() < SNAP_DISTANCE + 1.0);

        for _ in 0..400 {
            h.frame();
        }
        let k = &h.motion.session().kinematic;
        assert_eq!(k.speed, 0.0);
        assert!(!k.is_moving);
    }

    #[test]
    fn test_online_magnet_throttles_remote_moves() {
        let mut h = Harness::started(true);
        h.mock.hold();
        h.motion.set_pointer_target(500.0, 200.0);
        for _ in 0..10 {
            h.frame();
            h.pool.run_until_stalled();
        }
        assert_eq!(h.mock.count(Method::Post, "/characters/srv-1/move"), 1);

        h.mock.release();
        h.pool.run_until_stalled();
        h.frame();
        assert!(h.pos().x > 300.0);
        for _ in 0..2 {
            h.frame();
            h.pool.run_until_stalled();
        }
        assert_eq!(h.mock.count(Method::Post, "/characters/srv-1/move"), 2);
    }

    #[test]
    fn test_frame_goal_collision_replaces_goal() {
        let mut h = Harness::started(false);
        let p = h.pos();
        h.motion.goals.place(Vec2::new(p.x + 10.0, p.z + 5.0));
        let goal_id = h.motion.goal().id;
        h.frame();
        assert_eq!(h.motion.score(), 10);
        assert_ne!(h.motion.goal().id, goal_id);
    }

    #[test]
    fn test_stop_clears_motion_immediately() {
        let mut h = Harness::started(true);
        h.motion.move_direction(Vec3::X, 1.0);
        h.settle();
        assert!(h.motion.session().kinematic.is_moving);

        h.motion.stop();
        let k = &h.motion.session().kinematic;
        assert!(!k.is_moving);
        assert_eq!(k.speed, 0.0);
        h.settle();
        assert!(!h.motion.session().kinematic.is_moving);
        assert_eq!(h.mock.count(Method::Post, "/characters/srv-1/stop"), 1);
    }

    #[test]
    fn test_new_game_resets_score_and_character() {
        let mut h = Harness::started(true);
        h.motion.goals.place(Vec2::new(300.0, 200.0));
        h.frame();
        assert_eq!(h.motion.score(), 10);

        h.motion.new_game();
        assert_eq!(h.motion.score(), 0);
        assert!(h.motion.session().kinematic.character_id.is_none());
        h.settle();
        assert_eq!(
            h.motion.session().kinematic.character_id.as_deref(),
            Some("srv-2")
        );
    }

    #[test]
    fn test_reconnect_adopts_mock_character() {
        let mut h = Harness::started(false);
        h.motion.move_direction(Vec3::X, 1.0);
        assert_eq!(h.pos().x, 305.0);

        h.mock.set_reachable(true);
        h.motion.reconnect();
        h.settle();

        assert!(h.motion.mode().is_online());
        assert!(!h.motion.character_is_mock());
        assert_eq!(
            h.motion.session().kinematic.character_id.as_deref(),
            Some("srv-1")
        );
        assert_eq!(h.pos().x, 305.0);
        assert!(
            h.motion
                .take_notices()
                .contains(&Notice::Info("Connection established!".into()))
        );
    }

    #[test]
    fn test_adoption_keeps_mock_id_off_the_wire() {
        let mut h = Harness::started(false);
        h.motion.set_pointer_target(500.0, 200.0);
        h.frame();

        h.mock.set_reachable(true);
        h.motion.handle_channel_event(ChannelEvent::Opened);
        // Discrete moves before the server id lands stay local too
        h.motion.move_direction(Vec3::new(0.0, 0.0, 1.0), 1.0);
        h.settle();

        assert!(h.motion.mode().is_online());
        assert_eq!(h.motion.mode().offline_flips(), 1);
        assert!(!h.motion.character_is_mock());
        assert_eq!(
            h.motion.session().kinematic.character_id.as_deref(),
            Some("srv-1")
        );
        assert_eq!(h.mock.count(Method::Post, "/characters/mock-"), 0);
        assert!(h.mock.count(Method::Post, "/characters/srv-1/move") >= 1);
    }

    #[test]
    fn test_layer_result_from_previous_game_is_dropped() {
        let mut h = Harness::started(true);
        h.mock.hold();
        h.motion.switch_layer(Layer::Running);
        h.pool.run_until_stalled();

        h.motion.new_game();
        h.mock.release();
        h.settle();

        assert_eq!(h.motion.session().layer, Layer::BasicWalking);
        assert_eq!(
            h.motion.session().kinematic.character_id.as_deref(),
            Some("srv-2")
        );
    }

    #[test]
    fn test_intents_without_character_are_ignored() {
        let mut h = Harness::new(true);
        h.motion.move_direction(Vec3::X, 1.0);
        h.motion.play_animation("basic_walk");
        h.pool.run_until_stalled();
        assert!(h.mock.calls().is_empty());
    }

    #[test]
    fn test_resize_reclamps_character() {
        let mut h = Harness::started(false);
        h.motion.resize(200.0, 150.0);
        let p = h.pos();
        assert_eq!(p.x, 180.0);
        assert_eq!(p.z, 130.0);
    }

    #[test]
    fn test_snapshot_reports_walking() {
        let mut h = Harness::started(false);
        h.motion.move_direction(Vec3::X, 1.0);
        let snap = h.motion.snapshot();
        assert!(snap.walking);
        assert_eq!(snap.mode, Mode::Offline);
        assert_eq!(snap.layer, Layer::BasicWalking);
    }
}
