//! Motion Master entry point
//!
//! Handles platform-specific initialization and runs the frame loop.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::RefCell;
    use std::f64::consts::TAU;
    use std::rc::Rc;

    use glam::Vec3;
    use wasm_bindgen::prelude::*;
    use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, KeyboardEvent, PointerEvent};

    use motion_master::consts::*;
    use motion_master::net::{HttpTransport, push_url};
    use motion_master::platform::{self, EventQueue, PushSocket, WasmSpawner};
    use motion_master::sim::{Gait, Layer};
    use motion_master::{FrameSnapshot, Mode, MotionLoop, Notice, Settings};

    /// How long a notice stays on screen
    const NOTICE_MS: f64 = 2500.0;

    /// Host-side state around the engine
    struct Game {
        motion: MotionLoop,
        settings: Settings,
        ctx: Option<CanvasRenderingContext2d>,
        events: EventQueue,
        socket: Option<PushSocket>,
        last_time: f64,
        notice: Option<(String, f64)>,
    }

    impl Game {
        fn new(settings: Settings, extent: (f32, f32), seed: u64) -> Self {
            let base = match platform::page_origin() {
                Some(origin) => settings.resolve_api_base(&origin),
                None => settings.api_base_url.clone(),
            };
            log::info!("Authority at {base}");
            let motion = MotionLoop::new(
                &settings,
                extent,
                Rc::new(HttpTransport::new(base)),
                Rc::new(WasmSpawner),
                seed,
            );
            Self {
                motion,
                settings,
                ctx: None,
                events: platform::event_queue(),
                socket: None,
                last_time: 0.0,
                notice: None,
            }
        }

        /// Feed socket events to the engine and redial when it asks
        fn pump_channel(&mut self, now: f64) {
            let events: Vec<_> = self.events.borrow_mut().drain(..).collect();
            for event in events {
                self.motion.handle_channel_event(event);
            }

            if self.motion.take_reconnect_request(now) {
                self.socket = None;
                let Some((host, secure)) = platform::page_host() else {
                    self.motion.channel_dial_failed();
                    return;
                };
                let url = push_url(&host, secure, &self.settings.push_path);
                match PushSocket::connect(&url, self.events.clone()) {
                    Ok(socket) => self.socket = Some(socket),
                    Err(e) => {
                        log::warn!("Push channel dial failed: {:?}", e);
                        self.motion.channel_dial_failed();
                    }
                }
            }
        }

        fn update(&mut self, dt: f32, now: f64) {
            self.pump_channel(now);
            self.motion.frame(dt, now);

            for notice in self.motion.take_notices() {
                if let Notice::GoalReached { .. } = notice {
                    log::info!("{}", notice.message());
                }
                self.notice = Some((notice.message(), now + NOTICE_MS));
            }
            if matches!(self.notice, Some((_, until)) if now > until) {
                self.notice = None;
            }
        }

        /// Plain canvas drawing of the frame snapshot
        fn render(&self, snap: &FrameSnapshot) {
            let Some(ctx) = &self.ctx else {
                return;
            };
            let field = self.motion.session().playfield;
            ctx.clear_rect(0.0, 0.0, field.width as f64, field.height as f64);

            // Goal
            ctx.begin_path();
            ctx.set_fill_style_str("rgba(255, 200, 60, 0.8)");
            let _ = ctx.arc(
                snap.goal.position.x as f64,
                snap.goal.position.y as f64,
                GOAL_RADIUS as f64,
                0.0,
                TAU,
            );
            ctx.fill();

            // Pointer
            if snap.pointer.active {
                ctx.begin_path();
                ctx.set_stroke_style_str("rgba(120, 200, 255, 0.6)");
                let _ = ctx.arc(snap.pointer.x as f64, snap.pointer.y as f64, 8.0, 0.0, TAU);
                ctx.stroke();
            }

            // Character, with the bob exaggerated into screen space
            let k = &snap.kinematic;
            let x = k.position.x as f64;
            let y = (k.position.z - k.position.y * 100.0) as f64;
            ctx.begin_path();
            ctx.set_fill_style_str(match snap.mode {
                Mode::Online => "#4caf50",
                Mode::Offline => "#ff9800",
            });
            let _ = ctx.arc(x, y, 15.0, 0.0, TAU);
            ctx.fill();

            let yaw = (k.rotation.y as f64).to_radians();
            ctx.begin_path();
            ctx.set_stroke_style_str("#ffffff");
            ctx.set_line_width(2.0);
            ctx.move_to(x, y);
            ctx.line_to(x + yaw.sin() * 22.0, y + yaw.cos() * 22.0);
            ctx.stroke();
        }

        /// Update HUD elements in DOM
        fn update_hud(&self, snap: &FrameSnapshot) {
            let Some(document) = web_sys::window().and_then(|w| w.document()) else {
                return;
            };

            let set = |selector: &str, text: &str| {
                if let Some(el) = document.query_selector(selector).ok().flatten() {
                    el.set_text_content(Some(text));
                }
            };

            set("#hud-score .hud-value", &snap.score.to_string());
            set(
                "#hud-mode .hud-value",
                match snap.mode {
                    Mode::Online => "Online",
                    Mode::Offline => "Offline",
                },
            );
            set("#hud-layer .hud-value", snap.layer.class_name());
            set("#hud-gait .hud-value", snap.gait.as_str());
            set(
                "#hud-position .hud-value",
                &format!(
                    "{:.0}, {:.0}",
                    snap.kinematic.position.x, snap.kinematic.position.z
                ),
            );
            set("#hud-speed .hud-value", &format!("{:.2}", snap.kinematic.speed));

            if let Some(el) = document.get_element_by_id("notice") {
                match &self.notice {
                    Some((text, _)) => {
                        el.set_text_content(Some(text));
                        let _ = el.set_attribute("class", "");
                    }
                    None => {
                        let _ = el.set_attribute("class", "hidden");
                    }
                }
            }
        }
    }

    pub async fn run() {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).expect("Failed to init logger");

        log::info!("Motion Master starting...");

        let window = web_sys::window().expect("no window");
        let document = window.document().expect("no document");

        // Hide loading indicator
        if let Some(loading) = document.get_element_by_id("loading") {
            let _ = loading.set_attribute("class", "hidden");
        }

        let canvas: HtmlCanvasElement = document
            .get_element_by_id("canvas")
            .expect("no canvas")
            .dyn_into()
            .expect("not a canvas");

        let width = canvas.client_width().max(1) as u32;
        let height = canvas.client_height().max(1) as u32;
        canvas.set_width(width);
        canvas.set_height(height);

        let seed = js_sys::Date::now() as u64;
        let settings = Settings::load();
        let game = Rc::new(RefCell::new(Game::new(
            settings,
            (width as f32, height as f32),
            seed,
        )));

        let ctx = canvas
            .get_context("2d")
            .ok()
            .flatten()
            .and_then(|c| c.dyn_into::<CanvasRenderingContext2d>().ok());
        if ctx.is_none() {
            log::warn!("No 2D context, running without drawing");
        }
        game.borrow_mut().ctx = ctx;

        log::info!("Game initialized with seed: {}", seed);

        setup_input_handlers(&canvas, game.clone());
        setup_buttons(game.clone());
        setup_resize(&canvas, game.clone());

        game.borrow_mut().motion.start();

        if let Some(hud) = document.get_element_by_id("hud") {
            let _ = hud.set_attribute("class", "");
        }

        request_animation_frame(game);

        log::info!("Motion Master running!");
    }

    fn setup_input_handlers(canvas: &HtmlCanvasElement, game: Rc<RefCell<Game>>) {
        // Pointer move - magnet target follows the pointer
        {
            let game = game.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: PointerEvent| {
                game.borrow_mut()
                    .motion
                    .set_pointer_target(event.offset_x() as f32, event.offset_y() as f32);
            });
            let _ = canvas
                .add_event_listener_with_callback("pointermove", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Pointer leave - stop attracting
        {
            let game = game.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: PointerEvent| {
                game.borrow_mut().motion.release_pointer();
            });
            let _ = canvas
                .add_event_listener_with_callback("pointerleave", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Keyboard
        {
            let Some(window) = web_sys::window() else {
                return;
            };
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                let mut g = game.borrow_mut();
                let direction = match event.key().as_str() {
                    "ArrowUp" | "w" | "W" => Some(Vec3::new(0.0, 0.0, -1.0)),
                    "ArrowDown" | "s" | "S" => Some(Vec3::new(0.0, 0.0, 1.0)),
                    "ArrowLeft" | "a" | "A" => Some(Vec3::new(-1.0, 0.0, 0.0)),
                    "ArrowRight" | "d" | "D" => Some(Vec3::new(1.0, 0.0, 0.0)),
                    _ => None,
                };
                if let Some(direction) = direction {
                    event.prevent_default();
                    g.motion.move_direction(direction, DEFAULT_SPEED);
                    return;
                }
                match event.key().as_str() {
                    " " => {
                        event.prevent_default();
                        g.motion.stop();
                    }
                    "1" => g.motion.switch_layer(Layer::BasicWalking),
                    "2" => g.motion.switch_layer(Layer::Running),
                    "3" => g.motion.switch_layer(Layer::Idle),
                    "4" => g.motion.switch_layer(Layer::AdvancedWalking),
                    "g" | "G" => g.motion.next_goal(),
                    _ => {}
                }
            });
            let _ = window
                .add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    /// Wire a button id to an engine action
    fn on_click(game: &Rc<RefCell<Game>>, id: &str, action: impl Fn(&mut Game) + 'static) {
        let Some(btn) = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id(id))
        else {
            return;
        };
        let game = game.clone();
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::MouseEvent| {
            action(&mut game.borrow_mut());
        });
        let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn setup_buttons(game: Rc<RefCell<Game>>) {
        let moves = [
            ("btn-up", Vec3::new(0.0, 0.0, -1.0)),
            ("btn-down", Vec3::new(0.0, 0.0, 1.0)),
            ("btn-left", Vec3::new(-1.0, 0.0, 0.0)),
            ("btn-right", Vec3::new(1.0, 0.0, 0.0)),
        ];
        for (id, direction) in moves {
            on_click(&game, id, move |g| {
                g.motion.move_direction(direction, DEFAULT_SPEED)
            });
        }
        on_click(&game, "btn-stop", |g| g.motion.stop());

        for layer in Layer::ALL {
            let id = format!("layer-{}", layer.class_name());
            on_click(&game, &id, move |g| g.motion.switch_layer(layer));
        }
        for gait in [Gait::Normal, Gait::Sneaking, Gait::Limping] {
            let id = format!("gait-{}", gait.as_str().to_lowercase());
            on_click(&game, &id, move |g| {
                // Rejections surface through the notice queue
                let _ = g.motion.set_gait(gait);
            });
        }
        for animation in ["basic_walk", "running", "idle"] {
            let id = format!("anim-{animation}");
            on_click(&game, &id, move |g| g.motion.play_animation(animation));
        }

        on_click(&game, "btn-next-goal", |g| g.motion.next_goal());
        on_click(&game, "btn-new-game", |g| {
            g.motion.new_game();
            log::info!("New game started");
        });
        on_click(&game, "btn-reconnect", |g| g.motion.reconnect());
    }

    fn setup_resize(canvas: &HtmlCanvasElement, game: Rc<RefCell<Game>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let canvas = canvas.clone();
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
            let width = canvas.client_width().max(1) as u32;
            let height = canvas.client_height().max(1) as u32;
            canvas.set_width(width);
            canvas.set_height(height);
            game.borrow_mut().motion.resize(width as f32, height as f32);
        });
        let _ = window.add_event_listener_with_callback("resize", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn request_animation_frame(game: Rc<RefCell<Game>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::once(move |time: f64| {
            game_loop(game, time);
        });
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn game_loop(game: Rc<RefCell<Game>>, time: f64) {
        {
            let mut g = game.borrow_mut();

            let dt = if g.last_time > 0.0 {
                ((time - g.last_time) / 1000.0) as f32
            } else {
                1.0 / REFERENCE_FPS
            };
            g.last_time = time;

            g.update(dt, time);
            let snap = g.motion.snapshot();
            g.render(&snap);
            g.update_hud(&snap);
        }

        request_animation_frame(game);
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    wasm_game::run().await;
}

#[cfg(not(target_arch = "wasm32"))]
mod headless {
    use std::rc::Rc;
    use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

    use motion_master::consts::*;
    use motion_master::net::HttpTransport;
    use motion_master::platform::TokioSpawner;
    use motion_master::{MotionLoop, Notice, Settings};

    const FRAMES: u32 = 60 * 30;

    /// Chase goals with the magnet for a fixed number of frames
    pub async fn run() {
        let settings = Settings::load();
        let base = std::env::var("MOTION_MASTER_API")
            .unwrap_or_else(|_| settings.resolve_api_base("http://localhost:8080"));
        log::info!("Authority at {base}");

        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let mut motion = MotionLoop::new(
            &settings,
            (DEFAULT_EXTENT_X, DEFAULT_EXTENT_Y),
            Rc::new(HttpTransport::new(base)),
            Rc::new(TokioSpawner),
            seed,
        );
        motion.start();

        let started = Instant::now();
        let mut ticker = tokio::time::interval(Duration::from_millis(16));
        for _ in 0..FRAMES {
            ticker.tick().await;
            let goal = motion.goal();
            motion.set_pointer_target(goal.position.x, goal.position.y);
            motion.frame(1.0 / REFERENCE_FPS, started.elapsed().as_secs_f64() * 1000.0);

            for notice in motion.take_notices() {
                match notice {
                    Notice::GoalReached { .. } => log::info!("{}", notice.message()),
                    _ => log::debug!("{}", notice.message()),
                }
            }
        }

        let k = &motion.session().kinematic;
        log::info!(
            "Finished: score {}, {:?} mode, character at ({:.0}, {:.0})",
            motion.score(),
            motion.mode().mode(),
            k.position.x,
            k.position.z
        );
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Motion Master (native, headless) starting...");

    let local = tokio::task::LocalSet::new();
    local.run_until(headless::run()).await;
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}
