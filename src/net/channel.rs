//! Push channel lifecycle
//!
//! The socket itself is platform code. This supervisor only tracks its
//! lifecycle and decides when the host should dial again: a fixed delay after
//! every close, with no retry limit.

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Closed,
    Error(String),
    Message(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelState {
    /// Not connected; dial once `retry_at_ms` has passed
    Disconnected { retry_at_ms: f64 },
    Connecting,
    Open,
}

#[derive(Debug, Clone)]
pub struct ChannelSupervisor {
    state: ChannelState,
    reconnect_delay_ms: f64,
    attempts: u64,
}

impl ChannelSupervisor {
    pub fn new(reconnect_delay_ms: f64) -> Self {
        Self {
            state: ChannelState::Disconnected { retry_at_ms: 0.0 },
            reconnect_delay_ms,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// Number of dials handed out so far
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Track a lifecycle event. Messages do not change state.
    pub fn observe(&mut self, event: &ChannelEvent, now_ms: f64) {
        match event {
            ChannelEvent::Opened => self.state = ChannelState::Open,
            ChannelEvent::Closed => {
                self.state = ChannelState::Disconnected {
                    retry_at_ms: now_ms + self.reconnect_delay_ms,
                };
                log::info!(
                    "Push channel closed, reconnecting in {:.0} ms",
                    self.reconnect_delay_ms
                );
            }
            // A close always follows an error; that is where the retry is scheduled
            ChannelEvent::Error(_) | ChannelEvent::Message(_) => {}
        }
    }

    /// True when the host should open a new socket now
    pub fn poll_reconnect(&mut self, now_ms: f64) -> bool {
        match self.state {
            ChannelState::Disconnected { retry_at_ms } if now_ms >= retry_at_ms => {
                self.state = ChannelState::Connecting;
                self.attempts += 1;
                true
            }
            _ => false,
        }
    }

    /// The host could not even construct a socket
    pub fn dial_failed(&mut self, now_ms: f64) {
        self.observe(&ChannelEvent::Closed, now_ms);
    }
}

/// WebSocket URL for the push channel on `host`
pub fn push_url(host: &str, secure: bool, path: &str) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_dials() {
        let mut s = ChannelSupervisor::new(3000.0);
        assert!(s.poll_reconnect(0.0));
        assert_eq!(s.state(), ChannelState::Connecting);
        assert!(!s.poll_reconnect(1.0));
    }

    #[test]
    fn test_reconnect_after_fixed_delay_forever() {
        let mut s = ChannelSupervisor::new(3000.0);
        let mut now = 0.0;
        assert!(s.poll_reconnect(now));
        for _ in 0..50 {
            s.observe(&ChannelEvent::Error("boom".into()), now);
            s.observe(&ChannelEvent::Closed, now);
            assert!(!s.poll_reconnect(now + 2999.0));
            now += 3000.0;
            assert!(s.poll_reconnect(now));
        }
        assert_eq!(s.attempts(), 51);
    }

    #[test]
    fn test_open_stops_dialing() {
        let mut s = ChannelSupervisor::new(3000.0);
        s.poll_reconnect(0.0);
        s.observe(&ChannelEvent::Opened, 10.0);
        assert!(s.is_open());
        assert!(!s.poll_reconnect(1.0e9));
    }

    #[test]
    fn test_push_url() {
        assert_eq!(
            push_url("localhost:8080", false, "/motion-updates"),
            "ws://localhost:8080/motion-updates"
        );
        assert_eq!(push_url("game.example", true, "/ws"), "wss://game.example/ws");
    }
}
