//! Platform glue
//!
//! Handles browser/native differences for:
//! - Running authority tasks (`spawn_local` on the page, tokio `LocalSet` natively)
//! - The push channel socket (WebSocket on web)
//! - Page origin lookup for relative API roots

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::net::ChannelEvent;

/// Socket callbacks push here; the host drains it once per frame
pub type EventQueue = Rc<RefCell<VecDeque<ChannelEvent>>>;

pub fn event_queue() -> EventQueue {
    Rc::new(RefCell::new(VecDeque::new()))
}

#[cfg(target_arch = "wasm32")]
mod web {
    use wasm_bindgen::prelude::*;
    use web_sys::{BinaryType, CloseEvent, Event, MessageEvent, WebSocket};

    use super::EventQueue;
    use crate::motion::{LocalTask, Spawn};
    use crate::net::ChannelEvent;

    /// Runs tasks on the browser microtask queue
    pub struct WasmSpawner;

    impl Spawn for WasmSpawner {
        fn spawn(&self, task: LocalTask) {
            wasm_bindgen_futures::spawn_local(task);
        }
    }

    /// `http://host:port` of the current page
    pub fn page_origin() -> Option<String> {
        web_sys::window()?.location().origin().ok()
    }

    /// Page host and whether it was served over TLS
    pub fn page_host() -> Option<(String, bool)> {
        let location = web_sys::window()?.location();
        let host = location.host().ok()?;
        let secure = location.protocol().ok()? == "https:";
        Some((host, secure))
    }

    /// One WebSocket connection feeding the event queue.
    /// Dropping it detaches the handlers and closes the socket.
    pub struct PushSocket {
        socket: WebSocket,
        _on_open: Closure<dyn FnMut(Event)>,
        _on_message: Closure<dyn FnMut(MessageEvent)>,
        _on_error: Closure<dyn FnMut(Event)>,
        _on_close: Closure<dyn FnMut(CloseEvent)>,
    }

    impl PushSocket {
        pub fn connect(url: &str, queue: EventQueue) -> Result<Self, JsValue> {
            let socket = WebSocket::new(url)?;
            socket.set_binary_type(BinaryType::Arraybuffer);

            let q = queue.clone();
            let on_open = Closure::<dyn FnMut(_)>::new(move |_event: Event| {
                q.borrow_mut().push_back(ChannelEvent::Opened);
            });
            socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));

            let q = queue.clone();
            let on_message = Closure::<dyn FnMut(_)>::new(move |event: MessageEvent| {
                match event.data().as_string() {
                    Some(text) => q.borrow_mut().push_back(ChannelEvent::Message(text)),
                    None => log::debug!("Ignoring binary push frame"),
                }
            });
            socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

            let q = queue.clone();
            let on_error = Closure::<dyn FnMut(_)>::new(move |_event: Event| {
                q.borrow_mut()
                    .push_back(ChannelEvent::Error("WebSocket error".to_string()));
            });
            socket.set_onerror(Some(on_error.as_ref().unchecked_ref()));

            let q = queue;
            let on_close = Closure::<dyn FnMut(_)>::new(move |event: CloseEvent| {
                log::debug!("Push socket closed (code {})", event.code());
                q.borrow_mut().push_back(ChannelEvent::Closed);
            });
            socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

            log::info!("Dialing push channel {url}");
            Ok(Self {
                socket,
                _on_open: on_open,
                _on_message: on_message,
                _on_error: on_error,
                _on_close: on_close,
            })
        }
    }

    impl Drop for PushSocket {
        fn drop(&mut self) {
            self.socket.set_onopen(None);
            self.socket.set_onmessage(None);
            self.socket.set_onerror(None);
            self.socket.set_onclose(None);
            let _ = self.socket.close();
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::{PushSocket, WasmSpawner, page_host, page_origin};

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use crate::motion::{LocalTask, Spawn};

    /// Spawns onto the enclosing `tokio::task::LocalSet`
    pub struct TokioSpawner;

    impl Spawn for TokioSpawner {
        fn spawn(&self, task: LocalTask) {
            tokio::task::spawn_local(task);
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::TokioSpawner;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_queue_is_shared() {
        let queue = event_queue();
        let writer = queue.clone();
        writer.borrow_mut().push_back(ChannelEvent::Opened);
        writer
            .borrow_mut()
            .push_back(ChannelEvent::Message("{}".into()));
        let drained: Vec<_> = queue.borrow_mut().drain(..).collect();
        assert_eq!(
            drained,
            vec![ChannelEvent::Opened, ChannelEvent::Message("{}".into())]
        );
    }
}
