//! Remote authority plumbing
//!
//! - `authority`: REST client and the `Transport` seam
//! - `http`: reqwest transport
//! - `wire`: JSON request/response/push shapes
//! - `channel`: push channel lifecycle supervision

pub mod authority;
pub mod channel;
pub mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod wire;

pub use authority::{AuthorityClient, Method, Reply, Transport};
pub use channel::{ChannelEvent, ChannelState, ChannelSupervisor, push_url};
pub use http::HttpTransport;
pub use wire::{Ack, CharacterSnapshot, PushMessage};
