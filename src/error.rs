//! Error taxonomy
//!
//! Nothing here is fatal. `Unreachable` flips the engine offline,
//! `InvalidState` is repaired in place, `UserActionRejected` becomes a notice.

use thiserror::Error;

/// The remote authority could not produce a usable answer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unreachable {
    /// Network or transport layer failure
    #[error("transport failure: {0}")]
    Transport(String),
    /// The authority answered with a non-success status
    #[error("authority answered HTTP {status}")]
    Status { status: u16 },
    /// The response body could not be decoded
    #[error("undecodable response: {0}")]
    Decode(String),
}

/// Local state found in a shape the engine cannot integrate from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidState {
    #[error("character position is not finite")]
    NonFinitePosition,
    #[error("no character has been assigned yet")]
    MissingCharacter,
}

/// A user request that is refused without changing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UserActionRejected {
    #[error("gaits are only available on the advanced walking layer")]
    GaitRequiresAdvancedWalking,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings are not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}
