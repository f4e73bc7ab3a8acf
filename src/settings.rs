//! Engine configuration
//!
//! Read from LocalStorage on the web; native builds use defaults.

use serde::{Deserialize, Serialize};

use crate::consts::{BOUNDARY_MARGIN, GOAL_PADDING};
use crate::error::SettingsError;

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Remote authority ===
    /// REST root; relative values are resolved against the page origin
    pub api_base_url: String,
    /// Push channel path on the page host
    pub push_path: String,
    /// Namespace that prefixes layer class names on the wire
    pub layer_namespace: String,
    /// Delay before redialing a closed push channel
    pub reconnect_delay_ms: f64,
    /// Minimum gap between pointer-follow moves sent to the authority
    pub remote_magnet_interval_ms: f64,

    // === Playfield ===
    pub boundary_margin: f32,
    pub goal_padding: f32,

    // === Determinism ===
    /// Fixed goal RNG seed; `None` seeds from the clock
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "/api/v1".to_string(),
            push_path: "/motion-updates".to_string(),
            layer_namespace: "com.example.motion.sys.behavior".to_string(),
            reconnect_delay_ms: 3000.0,
            remote_magnet_interval_ms: 50.0,

            boundary_margin: BOUNDARY_MARGIN,
            goal_padding: GOAL_PADDING,

            seed: None,
        }
    }
}

impl Settings {
    /// Parse settings JSON; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Absolute API root for `origin` (e.g. `http://localhost:8080`)
    pub fn resolve_api_base(&self, origin: &str) -> String {
        if self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://") {
            self.api_base_url.clone()
        } else {
            format!("{}{}", origin.trim_end_matches('/'), self.api_base_url)
        }
    }

    /// LocalStorage key
    #[cfg(target_arch = "wasm32")]
    const STORAGE_KEY: &'static str = "motion_master_settings";

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match Self::from_json(&json) {
                    Ok(settings) => {
                        log::info!("Loaded settings from LocalStorage");
                        return settings;
                    }
                    Err(e) => log::warn!("Ignoring stored settings: {e}"),
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Native builds run on defaults
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        Self::default()
    }
}
