//! Configuration types and defaults

use loopcall_core::{CallError, CallResult, EndpointConfig, TrackKind};
use serde::{Deserialize, Serialize};

/// Call-wide configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallConfig {
    /// Connectivity settings shared by both endpoints
    #[serde(default)]
    pub endpoint: EndpointConfig,
    /// Install the tracing subscriber on init
    #[serde(default)]
    pub debug_logging: bool,
    /// Report every relayed candidate on the call event stream
    #[serde(default)]
    pub candidate_events: bool,
}

impl CallConfig {
    /// No external servers; host candidates only
    pub fn local_only() -> Self {
        Self {
            endpoint: EndpointConfig::local_only(),
            ..Self::default()
        }
    }

    /// Load and validate configuration from JSON text
    pub fn from_json(json: &str) -> CallResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| CallError::Configuration {
            field: "json".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> CallResult<()> {
        self.endpoint.validate()
    }
}

/// Devices one role captures from; `None` means the platform default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelection {
    /// Microphone device id
    #[serde(default)]
    pub audio: Option<String>,
    /// Camera device id
    #[serde(default)]
    pub video: Option<String>,
}

impl DeviceSelection {
    /// Platform defaults for both kinds
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this microphone
    pub fn microphone(mut self, device_id: &str) -> Self {
        self.audio = Some(device_id.to_string());
        self
    }

    /// Use this camera
    pub fn camera(mut self, device_id: &str) -> Self {
        self.video = Some(device_id.to_string());
        self
    }

    /// Selected device for `kind`
    pub fn device(&self, kind: TrackKind) -> Option<&str> {
        match kind {
            TrackKind::Audio => self.audio.as_deref(),
            TrackKind::Video => self.video.as_deref(),
        }
    }
}
