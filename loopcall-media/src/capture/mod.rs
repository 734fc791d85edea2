//! Capture subsystem seam
//!
//! A [`CaptureBackend`] turns device constraints into live tracks and lists the
//! devices it knows about. The rest of the crate only ever talks to this trait.

pub mod synthetic;

pub use synthetic::SyntheticCapture;

use crate::devices::MediaDevice;
use crate::error::MediaResult;
use async_trait::async_trait;
use loopcall_core::{MediaTrack, TrackKind};

/// Device requirement for one kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceConstraint {
    /// Platform default device
    Any,
    /// This device or nothing
    Exact(String),
}

/// Which kinds to capture and from which devices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Audio requirement; `None` captures no audio
    pub audio: Option<DeviceConstraint>,
    /// Video requirement; `None` captures no video
    pub video: Option<DeviceConstraint>,
}

impl CaptureConstraints {
    /// Default audio and video devices, used to reveal device labels
    pub fn probe() -> Self {
        Self {
            audio: Some(DeviceConstraint::Any),
            video: Some(DeviceConstraint::Any),
        }
    }

    /// Single kind, optionally pinned to a device
    pub fn for_kind(kind: TrackKind, device_id: Option<&str>) -> Self {
        let constraint = match device_id {
            Some(id) => DeviceConstraint::Exact(id.to_string()),
            None => DeviceConstraint::Any,
        };
        match kind {
            TrackKind::Audio => Self {
                audio: Some(constraint),
                video: None,
            },
            TrackKind::Video => Self {
                audio: None,
                video: Some(constraint),
            },
        }
    }

    /// Requirement for `kind`
    pub fn get(&self, kind: TrackKind) -> Option<&DeviceConstraint> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }
}

/// Platform capture subsystem
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Open a fresh capture session and return its live tracks
    async fn request_access(&self, constraints: &CaptureConstraints) -> MediaResult<Vec<MediaTrack>>;

    /// Devices currently known to the platform
    async fn list_devices(&self) -> MediaResult<Vec<MediaDevice>>;
}
