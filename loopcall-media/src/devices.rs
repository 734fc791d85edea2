//! Capture device enumeration

use crate::capture::{CaptureBackend, CaptureConstraints};
use loopcall_core::{CallResult, TrackKind};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Capture device as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDevice {
    /// Opaque device identifier
    pub id: String,
    /// Kind of media the device captures
    pub kind: TrackKind,
    /// Display label; empty until capture access was granted
    pub label: String,
}

impl MediaDevice {
    /// Create a device descriptor
    pub fn new(id: impl Into<String>, kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
        }
    }
}

/// Immutable device snapshot, in catalog order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    devices: Vec<MediaDevice>,
}

impl DeviceList {
    /// Wrap a device snapshot
    pub fn new(devices: Vec<MediaDevice>) -> Self {
        Self { devices }
    }

    /// All devices
    pub fn all(&self) -> &[MediaDevice] {
        &self.devices
    }

    /// Devices of one kind
    pub fn of_kind(&self, kind: TrackKind) -> impl Iterator<Item = &MediaDevice> {
        self.devices.iter().filter(move |device| device.kind == kind)
    }

    /// Microphones
    pub fn audio_inputs(&self) -> Vec<&MediaDevice> {
        self.of_kind(TrackKind::Audio).collect()
    }

    /// Cameras
    pub fn video_inputs(&self) -> Vec<&MediaDevice> {
        self.of_kind(TrackKind::Video).collect()
    }

    /// Look a device up by id
    pub fn find(&self, id: &str) -> Option<&MediaDevice> {
        self.devices.iter().find(|device| device.id == id)
    }

    /// First device of `kind`
    pub fn default_for(&self, kind: TrackKind) -> Option<&MediaDevice> {
        self.of_kind(kind).next()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no devices were found
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Enumerates capture devices through a [`CaptureBackend`]
pub struct DeviceCatalog {
    backend: Arc<dyn CaptureBackend>,
    last: RwLock<Option<DeviceList>>,
}

impl DeviceCatalog {
    /// Catalog over `backend`
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            last: RwLock::new(None),
        }
    }

    /// Probe capture access, then list devices.
    ///
    /// The probe opens a combined audio and video session and stops it right
    /// away; it only exists to make the platform reveal device labels.
    pub async fn enumerate(&self) -> CallResult<DeviceList> {
        let probe = self
            .backend
            .request_access(&CaptureConstraints::probe())
            .await
            .map_err(|e| {
                warn!("Capture probe refused: {}", e);
                e.into_capture_error()
            })?;
        for track in probe {
            track.stop();
        }

        let devices = self
            .backend
            .list_devices()
            .await
            .map_err(|e| e.into_capture_error())?;
        let list = DeviceList::new(devices);

        info!(
            audio = list.audio_inputs().len(),
            video = list.video_inputs().len(),
            "🎛️ Enumerated capture devices"
        );
        *self.last.write() = Some(list.clone());
        Ok(list)
    }

    /// Result of the last successful enumeration
    pub fn last_snapshot(&self) -> Option<DeviceList> {
        self.last.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> DeviceList {
        DeviceList::new(vec![
            MediaDevice::new("mic-1", TrackKind::Audio, "Microphone 1"),
            MediaDevice::new("cam-1", TrackKind::Video, "Camera 1"),
            MediaDevice::new("cam-2", TrackKind::Video, "Camera 2"),
        ])
    }

    #[test]
    fn test_partition_by_kind() {
        let list = list();
        assert_eq!(list.audio_inputs().len(), 1);
        assert_eq!(list.video_inputs().len(), 2);
        assert_eq!(list.default_for(TrackKind::Video).unwrap().id, "cam-1");
        assert_eq!(list.find("cam-2").unwrap().label, "Camera 2");
        assert!(list.find("cam-9").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_string(&list().all()[0]).unwrap();
        assert_eq!(json, r#"{"id":"mic-1","kind":"audio","label":"Microphone 1"}"#);
    }
}
