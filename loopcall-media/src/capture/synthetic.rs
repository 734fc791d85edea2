//! Deterministic in-memory capture backend
//!
//! Serves configurable device lists, can be told to deny access, lose devices
//! or report them busy, and counts the tracks it has handed out that are
//! still live. Device labels stay hidden until a capture request has been
//! granted once, as on real platforms.

use super::{CaptureBackend, CaptureConstraints, DeviceConstraint};
use crate::devices::MediaDevice;
use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use loopcall_core::{MediaTrack, TrackKind};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct SyntheticState {
    devices: Vec<MediaDevice>,
    access_denied: bool,
    busy: HashSet<String>,
    labels_revealed: bool,
    companion_tracks: bool,
}

/// In-memory capture backend
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    state: Arc<Mutex<SyntheticState>>,
    live: Arc<AtomicUsize>,
    sessions: Arc<AtomicUsize>,
}

impl SyntheticCapture {
    /// Backend serving `devices`
    pub fn new(devices: Vec<MediaDevice>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SyntheticState {
                devices,
                ..SyntheticState::default()
            })),
            live: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Two microphones and three cameras
    pub fn with_default_devices() -> Self {
        Self::new(vec![
            MediaDevice::new("mic-1", TrackKind::Audio, "Microphone 1"),
            MediaDevice::new("mic-2", TrackKind::Audio, "Microphone 2"),
            MediaDevice::new("cam-1", TrackKind::Video, "Camera 1"),
            MediaDevice::new("cam-2", TrackKind::Video, "Camera 2"),
            MediaDevice::new("cam-3", TrackKind::Video, "Camera 3"),
        ])
    }

    /// Refuse every capture request
    pub fn deny_access(&self, denied: bool) {
        self.state.lock().access_denied = denied;
    }

    /// Plug in a device
    pub fn add_device(&self, device: MediaDevice) {
        self.state.lock().devices.push(device);
    }

    /// Unplug a device; returns whether it existed
    pub fn remove_device(&self, device_id: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.devices.len();
        state.devices.retain(|device| device.id != device_id);
        state.devices.len() != before
    }

    /// Mark a device as held by another application
    pub fn set_busy(&self, device_id: &str, busy: bool) {
        let mut state = self.state.lock();
        if busy {
            state.busy.insert(device_id.to_string());
        } else {
            state.busy.remove(device_id);
        }
    }

    /// Also return a default track of every kind that was not requested
    pub fn set_companion_tracks(&self, enabled: bool) {
        self.state.lock().companion_tracks = enabled;
    }

    /// Tracks handed out and not stopped yet
    pub fn live_track_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Capture sessions opened so far, granted or not
    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    fn resolve<'a>(
        state: &'a SyntheticState,
        kind: TrackKind,
        constraint: &DeviceConstraint,
    ) -> MediaResult<&'a MediaDevice> {
        let device = match constraint {
            DeviceConstraint::Any => state
                .devices
                .iter()
                .find(|device| device.kind == kind)
                .ok_or(MediaError::NoDeviceForKind { kind })?,
            DeviceConstraint::Exact(id) => state
                .devices
                .iter()
                .find(|device| device.kind == kind && &device.id == id)
                .ok_or_else(|| MediaError::DeviceNotFound {
                    device_id: id.clone(),
                })?,
        };

        if state.busy.contains(&device.id) {
            return Err(MediaError::DeviceBusy {
                device_id: device.id.clone(),
            });
        }
        Ok(device)
    }

    fn open(&self, device: &MediaDevice) -> MediaTrack {
        self.live.fetch_add(1, Ordering::SeqCst);
        let live = self.live.clone();
        MediaTrack::capture_with_release(device.kind, device.id.clone(), device.label.clone(), move || {
            live.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::with_default_devices()
    }
}

#[async_trait]
impl CaptureBackend for SyntheticCapture {
    async fn request_access(&self, constraints: &CaptureConstraints) -> MediaResult<Vec<MediaTrack>> {
        tokio::task::yield_now().await;
        self.sessions.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if state.access_denied {
            return Err(MediaError::PermissionDenied {
                operation: "capture".to_string(),
            });
        }
        if constraints.audio.is_none() && constraints.video.is_none() {
            return Err(MediaError::InvalidConstraints {
                message: "at least one of audio or video must be requested".to_string(),
            });
        }

        let mut tracks = Vec::new();
        for kind in TrackKind::ALL {
            let constraint = match constraints.get(kind) {
                Some(constraint) => constraint.clone(),
                None if state.companion_tracks => DeviceConstraint::Any,
                None => continue,
            };

            match Self::resolve(&state, kind, &constraint) {
                Ok(device) => tracks.push(self.open(device)),
                Err(_) if constraints.get(kind).is_none() => {}
                Err(e) => {
                    for track in &tracks {
                        track.stop();
                    }
                    return Err(e);
                }
            }
        }

        state.labels_revealed = true;
        debug!(count = tracks.len(), "Synthetic capture session opened");
        Ok(tracks)
    }

    async fn list_devices(&self) -> MediaResult<Vec<MediaDevice>> {
        tokio::task::yield_now().await;
        let state = self.state.lock();
        Ok(state
            .devices
            .iter()
            .map(|device| {
                if state.labels_revealed {
                    device.clone()
                } else {
                    MediaDevice::new(device.id.clone(), device.kind, "")
                }
            })
            .collect())
    }
}
