//! Live track acquisition

use crate::capture::{CaptureBackend, CaptureConstraints};
use crate::error::MediaError;
use loopcall_core::{CallResult, MediaTrack, TrackKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Requests one live track at a time from the capture subsystem
#[derive(Clone)]
pub struct TrackFactory {
    backend: Arc<dyn CaptureBackend>,
}

impl TrackFactory {
    /// Factory over `backend`
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self { backend }
    }

    /// Acquire a track of `kind`, from `device_id` or the platform default.
    ///
    /// Every call opens its own capture session. Tracks of other kinds that
    /// the backend hands back are stopped immediately. The caller owns the
    /// returned track and must stop it unless it installs it somewhere.
    pub async fn acquire(&self, kind: TrackKind, device_id: Option<&str>) -> CallResult<MediaTrack> {
        let tracks = self
            .backend
            .request_access(&CaptureConstraints::for_kind(kind, device_id))
            .await
            .map_err(|e| {
                warn!(kind = %kind, device = ?device_id, "Track acquisition failed: {}", e);
                e.into_device_error(kind, device_id)
            })?;

        let mut acquired = None;
        for track in tracks {
            if track.kind() == kind && acquired.is_none() {
                acquired = Some(track);
            } else {
                debug!(kind = %track.kind(), "Stopping unrequested track");
                track.stop();
            }
        }

        let track = acquired
            .ok_or_else(|| MediaError::NoDeviceForKind { kind }.into_device_error(kind, device_id))?;
        debug!(kind = %kind, device = ?track.device_id(), "🎥 Acquired {} track", kind);
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticCapture;
    use loopcall_core::CallError;

    #[tokio::test]
    async fn test_acquire_named_device() {
        let capture = SyntheticCapture::with_default_devices();
        let factory = TrackFactory::new(Arc::new(capture.clone()));

        let track = factory.acquire(TrackKind::Video, Some("cam-2")).await.unwrap();
        assert_eq!(track.kind(), TrackKind::Video);
        assert_eq!(track.device_id(), Some("cam-2"));
        assert_eq!(capture.live_track_count(), 1);
    }

    #[tokio::test]
    async fn test_acquire_default_device() {
        let factory = TrackFactory::new(Arc::new(SyntheticCapture::with_default_devices()));
        let track = factory.acquire(TrackKind::Audio, None).await.unwrap();
        assert_eq!(track.device_id(), Some("mic-1"));
    }

    #[tokio::test]
    async fn test_unrequested_tracks_are_stopped() {
        let capture = SyntheticCapture::with_default_devices();
        capture.set_companion_tracks(true);
        let factory = TrackFactory::new(Arc::new(capture.clone()));

        let track = factory.acquire(TrackKind::Audio, Some("mic-2")).await.unwrap();
        assert_eq!(track.kind(), TrackKind::Audio);
        assert_eq!(capture.live_track_count(), 1);
    }

    #[tokio::test]
    async fn test_removed_device_is_unavailable() {
        let capture = SyntheticCapture::with_default_devices();
        assert!(capture.remove_device("cam-3"));
        let factory = TrackFactory::new(Arc::new(capture));

        let error = factory.acquire(TrackKind::Video, Some("cam-3")).await.unwrap_err();
        assert!(matches!(
            error,
            CallError::DeviceUnavailable { ref device_id, kind: TrackKind::Video, .. } if device_id == "cam-3"
        ));
    }
}
