//! Live media track handles
//!
//! A [`MediaTrack`] is a cheap, cloneable handle to one capture or receive
//! stream. Cloning does not duplicate the underlying stream; every clone refers
//! to the same track and observes the same stop state. Whoever holds the slot in
//! a stream registry is responsible for stopping it; other holders (such as a
//! sender on a connection endpoint) only reference it.

use crate::types::{Role, TrackKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Where a track's media comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "lowercase")]
pub enum TrackOrigin {
    /// Captured locally from a device
    Capture {
        /// Capture device identifier
        device_id: String,
    },
    /// Received from the remote peer
    Remote {
        /// Role that sends the media
        peer: Role,
        /// Device the peer captures from, when known
        device_id: Option<String>,
    },
}

struct TrackInner {
    id: Uuid,
    kind: TrackKind,
    label: String,
    origin: TrackOrigin,
    stopped: AtomicBool,
    release: Mutex<Option<ReleaseHook>>,
}

/// Handle to a live capture or receive stream of one kind
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    fn build(kind: TrackKind, label: String, origin: TrackOrigin, release: Option<ReleaseHook>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4(),
                kind,
                label,
                origin,
                stopped: AtomicBool::new(false),
                release: Mutex::new(release),
            }),
        }
    }

    /// Create a track captured from a local device
    pub fn capture(kind: TrackKind, device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::build(
            kind,
            label.into(),
            TrackOrigin::Capture {
                device_id: device_id.into(),
            },
            None,
        )
    }

    /// Create a captured track whose device session is released by `release`
    /// when the track is stopped
    pub fn capture_with_release<F>(
        kind: TrackKind,
        device_id: impl Into<String>,
        label: impl Into<String>,
        release: F,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::build(
            kind,
            label.into(),
            TrackOrigin::Capture {
                device_id: device_id.into(),
            },
            Some(Box::new(release)),
        )
    }

    /// Create the receive-side counterpart of a track sent by `peer`
    pub fn remote(peer: Role, source: &MediaTrack) -> Self {
        Self::build(
            source.kind(),
            format!("remote {}", source.label()),
            TrackOrigin::Remote {
                peer,
                device_id: source.device_id().map(str::to_string),
            },
            None,
        )
    }

    /// Get track ID
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Get track kind
    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// Get display label
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Get track origin
    pub fn origin(&self) -> &TrackOrigin {
        &self.inner.origin
    }

    /// Capture device the media originates from, local or remote
    pub fn device_id(&self) -> Option<&str> {
        match &self.inner.origin {
            TrackOrigin::Capture { device_id } => Some(device_id),
            TrackOrigin::Remote { device_id, .. } => device_id.as_deref(),
        }
    }

    /// Whether this track was received from the peer
    pub fn is_remote(&self) -> bool {
        matches!(self.inner.origin, TrackOrigin::Remote { .. })
    }

    /// Whether the track has not been stopped yet
    pub fn is_live(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stop the track and release its device session.
    ///
    /// Returns `true` only for the call that actually stopped it; stopping an
    /// already stopped track does nothing.
    pub fn stop(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(release) = self.inner.release.lock().take() {
            release();
        }
        debug!(track_id = %self.inner.id, kind = %self.inner.kind, "⏹️ Stopped track {}", self.inner.label);
        true
    }

    /// Whether both handles refer to the same track
    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Serializable description of the track
    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            id: self.id(),
            kind: self.kind(),
            label: self.label().to_string(),
            origin: self.origin().clone(),
            live: self.is_live(),
        }
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.same_track(other)
    }
}

impl Eq for MediaTrack {}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("origin", &self.inner.origin)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Snapshot of a track for reports and presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Track ID
    pub id: Uuid,
    /// Track kind
    pub kind: TrackKind,
    /// Display label
    pub label: String,
    /// Where the media comes from
    #[serde(flatten)]
    pub origin: TrackOrigin,
    /// Whether the track was still live when the snapshot was taken
    pub live: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_stop_runs_release_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let track = MediaTrack::capture_with_release(TrackKind::Video, "cam-1", "Camera 1", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let clone = track.clone();

        assert!(track.is_live());
        assert!(clone.stop());
        assert!(!track.stop());
        assert!(!track.is_live());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remote_track_keeps_source_device() {
        let local = MediaTrack::capture(TrackKind::Audio, "mic-2", "Microphone 2");
        let remote = MediaTrack::remote(Role::Callee, &local);

        assert!(remote.is_remote());
        assert_eq!(remote.kind(), TrackKind::Audio);
        assert_eq!(remote.device_id(), Some("mic-2"));
        assert!(!remote.same_track(&local));
        assert_ne!(remote.id(), local.id());
    }

    #[test]
    fn test_equality_is_identity() {
        let a = MediaTrack::capture(TrackKind::Video, "cam-1", "Camera 1");
        let b = MediaTrack::capture(TrackKind::Video, "cam-1", "Camera 1");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
