//! Per-role stream slots
//!
//! Every role has a local (outgoing) and a remote (incoming) [`RoleStream`].
//! Each stream holds at most one track per kind. Installing a track into an
//! occupied slot stops the previous occupant and swaps in the new one inside
//! a single critical section, and publishes the resulting [`StreamSnapshot`]
//! to watchers before the lock is released.

use loopcall_core::{ConnectionEndpoint, Direction, MediaTrack, Role, Sender, TrackInfo, TrackKind};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Default)]
struct Slots {
    audio: Option<MediaTrack>,
    video: Option<MediaTrack>,
}

impl Slots {
    fn slot(&mut self, kind: TrackKind) -> &mut Option<MediaTrack> {
        match kind {
            TrackKind::Audio => &mut self.audio,
            TrackKind::Video => &mut self.video,
        }
    }
}

/// Immutable view of one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    /// Owning role
    pub role: Role,
    /// Local or remote stream
    pub direction: Direction,
    /// Audio slot
    pub audio: Option<MediaTrack>,
    /// Video slot
    pub video: Option<MediaTrack>,
}

impl StreamSnapshot {
    fn empty(role: Role, direction: Direction) -> Self {
        Self {
            role,
            direction,
            audio: None,
            video: None,
        }
    }

    /// Track in the slot for `kind`
    pub fn track(&self, kind: TrackKind) -> Option<&MediaTrack> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    /// Whether both slots are filled
    pub fn is_complete(&self) -> bool {
        self.audio.is_some() && self.video.is_some()
    }

    /// Occupied slots, audio first
    pub fn tracks(&self) -> Vec<&MediaTrack> {
        self.audio.iter().chain(self.video.iter()).collect()
    }

    /// First kind without a track
    pub fn missing(&self) -> Option<TrackKind> {
        TrackKind::ALL.into_iter().find(|kind| self.track(*kind).is_none())
    }

    /// Serializable description
    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            role: self.role,
            direction: self.direction,
            tracks: self.tracks().into_iter().map(MediaTrack::info).collect(),
        }
    }
}

/// Serializable description of a stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// Owning role
    pub role: Role,
    /// Local or remote stream
    pub direction: Direction,
    /// Tracks in the stream
    pub tracks: Vec<TrackInfo>,
}

/// One role's stream in one direction
#[derive(Debug)]
pub struct RoleStream {
    role: Role,
    direction: Direction,
    slots: Mutex<Slots>,
    published: watch::Sender<StreamSnapshot>,
}

impl RoleStream {
    /// Empty stream
    pub fn new(role: Role, direction: Direction) -> Self {
        let (published, _) = watch::channel(StreamSnapshot::empty(role, direction));
        Self {
            role,
            direction,
            slots: Mutex::new(Slots::default()),
            published,
        }
    }

    /// Owning role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Local or remote
    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn publish(&self, slots: &Slots) {
        self.published.send_replace(StreamSnapshot {
            role: self.role,
            direction: self.direction,
            audio: slots.audio.clone(),
            video: slots.video.clone(),
        });
    }

    /// Put `track` into its kind's slot, stopping whatever was there.
    ///
    /// Returns `false` if `track` already occupies the slot.
    pub fn install(&self, track: MediaTrack) -> bool {
        let kind = track.kind();
        let mut slots = self.slots.lock();
        let slot = slots.slot(kind);

        if slot.as_ref().map_or(false, |current| current.same_track(&track)) {
            return false;
        }
        if let Some(previous) = slot.take() {
            previous.stop();
        }
        debug!(
            role = %self.role,
            direction = %self.direction,
            kind = %kind,
            device = ?track.device_id(),
            "Installed {} track",
            kind
        );
        *slot = Some(track);
        self.publish(&slots);
        true
    }

    /// Stop and remove the track of `kind`
    pub fn remove(&self, kind: TrackKind) -> Option<MediaTrack> {
        let mut slots = self.slots.lock();
        let removed = slots.slot(kind).take()?;
        removed.stop();
        self.publish(&slots);
        Some(removed)
    }

    /// Stop and remove every track
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        let mut changed = false;
        for kind in TrackKind::ALL {
            if let Some(track) = slots.slot(kind).take() {
                track.stop();
                changed = true;
            }
        }
        if changed {
            self.publish(&slots);
        }
    }

    /// Current contents
    pub fn snapshot(&self) -> StreamSnapshot {
        self.published.borrow().clone()
    }

    /// Track in the slot for `kind`
    pub fn track(&self, kind: TrackKind) -> Option<MediaTrack> {
        self.snapshot().track(kind).cloned()
    }

    /// Whether both slots are filled
    pub fn is_complete(&self) -> bool {
        self.snapshot().is_complete()
    }

    /// Observe every slot change
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.published.subscribe()
    }
}

/// The four streams of a call
#[derive(Debug)]
pub struct StreamRegistry {
    caller_local: Arc<RoleStream>,
    caller_remote: Arc<RoleStream>,
    callee_local: Arc<RoleStream>,
    callee_remote: Arc<RoleStream>,
}

impl StreamRegistry {
    /// Empty streams for both roles
    pub fn new() -> Self {
        Self {
            caller_local: Arc::new(RoleStream::new(Role::Caller, Direction::Local)),
            caller_remote: Arc::new(RoleStream::new(Role::Caller, Direction::Remote)),
            callee_local: Arc::new(RoleStream::new(Role::Callee, Direction::Local)),
            callee_remote: Arc::new(RoleStream::new(Role::Callee, Direction::Remote)),
        }
    }

    /// Stream of `role` in `direction`
    pub fn stream(&self, role: Role, direction: Direction) -> &Arc<RoleStream> {
        match (role, direction) {
            (Role::Caller, Direction::Local) => &self.caller_local,
            (Role::Caller, Direction::Remote) => &self.caller_remote,
            (Role::Callee, Direction::Local) => &self.callee_local,
            (Role::Callee, Direction::Remote) => &self.callee_remote,
        }
    }

    /// Install `track` into the stream of `role` in `direction`
    pub fn install(&self, role: Role, direction: Direction, track: MediaTrack) -> bool {
        self.stream(role, direction).install(track)
    }

    /// Outgoing sender of `endpoint` for `kind`, for the replace path
    pub fn current_sender(&self, endpoint: &ConnectionEndpoint, kind: TrackKind) -> Option<Sender> {
        endpoint.sender_for(kind)
    }

    /// Every stream, caller first, local before remote
    pub fn streams(&self) -> [&Arc<RoleStream>; 4] {
        [
            &self.caller_local,
            &self.caller_remote,
            &self.callee_local,
            &self.callee_remote,
        ]
    }

    /// Stop and remove every track of every stream
    pub fn clear(&self) {
        for stream in self.streams() {
            stream.clear();
        }
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
