//! Participant roles, track kinds and stream directions

use serde::{Deserialize, Serialize};

/// One of the two call participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Participant that places the call and sends the first offer
    Caller,
    /// Participant that answers
    Callee,
}

impl Role {
    /// Both roles, caller first
    pub const ALL: [Role; 2] = [Role::Caller, Role::Callee];

    /// The other participant
    pub fn peer(self) -> Role {
        match self {
            Role::Caller => Role::Callee,
            Role::Callee => Role::Caller,
        }
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Caller => "caller",
            Role::Callee => "callee",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl TrackKind {
    /// Both kinds, audio first
    pub const ALL: [TrackKind; 2] = [TrackKind::Audio, TrackKind::Video];

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of a role's two streams is meant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Outgoing tracks captured by this role
    Local,
    /// Incoming tracks received from the peer
    Remote,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Local => write!(f, "local"),
            Direction::Remote => write!(f, "remote"),
        }
    }
}
