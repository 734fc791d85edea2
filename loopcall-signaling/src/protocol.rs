//! Signaling protocol messages

use chrono::{DateTime, Utc};
use loopcall_core::{IceCandidate, Role, SessionDescription};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload exchanged between the two endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalingMessage {
    /// Session offer
    Offer {
        /// Offer description
        description: SessionDescription,
    },
    /// Session answer
    Answer {
        /// Answer description
        description: SessionDescription,
    },
    /// Connectivity candidate
    Candidate {
        /// Candidate to ingest
        candidate: IceCandidate,
    },
}

impl SignalingMessage {
    /// Get the message type as a string
    pub fn message_type(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::Candidate { .. } => "candidate",
        }
    }

    /// Description carried by an offer or answer
    pub fn description(&self) -> Option<&SessionDescription> {
        match self {
            SignalingMessage::Offer { description } | SignalingMessage::Answer { description } => {
                Some(description)
            }
            SignalingMessage::Candidate { .. } => None,
        }
    }
}

/// One delivered message with routing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingEnvelope {
    /// Envelope ID
    pub id: Uuid,
    /// Delivery time
    pub sent_at: DateTime<Utc>,
    /// Sending role
    pub from: Role,
    /// Receiving role
    pub to: Role,
    /// Payload
    pub message: SignalingMessage,
}

impl SignalingEnvelope {
    /// Wrap `message` sent from `from` to its peer
    pub fn new(from: Role, message: SignalingMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            sent_at: Utc::now(),
            from,
            to: from.peer(),
            message,
        }
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse from JSON text
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
