//! Serializable snapshots of call state

use chrono::{DateTime, Utc};
use loopcall_core::{ConnectionEndpoint, NegotiationState, Role, TrackInfo, TrackKind};
use loopcall_media::{StreamInfo, StreamRegistry};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// One sender of an endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SenderReport {
    /// Sender ID
    pub sender_id: Uuid,
    /// Kind it transmits
    pub kind: TrackKind,
    /// Track currently transmitted
    pub track: Option<TrackInfo>,
}

/// Negotiation and sender state of one endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EndpointReport {
    /// Endpoint role
    pub role: Role,
    /// Negotiation state
    pub negotiation_state: NegotiationState,
    /// Whether a local description is set
    pub has_local_description: bool,
    /// Whether a remote description is set
    pub has_remote_description: bool,
    /// Candidates waiting for the remote description
    pub queued_candidates: usize,
    /// Distinct candidates handed to the transport
    pub applied_candidates: usize,
    /// Senders in creation order
    pub senders: Vec<SenderReport>,
}

impl EndpointReport {
    /// Capture the current state of `endpoint`
    pub async fn capture(endpoint: &ConnectionEndpoint) -> Self {
        let senders = endpoint
            .senders()
            .into_iter()
            .map(|sender| SenderReport {
                sender_id: sender.id,
                kind: sender.kind,
                track: endpoint.sender_track(&sender).map(|track| track.info()),
            })
            .collect();

        Self {
            role: endpoint.role(),
            negotiation_state: endpoint.negotiation_state(),
            has_local_description: endpoint.local_description().await.is_some(),
            has_remote_description: endpoint.remote_description().await.is_some(),
            queued_candidates: endpoint.queued_candidate_count().await,
            applied_candidates: endpoint.applied_candidate_count().await,
            senders,
        }
    }
}

/// Full call snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CallReport {
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
    /// Both endpoints, caller first
    pub endpoints: Vec<EndpointReport>,
    /// All four streams
    pub streams: Vec<StreamInfo>,
    /// Number of signaling messages delivered
    pub signaling_messages: usize,
}

impl CallReport {
    /// Assemble a report from endpoint snapshots and the stream registry
    pub fn new(endpoints: Vec<EndpointReport>, registry: &StreamRegistry, signaling_messages: usize) -> Self {
        let streams = registry
            .streams()
            .iter()
            .map(|stream| stream.snapshot().info())
            .collect();

        debug!(endpoints = endpoints.len(), "📊 Call report generated");
        Self {
            generated_at: Utc::now(),
            endpoints,
            streams,
            signaling_messages,
        }
    }

    /// Report for one endpoint
    pub fn endpoint(&self, role: Role) -> Option<&EndpointReport> {
        self.endpoints.iter().find(|report| report.role == role)
    }

    /// Whether both endpoints reached `stable`
    pub fn is_stable(&self) -> bool {
        !self.endpoints.is_empty()
            && self
                .endpoints
                .iter()
                .all(|report| report.negotiation_state == NegotiationState::Stable)
    }

    /// Pretty-printed JSON
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
