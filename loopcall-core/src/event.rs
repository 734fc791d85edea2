//! Events raised by a connection endpoint and its transport

use crate::negotiation::{IceCandidate, NegotiationState};
use crate::track::MediaTrack;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Connectivity state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connectivity checks yet
    New,
    /// Candidate pairs are being checked
    Checking,
    /// Media can flow
    Connected,
    /// Transport released
    Closed,
}

/// Events emitted by one endpoint, in emission order
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    /// A local connectivity candidate was gathered and should be relayed
    CandidateDiscovered {
        /// The gathered candidate
        candidate: IceCandidate,
    },
    /// Candidate gathering finished
    GatheringComplete,
    /// The peer started sending a track
    TrackReceived {
        /// Inbound track, owned by whoever installs it
        track: MediaTrack,
    },
    /// Transport connectivity changed
    ConnectionStateChanged {
        /// New connection state
        state: ConnectionState,
    },
    /// Negotiation state changed
    NegotiationStateChanged {
        /// New negotiation state
        state: NegotiationState,
    },
    /// Senders changed after the first negotiation
    NegotiationNeeded,
}

impl EndpointEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            EndpointEvent::CandidateDiscovered { .. } => "candidate_discovered",
            EndpointEvent::GatheringComplete => "gathering_complete",
            EndpointEvent::TrackReceived { .. } => "track_received",
            EndpointEvent::ConnectionStateChanged { .. } => "connection_state_changed",
            EndpointEvent::NegotiationStateChanged { .. } => "negotiation_state_changed",
            EndpointEvent::NegotiationNeeded => "negotiation_needed",
        }
    }

    /// Check if this is a candidate-related event
    pub fn is_candidate_event(&self) -> bool {
        matches!(
            self,
            EndpointEvent::CandidateDiscovered { .. } | EndpointEvent::GatheringComplete
        )
    }
}

/// Sending half used by transports and endpoints
pub type EventSender = mpsc::UnboundedSender<EndpointEvent>;

/// Stream of endpoint events for async iteration
#[derive(Debug)]
pub struct EndpointEvents {
    receiver: mpsc::UnboundedReceiver<EndpointEvent>,
}

impl EndpointEvents {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<EndpointEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<EndpointEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<EndpointEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = EndpointEvents::new(rx);

        tx.send(EndpointEvent::CandidateDiscovered {
            candidate: IceCandidate::new("candidate:1 1 udp 1 127.0.0.1 5000 typ host"),
        })
        .unwrap();
        tx.send(EndpointEvent::GatheringComplete).unwrap();

        let first = events.next().await.unwrap();
        assert_eq!(first.event_type(), "candidate_discovered");
        assert!(first.is_candidate_event());
        let second = events.next().await.unwrap();
        assert_eq!(second.event_type(), "gathering_complete");
        assert!(second.is_candidate_event());
        assert!(!EndpointEvent::NegotiationNeeded.is_candidate_event());
        assert!(events.try_next().unwrap().is_none());

        drop(tx);
        assert!(events.try_next().is_err());
    }
}
