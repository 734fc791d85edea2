//! Event system for call-level events

use loopcall_core::{ConnectionState, NegotiationState, Role, TrackKind};
use loopcall_signaling::RelayOutcome;
use tokio::sync::mpsc;

/// Events that can occur during a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// Capture devices were enumerated
    DevicesEnumerated {
        /// Number of microphones
        audio_inputs: usize,
        /// Number of cameras
        video_inputs: usize,
    },
    /// A captured track was installed into a role's local stream
    LocalTrackInstalled {
        /// Role
        role: Role,
        /// Track kind
        kind: TrackKind,
        /// Capture device
        device_id: Option<String>,
    },
    /// A received track was installed into a role's remote stream
    RemoteTrackInstalled {
        /// Receiving role
        role: Role,
        /// Track kind
        kind: TrackKind,
        /// Device the peer captures from
        device_id: Option<String>,
    },
    /// A role switched capture device mid-call
    DeviceSwitched {
        /// Role
        role: Role,
        /// Track kind
        kind: TrackKind,
        /// New capture device
        device_id: String,
    },
    /// An endpoint's negotiation state changed
    NegotiationStateChanged {
        /// Role
        role: Role,
        /// New state
        state: NegotiationState,
    },
    /// An endpoint's connectivity changed
    ConnectionStateChanged {
        /// Role
        role: Role,
        /// New state
        state: ConnectionState,
    },
    /// A candidate was relayed to the peer
    CandidateRelayed {
        /// Role that gathered it
        from: Role,
        /// What the peer did with it
        outcome: RelayOutcome,
    },
    /// An endpoint's senders changed after negotiation
    RenegotiationNeeded {
        /// Role
        role: Role,
    },
    /// An offer/answer exchange finished
    NegotiationCompleted {
        /// Role that sent the offer
        offerer: Role,
    },
    /// The call was hung up
    CallEnded,
    /// A background step failed
    Error {
        /// Role the failure belongs to
        role: Option<Role>,
        /// Error message
        error: String,
        /// Whether this error is recoverable
        recoverable: bool,
    },
}

impl CallEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            CallEvent::DevicesEnumerated { .. } => "devices_enumerated",
            CallEvent::LocalTrackInstalled { .. } => "local_track_installed",
            CallEvent::RemoteTrackInstalled { .. } => "remote_track_installed",
            CallEvent::DeviceSwitched { .. } => "device_switched",
            CallEvent::NegotiationStateChanged { .. } => "negotiation_state_changed",
            CallEvent::ConnectionStateChanged { .. } => "connection_state_changed",
            CallEvent::CandidateRelayed { .. } => "candidate_relayed",
            CallEvent::RenegotiationNeeded { .. } => "renegotiation_needed",
            CallEvent::NegotiationCompleted { .. } => "negotiation_completed",
            CallEvent::CallEnded => "call_ended",
            CallEvent::Error { .. } => "error",
        }
    }

    /// Check if this is a track-related event
    pub fn is_track_event(&self) -> bool {
        matches!(
            self,
            CallEvent::LocalTrackInstalled { .. }
                | CallEvent::RemoteTrackInstalled { .. }
                | CallEvent::DeviceSwitched { .. }
        )
    }

    /// Check if this is a negotiation-related event
    pub fn is_negotiation_event(&self) -> bool {
        matches!(
            self,
            CallEvent::NegotiationStateChanged { .. }
                | CallEvent::RenegotiationNeeded { .. }
                | CallEvent::NegotiationCompleted { .. }
        )
    }

    /// Check if this is a connection-related event
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self,
            CallEvent::ConnectionStateChanged { .. }
                | CallEvent::CandidateRelayed { .. }
                | CallEvent::CallEnded
        )
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, CallEvent::Error { .. })
    }
}

/// Stream of call events for async iteration
#[derive(Debug)]
pub struct CallEventStream {
    receiver: mpsc::UnboundedReceiver<CallEvent>,
}

impl CallEventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<CallEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<CallEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<CallEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Next event matching `predicate`; others are discarded
    pub async fn next_matching<F>(&mut self, mut predicate: F) -> Option<CallEvent>
    where
        F: FnMut(&CallEvent) -> bool,
    {
        while let Some(event) = self.receiver.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Check if the event stream is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}
