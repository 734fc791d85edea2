//! # loopcall core
//!
//! Negotiation state machine, connection endpoints and the transport seam for
//! a two-party call that runs entirely inside one process. This crate provides
//! the shared vocabulary (roles, track kinds, media track handles, errors) used
//! by the media, signaling and facade crates.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod negotiation;
pub mod track;
pub mod transport;
pub mod types;

// Re-export main types
pub use config::{EndpointConfig, IceServer};
pub use endpoint::{CandidateOutcome, ConnectionEndpoint, Sender};
pub use error::{CallError, CallResult};
pub use event::{ConnectionState, EndpointEvent, EndpointEvents, EventSender};
pub use negotiation::{IceCandidate, NegotiationSession, NegotiationState, SdpType, SessionDescription};
pub use track::{MediaTrack, TrackInfo, TrackOrigin};
pub use transport::{LoopbackNetwork, LoopbackTransport, PeerTransport, TransportConnector};
pub use types::{Direction, Role, TrackKind};
