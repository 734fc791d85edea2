//! # loopcall signaling
//!
//! Drives the offer/answer exchange between the two endpoints of a call and
//! relays connectivity candidates between them. Delivery is in-process; every
//! delivered message is kept as a serializable envelope so the exchange can be
//! displayed or replayed over another channel.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod protocol;

// Re-export main types
pub use coordinator::{NegotiationOutcome, RelayOutcome, SignalingCoordinator};
pub use protocol::{SignalingEnvelope, SignalingMessage};
