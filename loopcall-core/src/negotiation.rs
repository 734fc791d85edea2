//! Offer/answer negotiation state
//!
//! [`NegotiationSession`] is the synchronous core of a connection endpoint: it
//! validates every offer/answer step against the current [`NegotiationState`],
//! records the local and remote descriptions, and buffers remote connectivity
//! candidates until a remote description is available. It performs no I/O;
//! the endpoint consults it before and commits to it after each transport call.

use crate::error::{CallError, CallResult};
use crate::types::Role;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Type of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Offer
    Offer,
    /// Answer
    Answer,
}

/// Serializable description of a media session, opaque to the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// Session description text
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Render as JSON text for display or exchange
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Connectivity candidate exchanged between peers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default)]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    /// Candidate bound to the first media section
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        }
    }
}

/// Negotiation state of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NegotiationState {
    /// Nothing negotiated yet
    New,
    /// Local offer created, waiting for the answer
    HaveLocalOffer,
    /// Remote offer applied, local answer pending
    HaveRemoteOffer,
    /// Both descriptions agreed
    Stable,
    /// Endpoint closed
    Closed,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NegotiationState::New => "new",
            NegotiationState::HaveLocalOffer => "have-local-offer",
            NegotiationState::HaveRemoteOffer => "have-remote-offer",
            NegotiationState::Stable => "stable",
            NegotiationState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Per-endpoint negotiation record
#[derive(Debug)]
pub struct NegotiationSession {
    role: Role,
    state: NegotiationState,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    queued: VecDeque<IceCandidate>,
    applied: HashSet<IceCandidate>,
}

impl NegotiationSession {
    /// Create a session in state `new`
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: NegotiationState::New,
            local: None,
            remote: None,
            queued: VecDeque::new(),
            applied: HashSet::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Current local description
    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local.as_ref()
    }

    /// Current remote description
    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote.as_ref()
    }

    fn reject(&self, operation: &'static str) -> CallError {
        CallError::Negotiation {
            role: self.role,
            operation,
            state: self.state,
        }
    }

    /// Check that an offer may be generated
    pub fn ensure_can_offer(&self) -> CallResult<()> {
        match self.state {
            NegotiationState::New | NegotiationState::Stable => Ok(()),
            _ => Err(self.reject("create_offer")),
        }
    }

    /// Record that an offer was generated
    pub fn offer_created(&mut self) -> CallResult<()> {
        self.ensure_can_offer()?;
        self.state = NegotiationState::HaveLocalOffer;
        Ok(())
    }

    /// Check that an answer may be generated
    pub fn ensure_can_answer(&self) -> CallResult<()> {
        match self.state {
            NegotiationState::HaveRemoteOffer => Ok(()),
            _ => Err(self.reject("create_answer")),
        }
    }

    /// State that applying `description` locally leads to.
    ///
    /// `Ok(None)` means the description is already applied and nothing changes.
    pub fn plan_local(&self, description: &SessionDescription) -> CallResult<Option<NegotiationState>> {
        if self.state != NegotiationState::Closed && self.local.as_ref() == Some(description) {
            return Ok(None);
        }

        match (description.sdp_type, self.state) {
            (
                SdpType::Offer,
                NegotiationState::New | NegotiationState::Stable | NegotiationState::HaveLocalOffer,
            ) => Ok(Some(NegotiationState::HaveLocalOffer)),
            (SdpType::Answer, NegotiationState::HaveRemoteOffer) => Ok(Some(NegotiationState::Stable)),
            _ => Err(self.reject("set_local_description")),
        }
    }

    /// Apply a planned local description
    pub fn commit_local(&mut self, description: SessionDescription, next: NegotiationState) {
        self.local = Some(description);
        self.state = next;
    }

    /// State that applying `description` as remote leads to.
    ///
    /// `Ok(None)` means the description is already applied and nothing changes.
    pub fn plan_remote(&self, description: &SessionDescription) -> CallResult<Option<NegotiationState>> {
        if self.state != NegotiationState::Closed && self.remote.as_ref() == Some(description) {
            return Ok(None);
        }

        match (description.sdp_type, self.state) {
            (SdpType::Offer, NegotiationState::New | NegotiationState::Stable) => {
                Ok(Some(NegotiationState::HaveRemoteOffer))
            }
            (SdpType::Answer, NegotiationState::HaveLocalOffer) => Ok(Some(NegotiationState::Stable)),
            _ => Err(self.reject("set_remote_description")),
        }
    }

    /// Apply a planned remote description and hand back the candidates that
    /// were waiting for it, in arrival order
    pub fn commit_remote(&mut self, description: SessionDescription, next: NegotiationState) -> Vec<IceCandidate> {
        self.remote = Some(description);
        self.state = next;
        self.queued.drain(..).collect()
    }

    /// Whether remote candidates must be held back
    pub fn must_queue_candidates(&self) -> bool {
        self.remote.is_none()
    }

    /// Hold a candidate until the remote description arrives
    pub fn queue_candidate(&mut self, candidate: IceCandidate) {
        self.queued.push_back(candidate);
    }

    /// Whether the candidate is already waiting for the remote description
    pub fn is_queued(&self, candidate: &IceCandidate) -> bool {
        self.queued.contains(candidate)
    }

    /// Number of candidates waiting for the remote description
    pub fn queued_candidates(&self) -> usize {
        self.queued.len()
    }

    /// Whether the candidate was already handed to the transport
    pub fn was_applied(&self, candidate: &IceCandidate) -> bool {
        self.applied.contains(candidate)
    }

    /// Remember that the candidate was handed to the transport
    pub fn mark_applied(&mut self, candidate: IceCandidate) {
        self.applied.insert(candidate);
    }

    /// Number of distinct candidates handed to the transport
    pub fn applied_candidates(&self) -> usize {
        self.applied.len()
    }

    /// Whether the session is closed
    pub fn is_closed(&self) -> bool {
        self.state == NegotiationState::Closed
    }

    /// Close the session; pending candidates are dropped
    pub fn close(&mut self) {
        self.state = NegotiationState::Closed;
        self.queued.clear();
    }
}
