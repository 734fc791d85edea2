//! Offer/answer exchange and candidate relay between two endpoints

use crate::protocol::{SignalingEnvelope, SignalingMessage};
use loopcall_core::{
    CallError, CallResult, CandidateOutcome, ConnectionEndpoint, IceCandidate, Role,
    SessionDescription,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Descriptions exchanged by one negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationOutcome {
    /// Offer created by the offerer
    pub offer: SessionDescription,
    /// Answer created by the answerer
    pub answer: SessionDescription,
}

/// What happened to a relayed candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Applied by the receiving endpoint
    Applied,
    /// Held until the receiver has a remote description
    Queued,
    /// Already known to the receiver
    Duplicate,
    /// Rejected; logged and dropped
    Skipped,
}

impl From<CandidateOutcome> for RelayOutcome {
    fn from(outcome: CandidateOutcome) -> Self {
        match outcome {
            CandidateOutcome::Applied => RelayOutcome::Applied,
            CandidateOutcome::Queued => RelayOutcome::Queued,
            CandidateOutcome::Duplicate => RelayOutcome::Duplicate,
        }
    }
}

/// In-process signaling channel between the caller and callee endpoints
#[derive(Debug, Default)]
pub struct SignalingCoordinator {
    transcript: Mutex<Vec<SignalingEnvelope>>,
    taps: Mutex<Vec<mpsc::UnboundedSender<SignalingEnvelope>>>,
}

impl SignalingCoordinator {
    /// Create a coordinator with an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, from: Role, message: SignalingMessage) {
        let envelope = SignalingEnvelope::new(from, message);
        debug!(from = %envelope.from, to = %envelope.to, "✉️ Delivering {}", envelope.message.message_type());
        self.taps
            .lock()
            .retain(|tap| tap.send(envelope.clone()).is_ok());
        self.transcript.lock().push(envelope);
    }

    /// Run one offer/answer exchange from `offerer` to `answerer`.
    ///
    /// The first out-of-state step aborts the exchange with its error.
    pub async fn negotiate(
        &self,
        offerer: &ConnectionEndpoint,
        answerer: &ConnectionEndpoint,
    ) -> CallResult<NegotiationOutcome> {
        if offerer.role() == answerer.role() {
            return Err(CallError::Configuration {
                field: "answerer".to_string(),
                reason: format!("both endpoints play the {} role", offerer.role()),
            });
        }

        let offer = offerer.create_offer().await?;
        offerer.set_local_description(offer.clone()).await?;
        self.record(
            offerer.role(),
            SignalingMessage::Offer {
                description: offer.clone(),
            },
        );
        answerer.set_remote_description(offer.clone()).await?;

        let answer = answerer.create_answer().await?;
        answerer.set_local_description(answer.clone()).await?;
        self.record(
            answerer.role(),
            SignalingMessage::Answer {
                description: answer.clone(),
            },
        );
        offerer.set_remote_description(answer.clone()).await?;

        info!(offerer = %offerer.role(), answerer = %answerer.role(), "🤝 Negotiation complete");
        Ok(NegotiationOutcome { offer, answer })
    }

    /// Hand `candidate` from `from` to the `to` endpoint.
    ///
    /// Failures are logged and reported as [`RelayOutcome::Skipped`]; they
    /// never abort the session.
    pub async fn relay_candidate(
        &self,
        from: Role,
        to: &ConnectionEndpoint,
        candidate: IceCandidate,
    ) -> RelayOutcome {
        self.record(
            from,
            SignalingMessage::Candidate {
                candidate: candidate.clone(),
            },
        );

        match to.add_remote_candidate(candidate).await {
            Ok(outcome) => outcome.into(),
            Err(e) => {
                warn!(from = %from, to = %to.role(), "Candidate relay failed: {}", e);
                RelayOutcome::Skipped
            }
        }
    }

    /// Every delivered message, in delivery order
    pub fn transcript(&self) -> Vec<SignalingEnvelope> {
        self.transcript.lock().clone()
    }

    /// Transcript as pretty-printed JSON
    pub fn transcript_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.transcript.lock())
    }

    /// Most recent offer
    pub fn last_offer(&self) -> Option<SessionDescription> {
        self.last_description("offer")
    }

    /// Most recent answer
    pub fn last_answer(&self) -> Option<SessionDescription> {
        self.last_description("answer")
    }

    fn last_description(&self, message_type: &str) -> Option<SessionDescription> {
        self.transcript
            .lock()
            .iter()
            .rev()
            .find(|envelope| envelope.message.message_type() == message_type)
            .and_then(|envelope| envelope.message.description().cloned())
    }

    /// Receive a copy of every message delivered from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SignalingEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.taps.lock().push(tx);
        rx
    }
}
