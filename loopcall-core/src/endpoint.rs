//! Connection endpoint: one per call participant
//!
//! A [`ConnectionEndpoint`] wraps a [`NegotiationSession`] and a
//! [`PeerTransport`]. Negotiation operations are serialized by an async mutex
//! around the session; sender bookkeeping sits behind its own lock so track
//! swaps never wait on an in-flight negotiation step.

use crate::config::EndpointConfig;
use crate::error::{CallError, CallResult};
use crate::event::{EndpointEvent, EndpointEvents, EventSender};
use crate::negotiation::{IceCandidate, NegotiationSession, NegotiationState, SessionDescription};
use crate::track::MediaTrack;
use crate::transport::{PeerTransport, TransportConnector};
use crate::types::{Role, TrackKind};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handle to the sender that transmits one kind of track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sender {
    /// Sender ID
    pub id: Uuid,
    /// Endpoint role the sender belongs to
    pub role: Role,
    /// Kind of track it transmits
    pub kind: TrackKind,
}

#[derive(Debug)]
struct SenderEntry {
    sender: Sender,
    track: MediaTrack,
}

/// What happened to an ingested remote candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// Handed to the transport
    Applied,
    /// Held until the remote description is set
    Queued,
    /// Already applied or queued; ignored
    Duplicate,
}

/// Negotiation and sending side of one participant
pub struct ConnectionEndpoint {
    role: Role,
    config: EndpointConfig,
    transport: Arc<dyn PeerTransport>,
    session: tokio::sync::Mutex<NegotiationSession>,
    senders: RwLock<Vec<SenderEntry>>,
    negotiation_needed: AtomicBool,
    events: EventSender,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<EndpointEvent>>>,
    state: watch::Sender<NegotiationState>,
}

impl ConnectionEndpoint {
    /// Create an endpoint and its transport
    pub fn new(role: Role, config: EndpointConfig, connector: &dyn TransportConnector) -> CallResult<Self> {
        config.validate()?;

        let (events, event_rx) = mpsc::unbounded_channel();
        let transport = connector.connect(role, &config, events.clone())?;
        let (state, _) = watch::channel(NegotiationState::New);

        info!(role = %role, servers = config.ice_servers.len(), "🚀 Connection endpoint created");

        Ok(Self {
            role,
            config,
            transport,
            session: tokio::sync::Mutex::new(NegotiationSession::new(role)),
            senders: RwLock::new(Vec::new()),
            negotiation_needed: AtomicBool::new(false),
            events,
            event_rx: Mutex::new(Some(event_rx)),
            state,
        })
    }

    /// Endpoint role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Configuration the transport was created with
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Take the event stream; only the first call gets it
    pub fn take_events(&self) -> Option<EndpointEvents> {
        self.event_rx.lock().take().map(EndpointEvents::new)
    }

    /// Current negotiation state
    pub fn negotiation_state(&self) -> NegotiationState {
        *self.state.borrow()
    }

    /// Observe negotiation state changes
    pub fn watch_state(&self) -> watch::Receiver<NegotiationState> {
        self.state.subscribe()
    }

    /// Whether senders changed since the last offer
    pub fn needs_negotiation(&self) -> bool {
        self.negotiation_needed.load(Ordering::Acquire)
    }

    fn publish(&self, next: NegotiationState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(role = %self.role, state = %next, "Negotiation state changed");
            let _ = self.events.send(EndpointEvent::NegotiationStateChanged { state: next });
        }
    }

    fn flag_negotiation_needed(&self) {
        if self.negotiation_state() == NegotiationState::New {
            return;
        }
        self.negotiation_needed.store(true, Ordering::Release);
        let _ = self.events.send(EndpointEvent::NegotiationNeeded);
    }

    fn ensure_open(&self, operation: &'static str) -> CallResult<()> {
        let state = self.negotiation_state();
        if state == NegotiationState::Closed {
            return Err(CallError::Negotiation {
                role: self.role,
                operation,
                state,
            });
        }
        Ok(())
    }

    /// Start sending `track`.
    ///
    /// If a sender for the track's kind already exists the track is swapped
    /// into it and that sender is returned.
    pub fn add_track(&self, track: MediaTrack) -> CallResult<Sender> {
        self.ensure_open("add_track")?;

        let mut senders = self.senders.write();
        if let Some(entry) = senders.iter_mut().find(|entry| entry.sender.kind == track.kind()) {
            self.transport.replace_track(&entry.sender, &track)?;
            debug!(role = %self.role, kind = %track.kind(), "Swapped track into existing sender");
            entry.track = track;
            return Ok(entry.sender);
        }

        let sender = Sender {
            id: Uuid::new_v4(),
            role: self.role,
            kind: track.kind(),
        };
        self.transport.attach_track(&sender, &track)?;
        info!(role = %self.role, kind = %sender.kind, device = ?track.device_id(), "➕ Added {} sender", sender.kind);
        senders.push(SenderEntry { sender, track });
        drop(senders);

        self.flag_negotiation_needed();
        Ok(sender)
    }

    /// Stop sending through `sender`; the detached track is returned unstopped
    pub fn remove_track(&self, sender: &Sender) -> CallResult<MediaTrack> {
        self.ensure_open("remove_track")?;

        let mut senders = self.senders.write();
        let index = senders
            .iter()
            .position(|entry| entry.sender == *sender)
            .ok_or(CallError::SenderNotFound {
                role: self.role,
                kind: sender.kind,
            })?;
        self.transport.detach_track(sender)?;
        let entry = senders.remove(index);
        drop(senders);

        info!(role = %self.role, kind = %sender.kind, "➖ Removed {} sender", sender.kind);
        self.flag_negotiation_needed();
        Ok(entry.track)
    }

    /// Transmit `track` through `sender` without renegotiating.
    ///
    /// Returns the previously transmitted track. Fails with
    /// [`CallError::SenderNotFound`] if `sender` is stale or carries another kind.
    pub fn replace_sender_track(&self, sender: &Sender, track: MediaTrack) -> CallResult<MediaTrack> {
        let not_found = CallError::SenderNotFound {
            role: self.role,
            kind: track.kind(),
        };
        if sender.kind != track.kind() || sender.role != self.role {
            return Err(not_found);
        }

        let mut senders = self.senders.write();
        let entry = match senders.iter_mut().find(|entry| entry.sender == *sender) {
            Some(entry) => entry,
            None => return Err(not_found),
        };
        self.transport.replace_track(sender, &track)?;
        debug!(role = %self.role, kind = %sender.kind, device = ?track.device_id(), "🔄 Replaced sender track");
        Ok(std::mem::replace(&mut entry.track, track))
    }

    /// Sender transmitting `kind`, if any
    pub fn sender_for(&self, kind: TrackKind) -> Option<Sender> {
        self.senders
            .read()
            .iter()
            .find(|entry| entry.sender.kind == kind)
            .map(|entry| entry.sender)
    }

    /// All senders, in creation order
    pub fn senders(&self) -> Vec<Sender> {
        self.senders.read().iter().map(|entry| entry.sender).collect()
    }

    /// Track currently transmitted by `sender`
    pub fn sender_track(&self, sender: &Sender) -> Option<MediaTrack> {
        self.senders
            .read()
            .iter()
            .find(|entry| entry.sender == *sender)
            .map(|entry| entry.track.clone())
    }

    /// Generate an offer; legal from `new` or `stable`
    pub async fn create_offer(&self) -> CallResult<SessionDescription> {
        let mut session = self.session.lock().await;
        session.ensure_can_offer()?;

        let offer = self.transport.create_offer().await?;
        session.offer_created()?;
        self.negotiation_needed.store(false, Ordering::Release);
        self.publish(session.state());

        debug!(role = %self.role, "📝 Created offer");
        Ok(offer)
    }

    /// Generate an answer; legal only from `have-remote-offer`
    pub async fn create_answer(&self) -> CallResult<SessionDescription> {
        let session = self.session.lock().await;
        session.ensure_can_answer()?;

        let answer = self.transport.create_answer().await?;
        debug!(role = %self.role, "📝 Created answer");
        Ok(answer)
    }

    /// Apply a local description; re-applying the current one does nothing
    pub async fn set_local_description(&self, description: SessionDescription) -> CallResult<()> {
        let mut session = self.session.lock().await;
        let next = match session.plan_local(&description)? {
            Some(next) => next,
            None => return Ok(()),
        };

        self.transport.set_local_description(&description).await?;
        session.commit_local(description, next);
        self.publish(next);
        Ok(())
    }

    /// Apply the peer's description and flush buffered candidates;
    /// re-applying the current one does nothing
    pub async fn set_remote_description(&self, description: SessionDescription) -> CallResult<()> {
        let mut session = self.session.lock().await;
        let next = match session.plan_remote(&description)? {
            Some(next) => next,
            None => return Ok(()),
        };

        self.transport.set_remote_description(&description).await?;
        let pending = session.commit_remote(description, next);
        self.publish(next);

        if !pending.is_empty() {
            debug!(role = %self.role, count = pending.len(), "Flushing buffered candidates");
        }
        for candidate in pending {
            if session.was_applied(&candidate) {
                continue;
            }
            match self.transport.add_ice_candidate(&candidate).await {
                Ok(()) => session.mark_applied(candidate),
                Err(e) => warn!(role = %self.role, "Skipping buffered candidate: {}", e),
            }
        }
        Ok(())
    }

    /// Ingest one of the peer's candidates.
    ///
    /// Candidates that arrive before the remote description are buffered and
    /// applied once it is set; each distinct candidate is applied at most once.
    pub async fn add_remote_candidate(&self, candidate: IceCandidate) -> CallResult<CandidateOutcome> {
        let mut session = self.session.lock().await;
        if session.is_closed() {
            return Err(CallError::Negotiation {
                role: self.role,
                operation: "add_remote_candidate",
                state: session.state(),
            });
        }

        if session.was_applied(&candidate) || session.is_queued(&candidate) {
            return Ok(CandidateOutcome::Duplicate);
        }

        if session.must_queue_candidates() {
            session.queue_candidate(candidate);
            return Ok(CandidateOutcome::Queued);
        }

        self.transport.add_ice_candidate(&candidate).await?;
        session.mark_applied(candidate);
        Ok(CandidateOutcome::Applied)
    }

    /// Current local description
    pub async fn local_description(&self) -> Option<SessionDescription> {
        self.session.lock().await.local_description().cloned()
    }

    /// Current remote description
    pub async fn remote_description(&self) -> Option<SessionDescription> {
        self.session.lock().await.remote_description().cloned()
    }

    /// Candidates waiting for the remote description
    pub async fn queued_candidate_count(&self) -> usize {
        self.session.lock().await.queued_candidates()
    }

    /// Distinct candidates handed to the transport
    pub async fn applied_candidate_count(&self) -> usize {
        self.session.lock().await.applied_candidates()
    }

    /// Close the endpoint and release its transport. Tracks are left running.
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        if session.is_closed() {
            return;
        }
        session.close();
        self.senders.write().clear();
        self.transport.close();
        self.publish(NegotiationState::Closed);
        info!(role = %self.role, "📴 Connection endpoint closed");
    }
}

impl std::fmt::Debug for ConnectionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEndpoint")
            .field("role", &self.role)
            .field("state", &self.negotiation_state())
            .field("senders", &self.senders())
            .finish()
    }
}
