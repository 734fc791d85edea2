//! In-process transport linking the two call endpoints
//!
//! Both sides of a [`LoopbackNetwork`] share one link state. Descriptions are
//! SDP-like text listing one media section per attached sender; applying the
//! peer's description announces every peer sender not seen before as an
//! inbound track. Candidates are gathered asynchronously once the local
//! description is set. Like a real transport, a candidate applied before the
//! remote description is silently lost.

use super::{PeerTransport, TransportConnector};
use crate::config::EndpointConfig;
use crate::endpoint::Sender;
use crate::error::{CallError, CallResult};
use crate::event::{ConnectionState, EndpointEvent, EventSender};
use crate::negotiation::{IceCandidate, SdpType, SessionDescription};
use crate::track::MediaTrack;
use crate::types::{Role, TrackKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const HOST_PRIORITY: u32 = 2_130_706_431;
const REFLEXIVE_PRIORITY: u32 = 1_694_498_815;
const RELAY_PRIORITY: u32 = 16_777_215;

struct SideState {
    events: EventSender,
    config: EndpointConfig,
    session_id: u64,
    version: u64,
    senders: Vec<(Sender, MediaTrack)>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    gathered: bool,
    delivered: HashSet<Uuid>,
    applied: Vec<IceCandidate>,
    dropped: usize,
    connection: ConnectionState,
    closed: bool,
}

impl SideState {
    fn new(config: &EndpointConfig, events: EventSender, session_id: u64) -> Self {
        Self {
            events,
            config: config.clone(),
            session_id,
            version: 0,
            senders: Vec::new(),
            local: None,
            remote: None,
            gathered: false,
            delivered: HashSet::new(),
            applied: Vec::new(),
            dropped: 0,
            connection: ConnectionState::New,
            closed: false,
        }
    }

    fn emit(&self, event: EndpointEvent) {
        // The endpoint may already be gone during teardown
        let _ = self.events.send(event);
    }

    fn sender_index(&self, sender: &Sender) -> Option<usize> {
        self.senders.iter().position(|(existing, _)| existing.id == sender.id)
    }

    fn render(&mut self, role: Role, sdp_type: SdpType) -> SessionDescription {
        self.version += 1;
        let setup = match sdp_type {
            SdpType::Offer => "actpass",
            SdpType::Answer => "active",
        };
        let mids: Vec<String> = (0..self.senders.len()).map(|mid| mid.to_string()).collect();

        let mut sdp = String::from("v=0\r\n");
        sdp.push_str(&format!("o=- {} {} IN IP4 127.0.0.1\r\n", self.session_id, self.version));
        sdp.push_str("s=loopcall\r\n");
        sdp.push_str("t=0 0\r\n");
        if !mids.is_empty() {
            sdp.push_str(&format!("a=group:BUNDLE {}\r\n", mids.join(" ")));
        }
        sdp.push_str(&format!("a=msid-semantic: WMS {}-stream\r\n", role));

        for (mid, (sender, _)) in self.senders.iter().enumerate() {
            let (payload, rtpmap) = match sender.kind {
                TrackKind::Audio => (111, "opus/48000/2"),
                TrackKind::Video => (96, "VP8/90000"),
            };
            sdp.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF {}\r\n", sender.kind, payload));
            sdp.push_str("c=IN IP4 0.0.0.0\r\n");
            sdp.push_str(&format!("a=setup:{}\r\n", setup));
            sdp.push_str(&format!("a=mid:{}\r\n", mid));
            sdp.push_str("a=sendrecv\r\n");
            sdp.push_str(&format!("a=msid:{}-stream {}\r\n", role, sender.id));
            sdp.push_str(&format!("a=rtpmap:{} {}\r\n", payload, rtpmap));
        }

        SessionDescription {
            sdp_type,
            sdp,
        }
    }

    fn gather(&self) -> Vec<IceCandidate> {
        let mut rng = rand::thread_rng();
        let host_port: u16 = rng.gen_range(49152..65535);
        let mut candidates = vec![IceCandidate::new(format!(
            "candidate:{} 1 udp {} 127.0.0.1 {} typ host",
            rng.gen::<u32>(),
            HOST_PRIORITY,
            host_port
        ))];

        let pool = usize::from(self.config.ice_candidate_pool_size);
        for url in self.config.server_urls().take(pool) {
            let (kind, priority) = if url.starts_with("turn") {
                ("relay", RELAY_PRIORITY)
            } else {
                ("srflx", REFLEXIVE_PRIORITY)
            };
            candidates.push(IceCandidate::new(format!(
                "candidate:{} 1 udp {} 203.0.113.{} {} typ {} raddr 127.0.0.1 rport {}",
                rng.gen::<u32>(),
                priority,
                rng.gen_range(1..255u8),
                rng.gen_range(49152..65535u16),
                kind,
                host_port
            )));
        }

        candidates
    }

    fn maybe_connect(&mut self, role: Role) {
        if self.connection != ConnectionState::New
            || self.local.is_none()
            || self.remote.is_none()
            || self.applied.is_empty()
        {
            return;
        }

        self.connection = ConnectionState::Checking;
        self.emit(EndpointEvent::ConnectionStateChanged {
            state: ConnectionState::Checking,
        });
        self.connection = ConnectionState::Connected;
        self.emit(EndpointEvent::ConnectionStateChanged {
            state: ConnectionState::Connected,
        });
        info!(role = %role, "🔗 Loopback link connected");
    }
}

#[derive(Default)]
struct LinkState {
    sides: HashMap<Role, SideState>,
}

impl LinkState {
    fn side(&mut self, role: Role) -> CallResult<&mut SideState> {
        match self.sides.get_mut(&role) {
            Some(side) if !side.closed => Ok(side),
            _ => Err(CallError::Transport {
                reason: format!("{} side of the loopback link is closed", role),
            }),
        }
    }
}

/// Pair of linked in-process transports
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    link: Arc<Mutex<LinkState>>,
}

impl LoopbackNetwork {
    /// Create an empty link
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates applied to the `role` side, in application order
    pub fn applied_candidates(&self, role: Role) -> Vec<IceCandidate> {
        self.link
            .lock()
            .sides
            .get(&role)
            .map(|side| side.applied.clone())
            .unwrap_or_default()
    }

    /// Candidates the `role` side lost because no remote description was set
    pub fn dropped_candidates(&self, role: Role) -> usize {
        self.link.lock().sides.get(&role).map_or(0, |side| side.dropped)
    }

    /// Connectivity state of the `role` side
    pub fn connection_state(&self, role: Role) -> Option<ConnectionState> {
        self.link.lock().sides.get(&role).map(|side| side.connection)
    }

    /// Track the `role` side currently transmits for `kind`
    pub fn transmitted_track(&self, role: Role, kind: TrackKind) -> Option<MediaTrack> {
        self.link.lock().sides.get(&role).and_then(|side| {
            side.senders
                .iter()
                .find(|(sender, _)| sender.kind == kind)
                .map(|(_, track)| track.clone())
        })
    }

    /// Number of senders of `kind` attached on the `role` side
    pub fn sender_count(&self, role: Role, kind: TrackKind) -> usize {
        self.link.lock().sides.get(&role).map_or(0, |side| {
            side.senders.iter().filter(|(sender, _)| sender.kind == kind).count()
        })
    }
}

impl TransportConnector for LoopbackNetwork {
    fn connect(
        &self,
        role: Role,
        config: &EndpointConfig,
        events: EventSender,
    ) -> CallResult<Arc<dyn PeerTransport>> {
        let session_id = rand::thread_rng().gen_range(1_000_000_000u64..9_999_999_999);
        let mut link = self.link.lock();
        if link.sides.get(&role).map_or(false, |side| !side.closed) {
            return Err(CallError::Initialization {
                reason: format!("{} side of the loopback link is already connected", role),
            });
        }
        link.sides.insert(role, SideState::new(config, events, session_id));
        debug!(role = %role, "Loopback transport connected");

        Ok(Arc::new(LoopbackTransport {
            role,
            link: self.link.clone(),
        }))
    }
}

/// One side of a [`LoopbackNetwork`]
pub struct LoopbackTransport {
    role: Role,
    link: Arc<Mutex<LinkState>>,
}

impl LoopbackTransport {
    /// Role this side belongs to
    pub fn role(&self) -> Role {
        self.role
    }
}

fn parse_candidate(candidate: &IceCandidate) -> CallResult<()> {
    let invalid = |reason: &str| CallError::InvalidCandidate {
        candidate: candidate.candidate.clone(),
        reason: reason.to_string(),
    };

    let fields: Vec<&str> = candidate.candidate.split_whitespace().collect();
    if !fields.first().map_or(false, |f| f.starts_with("candidate:")) {
        return Err(invalid("missing candidate: prefix"));
    }
    if fields.len() < 8 {
        return Err(invalid("too few fields"));
    }
    if fields[6] != "typ" {
        return Err(invalid("missing candidate type"));
    }
    if fields[5].parse::<u16>().is_err() {
        return Err(invalid("invalid port"));
    }
    Ok(())
}

fn announced_senders(description: &SessionDescription) -> Vec<Uuid> {
    description
        .sdp
        .lines()
        .filter_map(|line| line.strip_prefix("a=msid:"))
        .filter_map(|msid| msid.split_whitespace().nth(1))
        .filter_map(|id| Uuid::parse_str(id).ok())
        .collect()
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn create_offer(&self) -> CallResult<SessionDescription> {
        let mut link = self.link.lock();
        let side = link.side(self.role)?;
        Ok(side.render(self.role, SdpType::Offer))
    }

    async fn create_answer(&self) -> CallResult<SessionDescription> {
        let mut link = self.link.lock();
        let side = link.side(self.role)?;
        match &side.remote {
            Some(remote) if remote.sdp_type == SdpType::Offer => {
                Ok(side.render(self.role, SdpType::Answer))
            }
            _ => Err(CallError::Transport {
                reason: "cannot answer without a remote offer".to_string(),
            }),
        }
    }

    async fn set_local_description(&self, description: &SessionDescription) -> CallResult<()> {
        let gathering = {
            let mut link = self.link.lock();
            let side = link.side(self.role)?;
            side.local = Some(description.clone());
            side.maybe_connect(self.role);

            if side.gathered {
                None
            } else {
                side.gathered = true;
                Some((side.gather(), side.events.clone()))
            }
        };

        if let Some((candidates, events)) = gathering {
            let role = self.role;
            tokio::spawn(async move {
                for candidate in candidates {
                    tokio::task::yield_now().await;
                    if events.send(EndpointEvent::CandidateDiscovered { candidate }).is_err() {
                        return;
                    }
                }
                let _ = events.send(EndpointEvent::GatheringComplete);
                debug!(role = %role, "Candidate gathering complete");
            });
        }

        Ok(())
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> CallResult<()> {
        let mut link = self.link.lock();
        let peer_tracks: HashMap<Uuid, MediaTrack> = link
            .sides
            .get(&self.role.peer())
            .map(|peer| {
                peer.senders
                    .iter()
                    .map(|(sender, track)| (sender.id, track.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let side = link.side(self.role)?;
        side.remote = Some(description.clone());

        for sender_id in announced_senders(description) {
            if side.delivered.contains(&sender_id) {
                continue;
            }
            match peer_tracks.get(&sender_id) {
                Some(source) => {
                    side.delivered.insert(sender_id);
                    let track = MediaTrack::remote(self.role.peer(), source);
                    debug!(role = %self.role, kind = %track.kind(), "📥 Inbound track {}", track.label());
                    side.emit(EndpointEvent::TrackReceived { track });
                }
                None => {
                    warn!(role = %self.role, %sender_id, "Remote description names an unknown sender");
                }
            }
        }

        side.maybe_connect(self.role);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> CallResult<()> {
        parse_candidate(candidate)?;

        let mut link = self.link.lock();
        let side = link.side(self.role)?;
        if side.remote.is_none() {
            side.dropped += 1;
            warn!(role = %self.role, "Candidate arrived before the remote description and was lost");
            return Ok(());
        }

        side.applied.push(candidate.clone());
        side.maybe_connect(self.role);
        Ok(())
    }

    fn attach_track(&self, sender: &Sender, track: &MediaTrack) -> CallResult<()> {
        let mut link = self.link.lock();
        let side = link.side(self.role)?;
        if side.sender_index(sender).is_some() {
            return Err(CallError::Transport {
                reason: format!("sender {} is already attached", sender.id),
            });
        }
        side.senders.push((*sender, track.clone()));
        Ok(())
    }

    fn replace_track(&self, sender: &Sender, track: &MediaTrack) -> CallResult<()> {
        let mut link = self.link.lock();
        let side = link.side(self.role)?;
        let index = side.sender_index(sender).ok_or(CallError::SenderNotFound {
            role: self.role,
            kind: sender.kind,
        })?;
        side.senders[index].1 = track.clone();
        Ok(())
    }

    fn detach_track(&self, sender: &Sender) -> CallResult<()> {
        let mut link = self.link.lock();
        let side = link.side(self.role)?;
        let index = side.sender_index(sender).ok_or(CallError::SenderNotFound {
            role: self.role,
            kind: sender.kind,
        })?;
        side.senders.remove(index);
        Ok(())
    }

    fn close(&self) {
        let mut link = self.link.lock();
        if let Some(side) = link.sides.get_mut(&self.role) {
            if side.closed {
                return;
            }
            side.closed = true;
            side.senders.clear();
            side.connection = ConnectionState::Closed;
            side.emit(EndpointEvent::ConnectionStateChanged {
                state: ConnectionState::Closed,
            });
            info!(role = %self.role, "Loopback transport closed");
        }
    }
}
