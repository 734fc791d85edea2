//! Call assembly and control

use crate::config::{CallConfig, DeviceSelection};
use crate::event::{CallEvent, CallEventStream};
use crate::participant::RoleContext;
use loopcall_core::{
    CallError, CallResult, ConnectionEndpoint, Direction, EndpointConfig, EndpointEvent,
    EndpointEvents, LoopbackNetwork, MediaTrack, Role, Sender, TrackKind, TransportConnector,
};
use loopcall_media::{
    CaptureBackend, DeviceCatalog, DeviceList, StreamRegistry, StreamSnapshot, SyntheticCapture,
    TrackFactory,
};
use loopcall_signaling::{NegotiationOutcome, SignalingCoordinator, SignalingEnvelope};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(feature = "diagnostics")]
use loopcall_diagnostics::{CallReport, EndpointReport};

/// Fluent builder for a call
pub struct CallBuilder {
    config: CallConfig,
    capture: Option<Arc<dyn CaptureBackend>>,
    connector: Option<Arc<dyn TransportConnector>>,
}

impl CallBuilder {
    pub(crate) fn new(config: CallConfig) -> Self {
        Self {
            config,
            capture: None,
            connector: None,
        }
    }

    /// Capture from `backend` instead of the synthetic default devices
    pub fn capture(mut self, backend: impl CaptureBackend + 'static) -> Self {
        self.capture = Some(Arc::new(backend));
        self
    }

    /// Capture from a shared backend
    pub fn capture_backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.capture = Some(backend);
        self
    }

    /// Connect endpoints through `connector` instead of a fresh loopback link
    pub fn transport(mut self, connector: impl TransportConnector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Override the connectivity settings
    pub fn endpoint_config(mut self, endpoint: EndpointConfig) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Create both endpoints and start routing their events
    pub async fn build(self) -> CallResult<Call> {
        self.config.validate()?;

        let capture: Arc<dyn CaptureBackend> = match self.capture {
            Some(capture) => capture,
            None => Arc::new(SyntheticCapture::with_default_devices()),
        };
        let connector: Arc<dyn TransportConnector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(LoopbackNetwork::new()),
        };

        let registry = StreamRegistry::new();
        let caller = Arc::new(ConnectionEndpoint::new(
            Role::Caller,
            self.config.endpoint.clone(),
            connector.as_ref(),
        )?);
        let callee = Arc::new(ConnectionEndpoint::new(
            Role::Callee,
            self.config.endpoint.clone(),
            connector.as_ref(),
        )?);

        let caller_events = take_events(&caller)?;
        let callee_events = take_events(&callee)?;

        let (events, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(CallShared {
            caller: RoleContext::new(caller, &registry),
            callee: RoleContext::new(callee, &registry),
            registry,
            coordinator: SignalingCoordinator::new(),
            events,
            candidate_events: self.config.candidate_events,
        });

        let pumps = vec![
            tokio::spawn(pump(shared.clone(), Role::Caller, caller_events)),
            tokio::spawn(pump(shared.clone(), Role::Callee, callee_events)),
        ];

        info!("📞 Call ready");
        Ok(Call {
            shared,
            catalog: DeviceCatalog::new(capture.clone()),
            factory: TrackFactory::new(capture),
            event_rx: Mutex::new(Some(event_rx)),
            pumps: Mutex::new(pumps),
            ended: AtomicBool::new(false),
        })
    }
}

fn take_events(endpoint: &ConnectionEndpoint) -> CallResult<EndpointEvents> {
    endpoint.take_events().ok_or_else(|| CallError::Initialization {
        reason: format!("events of the {} endpoint are already taken", endpoint.role()),
    })
}

struct CallShared {
    caller: RoleContext,
    callee: RoleContext,
    registry: StreamRegistry,
    coordinator: SignalingCoordinator,
    events: mpsc::UnboundedSender<CallEvent>,
    candidate_events: bool,
}

impl CallShared {
    fn context(&self, role: Role) -> &RoleContext {
        match role {
            Role::Caller => &self.caller,
            Role::Callee => &self.callee,
        }
    }

    fn emit(&self, event: CallEvent) {
        // Nobody may be listening
        let _ = self.events.send(event);
    }

    fn emit_error(&self, role: Option<Role>, error: &CallError) {
        self.emit(CallEvent::Error {
            role,
            error: error.to_string(),
            recoverable: error.is_recoverable(),
        });
    }

    async fn route(&self, role: Role, event: EndpointEvent) {
        if !event.is_candidate_event() {
            debug!(role = %role, "Routing {}", event.event_type());
        }
        match event {
            EndpointEvent::CandidateDiscovered { candidate } => {
                let peer = self.context(role.peer());
                let outcome = self
                    .coordinator
                    .relay_candidate(role, peer.endpoint(), candidate)
                    .await;
                if self.candidate_events {
                    self.emit(CallEvent::CandidateRelayed {
                        from: role,
                        outcome,
                    });
                }
            }
            EndpointEvent::GatheringComplete => {
                debug!(role = %role, "Candidate gathering finished");
            }
            EndpointEvent::TrackReceived { track } => {
                let kind = track.kind();
                let device_id = track.device_id().map(str::to_string);
                if self.context(role).remote().install(track) {
                    info!(role = %role, kind = %kind, device = ?device_id, "📺 Remote {} track installed", kind);
                    self.emit(CallEvent::RemoteTrackInstalled {
                        role,
                        kind,
                        device_id,
                    });
                }
            }
            EndpointEvent::ConnectionStateChanged { state } => {
                self.emit(CallEvent::ConnectionStateChanged { role, state });
            }
            EndpointEvent::NegotiationStateChanged { state } => {
                self.emit(CallEvent::NegotiationStateChanged { role, state });
            }
            EndpointEvent::NegotiationNeeded => {
                self.emit(CallEvent::RenegotiationNeeded { role });
            }
        }
    }
}

async fn pump(shared: Arc<CallShared>, role: Role, mut events: EndpointEvents) {
    while let Some(event) = events.next().await {
        shared.route(role, event).await;
    }
    debug!(role = %role, "Endpoint event pump stopped");
}

/// Two-party call running inside one process
pub struct Call {
    shared: Arc<CallShared>,
    catalog: DeviceCatalog,
    factory: TrackFactory,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<CallEvent>>>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
    ended: AtomicBool,
}

impl Call {
    fn ensure_active(&self) -> CallResult<()> {
        if self.ended.load(Ordering::Acquire) {
            return Err(CallError::CallEnded);
        }
        Ok(())
    }

    /// Probe capture access and list the available devices
    pub async fn enumerate_devices(&self) -> CallResult<DeviceList> {
        self.ensure_active()?;
        let devices = self.catalog.enumerate().await?;
        self.shared.emit(CallEvent::DevicesEnumerated {
            audio_inputs: devices.audio_inputs().len(),
            video_inputs: devices.video_inputs().len(),
        });
        Ok(devices)
    }

    /// Devices found by the last enumeration
    pub fn devices(&self) -> Option<DeviceList> {
        self.catalog.last_snapshot()
    }

    /// Acquire and start sending one audio and one video track for `role`.
    ///
    /// Both acquisitions run concurrently. If either fails, the track that
    /// was acquired is stopped and nothing is installed. If the video track
    /// cannot be sent after the audio track was, the audio sender is removed
    /// again and its track stopped.
    pub async fn setup_stream(&self, role: Role, selection: &DeviceSelection) -> CallResult<()> {
        self.ensure_active()?;

        let (audio, video) = futures::join!(
            self.factory.acquire(TrackKind::Audio, selection.device(TrackKind::Audio)),
            self.factory.acquire(TrackKind::Video, selection.device(TrackKind::Video)),
        );

        let (audio, video) = match (audio, video) {
            (Ok(audio), Ok(video)) => (audio, video),
            (Ok(acquired), Err(e)) | (Err(e), Ok(acquired)) => {
                acquired.stop();
                warn!(role = %role, "Stream setup failed: {}", e);
                self.shared.emit_error(Some(role), &e);
                return Err(e);
            }
            (Err(e), Err(_)) => {
                warn!(role = %role, "Stream setup failed: {}", e);
                self.shared.emit_error(Some(role), &e);
                return Err(e);
            }
        };

        let context = self.shared.context(role);
        let _outgoing = context.lock_outgoing().await;
        let audio_sender = match self.send_local(role, audio) {
            Ok(sender) => sender,
            Err(e) => {
                video.stop();
                self.shared.emit_error(Some(role), &e);
                return Err(e);
            }
        };
        if let Err(e) = self.send_local(role, video) {
            warn!(role = %role, "Video sender failed, rolling back audio: {}", e);
            if let Err(rollback) = context.endpoint().remove_track(&audio_sender) {
                warn!(role = %role, "Audio rollback failed: {}", rollback);
            }
            context.local().remove(TrackKind::Audio);
            self.shared.emit_error(Some(role), &e);
            return Err(e);
        }
        info!(role = %role, "🎬 Local stream ready");
        Ok(())
    }

    /// Set up both roles; each result is independent of the other
    pub async fn setup_streams(
        &self,
        caller: &DeviceSelection,
        callee: &DeviceSelection,
    ) -> (CallResult<()>, CallResult<()>) {
        futures::join!(
            self.setup_stream(Role::Caller, caller),
            self.setup_stream(Role::Callee, callee),
        )
    }

    fn send_local(&self, role: Role, track: MediaTrack) -> CallResult<Sender> {
        let context = self.shared.context(role);
        let sender = match context.endpoint().add_track(track.clone()) {
            Ok(sender) => sender,
            Err(e) => {
                track.stop();
                return Err(e);
            }
        };

        let kind = track.kind();
        let device_id = track.device_id().map(str::to_string);
        context.local().install(track);
        self.shared.emit(CallEvent::LocalTrackInstalled {
            role,
            kind,
            device_id,
        });
        Ok(sender)
    }

    /// Negotiate with the caller as offerer
    pub async fn negotiate(&self) -> CallResult<NegotiationOutcome> {
        self.negotiate_from(Role::Caller).await
    }

    /// Negotiate with `offerer` sending the offer.
    ///
    /// Refuses to start unless both local streams hold an audio and a video
    /// track.
    pub async fn negotiate_from(&self, offerer: Role) -> CallResult<NegotiationOutcome> {
        self.ensure_active()?;

        for role in Role::ALL {
            if let Some(missing) = self.shared.context(role).local().snapshot().missing() {
                return Err(CallError::IncompleteLocalStream { role, missing });
            }
        }

        let offering = self.shared.context(offerer);
        let answering = self.shared.context(offerer.peer());
        match self
            .shared
            .coordinator
            .negotiate(offering.endpoint(), answering.endpoint())
            .await
        {
            Ok(outcome) => {
                self.shared.emit(CallEvent::NegotiationCompleted { offerer });
                Ok(outcome)
            }
            Err(e) => {
                warn!(offerer = %offerer, "Negotiation aborted: {}", e);
                self.shared.emit_error(None, &e);
                Err(e)
            }
        }
    }

    /// Swap the capture device of one of `role`'s tracks without renegotiating.
    ///
    /// The new track replaces the one the sender transmits and takes over the
    /// local stream slot; the previous track is stopped.
    pub async fn switch_device(&self, role: Role, kind: TrackKind, device_id: &str) -> CallResult<MediaTrack> {
        self.ensure_active()?;

        let context = self.shared.context(role);
        let _outgoing = context.lock_outgoing().await;
        let sender = self
            .shared
            .registry
            .current_sender(context.endpoint(), kind)
            .ok_or(CallError::SenderNotFound { role, kind })?;

        let track = self.factory.acquire(kind, Some(device_id)).await?;
        if let Err(e) = context.endpoint().replace_sender_track(&sender, track.clone()) {
            track.stop();
            self.shared.emit_error(Some(role), &e);
            return Err(e);
        }
        context.local().install(track.clone());

        info!(role = %role, kind = %kind, device = device_id, "🔀 Switched {} device", kind);
        self.shared.emit(CallEvent::DeviceSwitched {
            role,
            kind,
            device_id: device_id.to_string(),
        });
        Ok(track)
    }

    /// Per-role state: endpoint and both streams
    pub fn context(&self, role: Role) -> &RoleContext {
        self.shared.context(role)
    }

    /// Connection endpoint of `role`
    pub fn endpoint(&self, role: Role) -> &Arc<ConnectionEndpoint> {
        self.shared.context(role).endpoint()
    }

    /// What `role` sends
    pub fn local_stream(&self, role: Role) -> StreamSnapshot {
        self.shared.context(role).local().snapshot()
    }

    /// What `role` receives from its peer
    pub fn remote_stream(&self, role: Role) -> StreamSnapshot {
        self.shared.context(role).remote().snapshot()
    }

    /// Observe one of `role`'s streams
    pub fn watch_stream(&self, role: Role, direction: Direction) -> watch::Receiver<StreamSnapshot> {
        self.shared.context(role).stream(direction).subscribe()
    }

    /// Signaling coordinator of this call
    pub fn signaling(&self) -> &SignalingCoordinator {
        &self.shared.coordinator
    }

    /// Every signaling message delivered so far
    pub fn signaling_transcript(&self) -> Vec<SignalingEnvelope> {
        self.shared.coordinator.transcript()
    }

    /// Take the call event stream; only the first call gets it
    pub fn events(&self) -> Option<CallEventStream> {
        self.event_rx.lock().take().map(CallEventStream::new)
    }

    /// Snapshot of endpoints, streams and signaling
    #[cfg(feature = "diagnostics")]
    pub async fn report(&self) -> CallReport {
        let endpoints = vec![
            EndpointReport::capture(self.shared.caller.endpoint()).await,
            EndpointReport::capture(self.shared.callee.endpoint()).await,
        ];
        CallReport::new(
            endpoints,
            &self.shared.registry,
            self.shared.coordinator.transcript().len(),
        )
    }

    /// Whether the call was hung up
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// End the call: stop routing events, close both endpoints and stop every
    /// track. Calling it again does nothing.
    pub async fn hang_up(&self) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }

        for pump in self.pumps.lock().drain(..) {
            pump.abort();
        }
        for role in Role::ALL {
            self.shared.context(role).endpoint().close().await;
        }
        self.shared.registry.clear();

        info!("📴 Call ended");
        self.shared.emit(CallEvent::CallEnded);
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        for pump in self.pumps.get_mut().drain(..) {
            pump.abort();
        }
    }
}
