//! End-to-end call scenarios through the public API

use async_trait::async_trait;
use loopcall::*;
use loopcall_core::EventSender;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    call: Call,
    capture: SyntheticCapture,
    network: LoopbackNetwork,
}

async fn harness() -> Harness {
    let capture = SyntheticCapture::with_default_devices();
    let network = LoopbackNetwork::new();
    let loopcall = LoopCall::init_with(CallConfig::local_only()).unwrap();
    let call = loopcall
        .call()
        .capture(capture.clone())
        .transport(network.clone())
        .build()
        .await
        .unwrap();
    Harness {
        call,
        capture,
        network,
    }
}

fn caller_devices() -> DeviceSelection {
    DeviceSelection::new().camera("cam-1").microphone("mic-1")
}

fn callee_devices() -> DeviceSelection {
    DeviceSelection::new().camera("cam-2").microphone("mic-2")
}

async fn connected() -> Harness {
    let harness = harness().await;
    let (caller, callee) = harness
        .call
        .setup_streams(&caller_devices(), &callee_devices())
        .await;
    assert_ok!(caller);
    assert_ok!(callee);
    assert_ok!(harness.call.negotiate().await);

    for role in Role::ALL {
        let mut remote = harness.call.watch_stream(role, Direction::Remote);
        timeout(WAIT, remote.wait_for(StreamSnapshot::is_complete))
            .await
            .expect("remote stream never completed")
            .unwrap();
    }
    harness
}

// ============================================================================
// FULL CALL
// ============================================================================

#[tokio::test]
async fn test_enumerate_lists_synthetic_devices() {
    let harness = harness().await;
    let mut events = harness.call.events().unwrap();

    let devices = assert_ok!(harness.call.enumerate_devices().await);
    assert_eq!(devices.audio_inputs().len(), 2);
    assert_eq!(devices.video_inputs().len(), 3);
    assert!(devices.find("cam-3").is_some());
    assert_eq!(harness.capture.live_track_count(), 0);
    assert_eq!(harness.call.devices(), Some(devices));

    let event = events.try_next().unwrap().unwrap();
    assert_eq!(
        event,
        CallEvent::DevicesEnumerated {
            audio_inputs: 2,
            video_inputs: 3
        }
    );
}

#[tokio::test]
async fn test_each_role_receives_the_peer_devices() {
    let harness = connected().await;
    let call = &harness.call;

    let caller_remote = call.remote_stream(Role::Caller);
    assert_eq!(caller_remote.track(TrackKind::Video).unwrap().device_id(), Some("cam-2"));
    assert_eq!(caller_remote.track(TrackKind::Audio).unwrap().device_id(), Some("mic-2"));

    let callee_remote = call.remote_stream(Role::Callee);
    assert_eq!(callee_remote.track(TrackKind::Video).unwrap().device_id(), Some("cam-1"));
    assert_eq!(callee_remote.track(TrackKind::Audio).unwrap().device_id(), Some("mic-1"));

    for role in Role::ALL {
        assert_eq!(call.endpoint(role).negotiation_state(), NegotiationState::Stable);
        assert!(call.local_stream(role).is_complete());
    }

    let transcript = call.signaling_transcript();
    assert_eq!(transcript[0].message.message_type(), "offer");
    assert_eq!(transcript[0].from, Role::Caller);
    assert!(transcript.iter().any(|envelope| envelope.message.message_type() == "answer"));
}

#[tokio::test]
async fn test_candidates_reach_the_peer_without_drops() {
    let harness = connected().await;

    for role in Role::ALL {
        timeout(WAIT, async {
            while harness.network.connection_state(role) != Some(ConnectionState::Connected) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("endpoint never connected");
        assert_eq!(harness.network.dropped_candidates(role), 0);
        assert!(!harness.network.applied_candidates(role).is_empty());
    }
}

#[tokio::test]
async fn test_negotiation_events_are_reported() {
    let harness = harness().await;
    let mut events = harness.call.events().unwrap();
    let (caller, callee) = harness
        .call
        .setup_streams(&caller_devices(), &callee_devices())
        .await;
    caller.unwrap();
    callee.unwrap();
    harness.call.negotiate().await.unwrap();

    let completed = timeout(WAIT, events.next_matching(|event| {
        matches!(event, CallEvent::NegotiationCompleted { .. })
    }))
    .await
    .unwrap();
    assert_eq!(
        completed,
        Some(CallEvent::NegotiationCompleted {
            offerer: Role::Caller
        })
    );
}

// ============================================================================
// DEVICE SWITCHING
// ============================================================================

#[tokio::test]
async fn test_switch_camera_mid_call() {
    let harness = connected().await;
    let call = &harness.call;
    let old_camera = call.local_stream(Role::Caller).track(TrackKind::Video).cloned().unwrap();
    let mut state = call.endpoint(Role::Caller).watch_state();
    state.borrow_and_update();

    let new_camera = assert_ok!(call.switch_device(Role::Caller, TrackKind::Video, "cam-3").await);

    let transmitted = harness
        .network
        .transmitted_track(Role::Caller, TrackKind::Video)
        .unwrap();
    assert!(transmitted.same_track(&new_camera));
    assert_eq!(transmitted.device_id(), Some("cam-3"));
    assert_eq!(harness.network.sender_count(Role::Caller, TrackKind::Video), 1);

    assert!(!old_camera.is_live());
    assert!(call
        .local_stream(Role::Caller)
        .track(TrackKind::Video)
        .unwrap()
        .same_track(&new_camera));
    assert!(!state.has_changed().unwrap());
    assert_eq!(call.endpoint(Role::Caller).negotiation_state(), NegotiationState::Stable);
    assert!(!call.endpoint(Role::Caller).needs_negotiation());
}

#[tokio::test]
async fn test_switch_leaves_the_other_kind_alone() {
    let harness = connected().await;
    let call = &harness.call;
    let microphone = call.local_stream(Role::Callee).track(TrackKind::Audio).cloned().unwrap();

    call.switch_device(Role::Callee, TrackKind::Video, "cam-1").await.unwrap();

    assert!(microphone.is_live());
    assert!(harness
        .network
        .transmitted_track(Role::Callee, TrackKind::Audio)
        .unwrap()
        .same_track(&microphone));
}

#[tokio::test]
async fn test_switch_without_sender_fails() {
    let harness = harness().await;
    let error = assert_err!(
        harness
            .call
            .switch_device(Role::Caller, TrackKind::Video, "cam-3")
            .await
    );
    assert_eq!(error.error_code(), "SENDER_NOT_FOUND");
    assert_eq!(harness.capture.live_track_count(), 0);
    assert_eq!(
        harness.call.endpoint(Role::Caller).negotiation_state(),
        NegotiationState::New
    );
}

#[tokio::test]
async fn test_switch_to_missing_device_keeps_current_track() {
    let harness = connected().await;
    let call = &harness.call;
    let camera = call.local_stream(Role::Caller).track(TrackKind::Video).cloned().unwrap();

    let error = assert_err!(call.switch_device(Role::Caller, TrackKind::Video, "cam-9").await);
    assert_eq!(error.error_code(), "DEVICE_UNAVAILABLE");
    assert!(camera.is_live());
    assert!(harness
        .network
        .transmitted_track(Role::Caller, TrackKind::Video)
        .unwrap()
        .same_track(&camera));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_switches_keep_sender_and_slot_in_step() {
    let harness = connected().await;
    let call = Arc::new(harness.call);

    for _ in 0..50 {
        let first = {
            let call = call.clone();
            tokio::spawn(async move { call.switch_device(Role::Caller, TrackKind::Video, "cam-3").await })
        };
        let second = {
            let call = call.clone();
            tokio::spawn(async move { call.switch_device(Role::Caller, TrackKind::Video, "cam-1").await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let transmitted = harness
            .network
            .transmitted_track(Role::Caller, TrackKind::Video)
            .unwrap();
        let installed = call
            .local_stream(Role::Caller)
            .track(TrackKind::Video)
            .cloned()
            .unwrap();
        assert!(transmitted.same_track(&installed));
        assert!(transmitted.is_live());
        assert_eq!(harness.network.sender_count(Role::Caller, TrackKind::Video), 1);
    }

    // One microphone and one camera per role
    assert_eq!(harness.capture.live_track_count(), 4);
}

// ============================================================================
// FAILURES
// ============================================================================

/// Loopback transport that refuses to attach video senders
struct AudioOnlyTransport(Arc<dyn PeerTransport>);

#[async_trait]
impl PeerTransport for AudioOnlyTransport {
    async fn create_offer(&self) -> CallResult<SessionDescription> {
        self.0.create_offer().await
    }

    async fn create_answer(&self) -> CallResult<SessionDescription> {
        self.0.create_answer().await
    }

    async fn set_local_description(&self, description: &SessionDescription) -> CallResult<()> {
        self.0.set_local_description(description).await
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> CallResult<()> {
        self.0.set_remote_description(description).await
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> CallResult<()> {
        self.0.add_ice_candidate(candidate).await
    }

    fn attach_track(&self, sender: &Sender, track: &MediaTrack) -> CallResult<()> {
        if track.kind() == TrackKind::Video {
            return Err(CallError::Transport {
                reason: "video is not supported".to_string(),
            });
        }
        self.0.attach_track(sender, track)
    }

    fn replace_track(&self, sender: &Sender, track: &MediaTrack) -> CallResult<()> {
        self.0.replace_track(sender, track)
    }

    fn detach_track(&self, sender: &Sender) -> CallResult<()> {
        self.0.detach_track(sender)
    }

    fn close(&self) {
        self.0.close()
    }
}

struct AudioOnlyNetwork(LoopbackNetwork);

impl TransportConnector for AudioOnlyNetwork {
    fn connect(
        &self,
        role: Role,
        config: &EndpointConfig,
        events: EventSender,
    ) -> CallResult<Arc<dyn PeerTransport>> {
        let inner = self.0.connect(role, config, events)?;
        Ok(Arc::new(AudioOnlyTransport(inner)))
    }
}

#[tokio::test]
async fn test_failed_video_sender_rolls_back_audio() {
    let capture = SyntheticCapture::with_default_devices();
    let network = LoopbackNetwork::new();
    let call = LoopCall::init_with(CallConfig::local_only())
        .unwrap()
        .call()
        .capture(capture.clone())
        .transport(AudioOnlyNetwork(network.clone()))
        .build()
        .await
        .unwrap();

    let error = assert_err!(call.setup_stream(Role::Caller, &caller_devices()).await);
    assert_eq!(error.error_code(), "TRANSPORT_ERROR");

    assert!(call.local_stream(Role::Caller).tracks().is_empty());
    assert!(call.endpoint(Role::Caller).senders().is_empty());
    assert_eq!(network.sender_count(Role::Caller, TrackKind::Audio), 0);
    assert_eq!(capture.live_track_count(), 0);
}

#[tokio::test]
async fn test_negotiate_requires_complete_local_streams() {
    let harness = harness().await;
    harness
        .call
        .setup_stream(Role::Caller, &caller_devices())
        .await
        .unwrap();

    let error = assert_err!(harness.call.negotiate().await);
    assert_eq!(error.error_code(), "INCOMPLETE_LOCAL_STREAM");
    assert!(harness.call.signaling_transcript().is_empty());
}

#[tokio::test]
async fn test_setup_failure_is_isolated_per_role() {
    let harness = harness().await;
    harness.capture.set_busy("cam-2", true);

    let (caller, callee) = harness
        .call
        .setup_streams(&caller_devices(), &callee_devices())
        .await;
    assert_ok!(caller);
    let error = assert_err!(callee);
    assert_eq!(error.error_code(), "DEVICE_UNAVAILABLE");

    assert!(harness.call.local_stream(Role::Caller).is_complete());
    assert!(harness.call.local_stream(Role::Callee).tracks().is_empty());
    // Only the caller's two tracks stay live
    assert_eq!(harness.capture.live_track_count(), 2);
}

#[tokio::test]
async fn test_denied_access_fails_setup() {
    let harness = harness().await;
    harness.capture.deny_access(true);

    let error = assert_err!(
        harness
            .call
            .setup_stream(Role::Caller, &DeviceSelection::new())
            .await
    );
    assert_eq!(error.error_code(), "DEVICE_UNAVAILABLE");
    assert!(error.to_string().contains("default"));
    assert_eq!(harness.capture.live_track_count(), 0);
}

// ============================================================================
// HANG UP
// ============================================================================

#[tokio::test]
async fn test_hang_up_releases_everything() {
    let harness = connected().await;
    let mut events = harness.call.events().unwrap();

    harness.call.hang_up().await;

    assert!(harness.call.is_ended());
    assert_eq!(harness.capture.live_track_count(), 0);
    for role in Role::ALL {
        assert_eq!(
            harness.call.endpoint(role).negotiation_state(),
            NegotiationState::Closed
        );
        assert!(harness.call.local_stream(role).tracks().is_empty());
        assert!(harness.call.remote_stream(role).tracks().is_empty());
    }

    let ended = timeout(WAIT, events.next_matching(|event| *event == CallEvent::CallEnded))
        .await
        .unwrap();
    assert_eq!(ended, Some(CallEvent::CallEnded));

    let error = assert_err!(harness.call.negotiate().await);
    assert_eq!(error.error_code(), "CALL_ENDED");

    // Second hang up is a no-op
    harness.call.hang_up().await;
}

#[cfg(feature = "diagnostics")]
#[tokio::test]
async fn test_report_reflects_stable_call() {
    let harness = connected().await;
    let report = harness.call.report().await;

    assert!(report.is_stable());
    assert_eq!(report.streams.len(), 4);
    assert_eq!(report.endpoint(Role::Caller).unwrap().senders.len(), 2);
    assert!(report.signaling_messages >= 2);
}
