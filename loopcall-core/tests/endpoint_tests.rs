//! Integration tests for connection endpoints over the loopback transport
//!
//! Both endpoints are driven by hand here; the signaling crate automates the
//! same exchange.

use loopcall_core::*;
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

fn pair(network: &LoopbackNetwork) -> (ConnectionEndpoint, ConnectionEndpoint) {
    let caller = ConnectionEndpoint::new(Role::Caller, EndpointConfig::default(), network).unwrap();
    let callee = ConnectionEndpoint::new(Role::Callee, EndpointConfig::default(), network).unwrap();
    (caller, callee)
}

fn add_full_stream(endpoint: &ConnectionEndpoint, mic: &str, cam: &str) {
    endpoint
        .add_track(MediaTrack::capture(TrackKind::Audio, mic, mic))
        .unwrap();
    endpoint
        .add_track(MediaTrack::capture(TrackKind::Video, cam, cam))
        .unwrap();
}

async fn gathered(events: &mut EndpointEvents) -> Vec<IceCandidate> {
    let mut candidates = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(2), events.next())
            .await
            .expect("gathering timed out")
            .expect("event stream closed");
        match event {
            EndpointEvent::CandidateDiscovered { candidate } => candidates.push(candidate),
            EndpointEvent::GatheringComplete => return candidates,
            _ => {}
        }
    }
}

fn drain(events: &mut EndpointEvents) -> Vec<EndpointEvent> {
    let mut drained = Vec::new();
    while let Ok(Some(event)) = events.try_next() {
        drained.push(event);
    }
    drained
}

fn received_tracks(events: &[EndpointEvent]) -> Vec<MediaTrack> {
    events
        .iter()
        .filter_map(|event| match event {
            EndpointEvent::TrackReceived { track } => Some(track.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// State machine
// ============================================================================

#[tokio::test]
async fn test_create_answer_on_new_endpoint_fails() {
    let network = LoopbackNetwork::new();
    let (_caller, callee) = pair(&network);

    let error = assert_err!(callee.create_answer().await);
    assert!(matches!(
        error,
        CallError::Negotiation {
            role: Role::Callee,
            state: NegotiationState::New,
            ..
        }
    ));
    assert_eq!(callee.negotiation_state(), NegotiationState::New);
}

#[tokio::test]
async fn test_remote_answer_without_offer_fails() {
    let network = LoopbackNetwork::new();
    let (caller, _callee) = pair(&network);

    let answer = SessionDescription::answer("v=0\r\n");
    assert_err!(caller.set_remote_description(answer).await);
    assert_eq!(caller.negotiation_state(), NegotiationState::New);
    assert!(caller.remote_description().await.is_none());
}

#[tokio::test]
async fn test_manual_negotiation_reaches_stable() {
    let network = LoopbackNetwork::new();
    let (caller, callee) = pair(&network);
    add_full_stream(&caller, "mic-1", "cam-1");
    add_full_stream(&callee, "mic-2", "cam-2");
    let mut callee_events = callee.take_events().unwrap();
    let mut caller_events = caller.take_events().unwrap();

    let offer = assert_ok!(caller.create_offer().await);
    assert_eq!(caller.negotiation_state(), NegotiationState::HaveLocalOffer);
    assert_ok!(caller.set_local_description(offer.clone()).await);
    assert_eq!(caller.negotiation_state(), NegotiationState::HaveLocalOffer);

    assert_ok!(callee.set_remote_description(offer.clone()).await);
    assert_eq!(callee.negotiation_state(), NegotiationState::HaveRemoteOffer);

    let answer = assert_ok!(callee.create_answer().await);
    assert_ok!(callee.set_local_description(answer.clone()).await);
    assert_ok!(caller.set_remote_description(answer.clone()).await);

    assert_eq!(caller.negotiation_state(), NegotiationState::Stable);
    assert_eq!(callee.negotiation_state(), NegotiationState::Stable);
    assert_eq!(caller.remote_description().await, callee.local_description().await);
    assert_eq!(callee.remote_description().await, caller.local_description().await);

    let callee_received = received_tracks(&drain(&mut callee_events));
    assert_eq!(callee_received.len(), 2);
    assert!(callee_received.iter().all(|track| track.is_remote()));
    assert!(callee_received.iter().any(|track| track.device_id() == Some("cam-1")));

    let caller_received = received_tracks(&drain(&mut caller_events));
    let kinds: Vec<TrackKind> = caller_received.iter().map(MediaTrack::kind).collect();
    assert!(kinds.contains(&TrackKind::Audio));
    assert!(kinds.contains(&TrackKind::Video));
}

#[tokio::test]
async fn test_reapplying_descriptions_is_idempotent() {
    let network = LoopbackNetwork::new();
    let (caller, callee) = pair(&network);
    add_full_stream(&caller, "mic-1", "cam-1");
    let mut callee_events = callee.take_events().unwrap();

    let offer = caller.create_offer().await.unwrap();
    assert_ok!(caller.set_local_description(offer.clone()).await);
    assert_ok!(caller.set_local_description(offer.clone()).await);

    assert_ok!(callee.set_remote_description(offer.clone()).await);
    let first = drain(&mut callee_events);
    assert_ok!(callee.set_remote_description(offer).await);
    let second = drain(&mut callee_events);

    assert_eq!(received_tracks(&first).len(), 2);
    assert!(second.is_empty());
    assert_eq!(callee.negotiation_state(), NegotiationState::HaveRemoteOffer);
}

// ============================================================================
// Candidate buffering
// ============================================================================

#[tokio::test]
async fn test_early_candidates_applied_once_after_remote_description() {
    let network = LoopbackNetwork::new();
    let (caller, callee) = pair(&network);
    add_full_stream(&caller, "mic-1", "cam-1");
    let mut caller_events = caller.take_events().unwrap();

    let offer = caller.create_offer().await.unwrap();
    caller.set_local_description(offer.clone()).await.unwrap();
    let candidates = gathered(&mut caller_events).await;
    assert_eq!(candidates.len(), 3);

    for candidate in &candidates {
        let outcome = assert_ok!(callee.add_remote_candidate(candidate.clone()).await);
        assert_eq!(outcome, CandidateOutcome::Queued);
    }
    let outcome = assert_ok!(callee.add_remote_candidate(candidates[0].clone()).await);
    assert_eq!(outcome, CandidateOutcome::Duplicate);
    assert_eq!(callee.queued_candidate_count().await, 3);
    assert!(network.applied_candidates(Role::Callee).is_empty());

    callee.set_remote_description(offer).await.unwrap();

    assert_eq!(callee.queued_candidate_count().await, 0);
    assert_eq!(callee.applied_candidate_count().await, 3);
    assert_eq!(network.applied_candidates(Role::Callee), candidates);
    assert_eq!(network.dropped_candidates(Role::Callee), 0);

    let outcome = assert_ok!(callee.add_remote_candidate(candidates[1].clone()).await);
    assert_eq!(outcome, CandidateOutcome::Duplicate);
    assert_eq!(network.applied_candidates(Role::Callee).len(), 3);
}

#[tokio::test]
async fn test_malformed_buffered_candidate_is_skipped() {
    let network = LoopbackNetwork::new();
    let (caller, callee) = pair(&network);
    add_full_stream(&caller, "mic-1", "cam-1");

    let good = IceCandidate::new("candidate:7 1 udp 2130706431 127.0.0.1 50000 typ host");
    let bad = IceCandidate::new("not a candidate");
    assert_ok!(callee.add_remote_candidate(bad.clone()).await);
    assert_ok!(callee.add_remote_candidate(good.clone()).await);

    let offer = caller.create_offer().await.unwrap();
    assert_ok!(callee.set_remote_description(offer).await);

    assert_eq!(network.applied_candidates(Role::Callee), vec![good]);
    assert_eq!(callee.negotiation_state(), NegotiationState::HaveRemoteOffer);

    let error = assert_err!(callee.add_remote_candidate(bad).await);
    assert_eq!(error.error_code(), "INVALID_CANDIDATE");
}

// ============================================================================
// Senders
// ============================================================================

#[tokio::test]
async fn test_replace_for_missing_sender_leaves_state_unchanged() {
    let network = LoopbackNetwork::new();
    let (caller, _callee) = pair(&network);
    caller
        .add_track(MediaTrack::capture(TrackKind::Audio, "mic-1", "Microphone 1"))
        .unwrap();
    let offer = caller.create_offer().await.unwrap();
    caller.set_local_description(offer).await.unwrap();

    let stale = Sender {
        id: Uuid::new_v4(),
        role: Role::Caller,
        kind: TrackKind::Video,
    };
    let replacement = MediaTrack::capture(TrackKind::Video, "cam-3", "Camera 3");
    let error = assert_err!(caller.replace_sender_track(&stale, replacement.clone()));

    assert!(matches!(
        error,
        CallError::SenderNotFound {
            role: Role::Caller,
            kind: TrackKind::Video
        }
    ));
    assert_eq!(caller.negotiation_state(), NegotiationState::HaveLocalOffer);
    assert_eq!(caller.senders().len(), 1);
    assert!(replacement.is_live());
}

#[tokio::test]
async fn test_replace_keeps_negotiation_state() {
    let network = LoopbackNetwork::new();
    let (caller, callee) = pair(&network);
    add_full_stream(&caller, "mic-1", "cam-1");
    add_full_stream(&callee, "mic-2", "cam-2");

    let offer = caller.create_offer().await.unwrap();
    caller.set_local_description(offer.clone()).await.unwrap();
    callee.set_remote_description(offer).await.unwrap();
    let answer = callee.create_answer().await.unwrap();
    callee.set_local_description(answer.clone()).await.unwrap();
    caller.set_remote_description(answer).await.unwrap();

    let mut state = caller.watch_state();
    state.borrow_and_update();

    let sender = caller.sender_for(TrackKind::Video).unwrap();
    let previous = assert_ok!(caller.replace_sender_track(
        &sender,
        MediaTrack::capture(TrackKind::Video, "cam-3", "Camera 3")
    ));

    assert_eq!(previous.device_id(), Some("cam-1"));
    assert!(!state.has_changed().unwrap());
    assert_eq!(caller.negotiation_state(), NegotiationState::Stable);
    assert_eq!(network.sender_count(Role::Caller, TrackKind::Video), 1);
    assert_eq!(
        network
            .transmitted_track(Role::Caller, TrackKind::Video)
            .unwrap()
            .device_id(),
        Some("cam-3")
    );
}

#[tokio::test]
async fn test_new_kind_after_negotiation_requests_renegotiation() {
    let network = LoopbackNetwork::new();
    let (caller, callee) = pair(&network);
    caller
        .add_track(MediaTrack::capture(TrackKind::Audio, "mic-1", "Microphone 1"))
        .unwrap();
    let mut caller_events = caller.take_events().unwrap();
    let mut callee_events = callee.take_events().unwrap();

    let offer = caller.create_offer().await.unwrap();
    caller.set_local_description(offer.clone()).await.unwrap();
    callee.set_remote_description(offer).await.unwrap();
    let answer = callee.create_answer().await.unwrap();
    callee.set_local_description(answer.clone()).await.unwrap();
    caller.set_remote_description(answer).await.unwrap();
    drain(&mut callee_events);
    drain(&mut caller_events);

    caller
        .add_track(MediaTrack::capture(TrackKind::Video, "cam-1", "Camera 1"))
        .unwrap();
    assert!(caller.needs_negotiation());
    assert!(drain(&mut caller_events)
        .iter()
        .any(|event| matches!(event, EndpointEvent::NegotiationNeeded)));

    let offer = assert_ok!(caller.create_offer().await);
    assert!(!caller.needs_negotiation());
    caller.set_local_description(offer.clone()).await.unwrap();
    callee.set_remote_description(offer).await.unwrap();

    let received = received_tracks(&drain(&mut callee_events));
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].kind(), TrackKind::Video);
}

#[tokio::test]
async fn test_remove_track_detaches_sender() {
    let network = LoopbackNetwork::new();
    let (caller, _callee) = pair(&network);
    add_full_stream(&caller, "mic-1", "cam-1");

    let video = caller.sender_for(TrackKind::Video).unwrap();
    let detached = assert_ok!(caller.remove_track(&video));

    assert!(detached.is_live());
    assert!(caller.sender_for(TrackKind::Video).is_none());
    assert_eq!(network.sender_count(Role::Caller, TrackKind::Video), 0);
    assert_err!(caller.remove_track(&video));
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_close_rejects_later_negotiation() {
    let network = LoopbackNetwork::new();
    let (caller, _callee) = pair(&network);
    let track = MediaTrack::capture(TrackKind::Audio, "mic-1", "Microphone 1");
    caller.add_track(track.clone()).unwrap();

    caller.close().await;
    caller.close().await;

    assert_eq!(caller.negotiation_state(), NegotiationState::Closed);
    assert_eq!(network.connection_state(Role::Caller), Some(ConnectionState::Closed));
    assert!(track.is_live());
    assert!(caller.senders().is_empty());
    assert_err!(caller.create_offer().await);
    assert_err!(caller.add_track(MediaTrack::capture(TrackKind::Video, "cam-1", "Camera 1")));
    assert_err!(
        caller
            .add_remote_candidate(IceCandidate::new("candidate:1 1 udp 1 127.0.0.1 5000 typ host"))
            .await
    );
}
