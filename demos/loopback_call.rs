//! Runs a full loopback call: enumerate, capture, negotiate, switch camera, hang up.
//!
//! ```sh
//! RUST_LOG=loopcall=debug cargo run --example loopback_call
//! ```

use anyhow::Result;
use loopcall::{CallConfig, CallEvent, DebugLogger, DeviceSelection, LoopCall, Role, TrackKind};

#[tokio::main]
async fn main() -> Result<()> {
    DebugLogger::new().with_target(false).init();

    let loopcall = LoopCall::init_with(CallConfig {
        candidate_events: true,
        ..CallConfig::default()
    })?;
    let call = loopcall.call().build().await?;
    let mut events = call
        .events()
        .ok_or_else(|| anyhow::anyhow!("event stream already taken"))?;

    let devices = call.enumerate_devices().await?;
    for device in devices.all() {
        println!("🎛️  {} {} ({})", device.kind, device.id, device.label);
    }

    let (caller, callee) = call
        .setup_streams(
            &DeviceSelection::new().camera("cam-1").microphone("mic-1"),
            &DeviceSelection::new().camera("cam-2").microphone("mic-2"),
        )
        .await;
    caller?;
    callee?;

    call.negotiate().await?;
    call.switch_device(Role::Caller, TrackKind::Video, "cam-3").await?;

    // Give candidate gathering a moment to settle
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    println!("{}", call.signaling().transcript_json()?);
    println!("{}", call.report().await.to_json_pretty()?);

    call.hang_up().await;
    while let Ok(Some(event)) = events.try_next() {
        if let CallEvent::Error { role, error, .. } = &event {
            eprintln!("⚠️  {:?}: {}", role, error);
        } else {
            println!("📣 {}", event.event_type());
        }
    }

    Ok(())
}
