//! Device relay example.
//!
//! Captures an input device (pass a loopback of your mixer's output) and
//! relays it in 60ms frames over a channel, printing what a voice client
//! would receive.
//!
//! Run with: cargo run --example device_relay -- "Monitor of Built-in Audio"
//!
//! Without an argument the default input device is used. Set `RUST_LOG=debug`
//! for per-tick diagnostics.

use std::sync::Arc;
use std::time::Duration;

use session_relay::{list_input_devices, ChannelTransport, DeviceEngine, PcmFrame, Relay};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Input devices:");
    for name in list_input_devices()? {
        println!("  {name}");
    }

    let engine = match std::env::args().nth(1) {
        Some(name) => DeviceEngine::open_by_name(&name)?,
        None => DeviceEngine::open_default()?,
    };

    let relay = Relay::builder()
        .engine(engine)
        .on_event(|event| tracing::warn!(?event, "relay event"))
        .build()?;
    println!("Relaying from '{}' for 10 seconds...", relay.engine_name());

    let (tx, mut rx) = mpsc::channel::<PcmFrame>(8);
    let link = relay.link();
    link.voice_ready(Arc::new(ChannelTransport::new(tx).require_frame_size(
        relay.config().frame_size,
    )))
    .await?;

    // Stands in for the voice client
    tokio::spawn(async move {
        let mut frames = 0u64;
        while let Some(frame) = rx.recv().await {
            frames += 1;
            if frames % 50 == 0 {
                println!(
                    "frame #{}: {} bytes, signal={}",
                    frame.sequence,
                    frame.as_bytes().len(),
                    frame.has_signal()
                );
            }
        }
    });

    let exit_link = link.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        exit_link.request_exit();
    });

    let stats = relay.run().await;
    println!("Stats: {stats:?}");

    Ok(())
}
