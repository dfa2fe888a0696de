//! Mock relay example.
//!
//! Relays a synthetic 440Hz tone into a WAV file, the same way a live relay
//! would feed a voice channel. No audio hardware required.
//!
//! Run with: cargo run --example mock_relay

use std::sync::Arc;
use std::time::Duration;

use session_relay::{MockEngine, MockSignal, Relay, WavTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    println!("Relaying a test tone to mock_relay.wav for 3 seconds...");

    let relay = Relay::builder()
        .engine(
            MockEngine::new(1)
                .with_signal(MockSignal::Sine {
                    frequency: 440.0,
                    amplitude: 0.8,
                })
                .with_frames_per_update(960),
        )
        .gain_db(-10.0)
        .on_event(|event| println!("event: {event:?}"))
        .build()?;

    // Plays the part of the gateway: voice becomes ready, then a quit command
    let link = relay.link();
    tokio::spawn(async move {
        if let Err(e) = link
            .voice_ready(Arc::new(WavTransport::new("mock_relay.wav")))
            .await
        {
            eprintln!("voice_ready failed: {e}");
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        link.request_exit();
    });

    let stats = relay.run().await;

    println!("Recording saved to mock_relay.wav");
    println!("Stats: {stats:?}");

    Ok(())
}
