//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use party_hub::game::GameConfig;
use party_hub::sim::{ScriptedHost, SimulatedAudio};
use party_hub::{
    Capabilities, ManualClock, RoundEvent, Scenario, SessionStatus, TranscriptAggregator,
};
use tokio::sync::broadcast;

/// Scripted environment for one round
pub struct Rig {
    pub host: Arc<ScriptedHost>,
    pub audio: Arc<SimulatedAudio>,
    pub transcript: Arc<TranscriptAggregator>,
    pub clock: Arc<ManualClock>,
}

impl Rig {
    /// Connected, immediately ready audio and a host answering `scenario`
    pub fn new(scenario: Scenario) -> Self {
        Self::with_host(ScriptedHost::new(scenario))
    }

    /// Same as [`Rig::new`] with a custom host
    pub fn with_host(host: ScriptedHost) -> Self {
        let transcript = Arc::new(TranscriptAggregator::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let audio = SimulatedAudio::new(Duration::ZERO)
            .with_transcript(Arc::clone(&transcript), clock.clone());
        audio.set_status(SessionStatus::Connected);

        Self {
            host: Arc::new(host),
            audio: Arc::new(audio),
            transcript,
            clock,
        }
    }

    /// Capabilities to hand to a controller
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            host: self.host.clone(),
            audio: self.audio.clone(),
            transcript: self.transcript.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// Create a test scenario
pub fn scenario(id: &str, prompt: &str) -> Scenario {
    Scenario {
        id: id.to_string(),
        prompt: prompt.to_string(),
        ..Scenario::default()
    }
}

/// Game with a 2 s host turn
///
/// With the default 1 s scenario delay and the 3 s countdown, play begins at
/// 3 s and the talk window opens (and the timer starts) at 5 s.
pub fn quick_game(duration_secs: u32) -> GameConfig {
    GameConfig::new("test-game", "Test Game", "Say something!")
        .with_duration(duration_secs)
        .with_host_delay(Duration::from_secs(2))
}

/// Sleep on the (paused) tokio clock
pub async fn wait_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Drain every event received so far
pub fn drain(events: &mut broadcast::Receiver<RoundEvent>) -> Vec<RoundEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
