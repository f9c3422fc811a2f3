//! Scripted in-process capabilities
//!
//! Stand-ins for the realtime host and audio session, used by the CLI's
//! offline play mode and by tests. They honour the same contracts as the
//! real capabilities (readiness grace, capture latency, transcript timing)
//! so rounds behave the same against them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::capability::{AudioSession, HostAgent, Scenario, SessionReadiness, SessionStatus};
use crate::clock::{Clock, SystemClock};
use crate::game::GameConfig;
use crate::transcript::{Role, TranscriptAggregator, TranscriptEntry};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct AudioState {
    active: usize,
    peak: usize,
    starts: usize,
    stops: usize,
    interruptions: usize,
    hands_free: bool,
    fail_next: bool,
    capture_started_ms: Option<u64>,
    queued: VecDeque<String>,
}

/// Audio session that "hears" queued utterances
///
/// Each utterance queued with [`SimulatedAudio::queue_utterance`] is
/// recognised when the next capture stops, and appended to the transcript as
/// a player entry stamped after the capture started.
pub struct SimulatedAudio {
    readiness: Mutex<SessionReadiness>,
    state: Mutex<AudioState>,
    capture_latency: Duration,
    transcript: Option<Arc<TranscriptAggregator>>,
    clock: Arc<dyn Clock>,
}

impl SimulatedAudio {
    /// Disconnected session with the given readiness grace period
    #[must_use]
    pub fn new(readiness_grace: Duration) -> Self {
        Self {
            readiness: Mutex::new(SessionReadiness::new(readiness_grace)),
            state: Mutex::new(AudioState::default()),
            capture_latency: Duration::ZERO,
            transcript: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Write recognised speech into `transcript`, stamped by `clock`
    #[must_use]
    pub fn with_transcript(mut self, transcript: Arc<TranscriptAggregator>, clock: Arc<dyn Clock>) -> Self {
        self.transcript = Some(transcript);
        self.clock = clock;
        self
    }

    /// Delay every capture start and stop by `latency`
    #[must_use]
    pub const fn with_capture_latency(mut self, latency: Duration) -> Self {
        self.capture_latency = latency;
        self
    }

    /// Change the connection status
    pub fn set_status(&self, status: SessionStatus) {
        self.readiness
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_status(status, Instant::now());
    }

    /// Current connection status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.readiness
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
    }

    /// Queue text to be recognised when the next capture stops
    pub fn queue_utterance(&self, text: impl Into<String>) {
        self.lock().queued.push_back(text.into());
    }

    /// Make the next capture start fail
    pub fn fail_next_capture(&self) {
        self.lock().fail_next = true;
    }

    /// Captures currently running
    #[must_use]
    pub fn active_captures(&self) -> usize {
        self.lock().active
    }

    /// Most captures ever running at once
    #[must_use]
    pub fn peak_captures(&self) -> usize {
        self.lock().peak
    }

    /// Captures started so far
    #[must_use]
    pub fn starts(&self) -> usize {
        self.lock().starts
    }

    /// Captures stopped so far
    #[must_use]
    pub fn stops(&self) -> usize {
        self.lock().stops
    }

    /// Times host speech was interrupted
    #[must_use]
    pub fn interruptions(&self) -> usize {
        self.lock().interruptions
    }

    /// Whether the session was switched to hands-free
    #[must_use]
    pub fn is_hands_free(&self) -> bool {
        self.lock().hands_free
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn latency(&self) {
        if !self.capture_latency.is_zero() {
            tokio::time::sleep(self.capture_latency).await;
        }
    }
}

#[async_trait]
impl AudioSession for SimulatedAudio {
    fn is_connected(&self) -> bool {
        self.readiness
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_connected()
    }

    fn is_ready(&self) -> bool {
        self.readiness
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_ready(Instant::now())
    }

    fn interrupt_host_speech(&self) {
        self.lock().interruptions += 1;
    }

    fn set_hands_free(&self, enabled: bool) {
        self.lock().hands_free = enabled;
    }

    async fn start_capture(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.fail_next {
                state.fail_next = false;
                return Err(Error::Audio("simulated capture failure".to_string()));
            }
        }

        self.latency().await;

        let now = self.clock.now_ms();
        let mut state = self.lock();
        state.starts += 1;
        state.active += 1;
        state.peak = state.peak.max(state.active);
        state.capture_started_ms = Some(now);
        tracing::trace!(active = state.active, "simulated capture started");
        Ok(())
    }

    async fn stop_capture(&self) -> Result<()> {
        self.latency().await;

        let now = self.clock.now_ms();
        let (heard, started) = {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
            state.stops += 1;
            (state.queued.pop_front(), state.capture_started_ms.take())
        };

        if let (Some(transcript), Some(text)) = (&self.transcript, heard) {
            // Recognition results always land after the window opened
            let created_at_ms = started.map_or(now, |at| now.max(at + 1));
            transcript.append(TranscriptEntry::new(Role::Player, text, created_at_ms));
        }

        tracing::trace!("simulated capture stopped");
        Ok(())
    }
}

impl std::fmt::Debug for SimulatedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedAudio")
            .field("status", &self.status())
            .field("active", &self.active_captures())
            .field("hands_free", &self.is_hands_free())
            .finish_non_exhaustive()
    }
}

/// Host that answers with a fixed scenario
#[derive(Debug)]
pub struct ScriptedHost {
    scenario: Option<Scenario>,
    latency: Duration,
    failures_left: AtomicUsize,
    requests: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl ScriptedHost {
    /// Host that always produces `scenario`
    #[must_use]
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario: Some(scenario),
            latency: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Host that can never be reached
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            scenario: None,
            ..Self::new(Scenario::default())
        }
    }

    /// Fail the first `times` scenario requests
    #[must_use]
    pub fn failing_first(self, times: usize) -> Self {
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }

    /// Delay every scenario response by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Scenario requests received
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Text sent to the host, in order
    #[must_use]
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HostAgent for ScriptedHost {
    async fn request_scenario(&self, game: &GameConfig) -> Result<Scenario> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::HostUnavailable(format!("{} host did not answer", game.id)));
        }

        self.scenario
            .clone()
            .ok_or_else(|| Error::HostUnavailable("host unreachable".to_string()))
    }

    async fn send_player_text(&self, text: &str) -> Result<()> {
        if self.scenario.is_none() {
            return Err(Error::HostUnavailable("host unreachable".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        Ok(())
    }
}
