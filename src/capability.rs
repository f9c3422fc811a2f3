//! Capabilities supplied by the environment
//!
//! The core never talks to a language model, a WebRTC stack, or a
//! recognizer directly. It reaches them through these traits.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::Result;
use crate::game::GameConfig;

/// Scenario produced by the host for one round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario id
    #[serde(default)]
    pub id: String,
    /// Text the host reads to set the scene
    #[serde(default, alias = "problem")]
    pub prompt: String,
    /// Optional subject (a country, a suspect, a product...)
    #[serde(default)]
    pub subject: Option<String>,
    /// Optional opening phrase spoken by the host's character
    #[serde(default, alias = "childQuote")]
    pub opening_line: Option<String>,
    /// Any other structured fields the host sent
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The AI host driving a round
#[async_trait]
pub trait HostAgent: Send + Sync {
    /// Ask the host to start a game and describe the scenario
    ///
    /// # Errors
    ///
    /// Returns `Error::HostUnavailable` if the host cannot be reached
    async fn request_scenario(&self, game: &GameConfig) -> Result<Scenario>;

    /// Send text to the host as if the player said it
    ///
    /// # Errors
    ///
    /// Returns error if the host cannot be reached
    async fn send_player_text(&self, text: &str) -> Result<()>;
}

/// The realtime audio session used for push-to-talk
#[async_trait]
pub trait AudioSession: Send + Sync {
    /// Whether the session is connected
    fn is_connected(&self) -> bool;

    /// Whether the data channel is ready for capture
    fn is_ready(&self) -> bool;

    /// Cut off any host speech in progress
    fn interrupt_host_speech(&self);

    /// Let the session detect speech turns itself instead of waiting for
    /// explicit captures
    fn set_hands_free(&self, _enabled: bool) {}

    /// Begin capturing player audio
    ///
    /// # Errors
    ///
    /// Returns error if capture cannot start
    async fn start_capture(&self) -> Result<()>;

    /// Stop capturing player audio
    ///
    /// # Errors
    ///
    /// Returns error if capture cannot stop cleanly
    async fn stop_capture(&self) -> Result<()>;
}

/// Connection status of an audio session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// No session
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Session established
    Connected,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Readiness of a session's data channel
///
/// A freshly connected session needs a short grace period before capture
/// commands are delivered reliably. Any status other than `Connected`
/// clears readiness immediately.
#[derive(Debug, Clone)]
pub struct SessionReadiness {
    status: SessionStatus,
    connected_at: Option<Instant>,
    grace: Duration,
}

impl SessionReadiness {
    /// Create a tracker with the given grace period
    #[must_use]
    pub const fn new(grace: Duration) -> Self {
        Self {
            status: SessionStatus::Disconnected,
            connected_at: None,
            grace,
        }
    }

    /// Record a status change
    pub fn set_status(&mut self, status: SessionStatus, now: Instant) {
        if status == self.status {
            return;
        }

        tracing::debug!(from = %self.status, to = %status, "audio session status changed");
        self.status = status;
        self.connected_at = (status == SessionStatus::Connected).then_some(now);
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Whether the session is connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    /// Whether the grace period has elapsed since connecting
    #[must_use]
    pub fn is_ready(&self, now: Instant) -> bool {
        self.connected_at
            .is_some_and(|at| now.saturating_duration_since(at) >= self.grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_accepts_host_field_names() {
        let scenario: Scenario = serde_json::from_str(
            r#"{"id":"s1","problem":"My hamster escaped","childQuote":"Help!","goodAdviceKeywords":["calm"]}"#,
        )
        .unwrap();

        assert_eq!(scenario.prompt, "My hamster escaped");
        assert_eq!(scenario.opening_line.as_deref(), Some("Help!"));
        assert!(scenario.extra.contains_key("goodAdviceKeywords"));
    }

    #[test]
    fn readiness_requires_grace_after_connect() {
        let start = Instant::now();
        let mut readiness = SessionReadiness::new(Duration::from_secs(2));
        assert!(!readiness.is_ready(start));

        readiness.set_status(SessionStatus::Connected, start);
        assert!(readiness.is_connected());
        assert!(!readiness.is_ready(start + Duration::from_secs(1)));
        assert!(readiness.is_ready(start + Duration::from_secs(2)));

        readiness.set_status(SessionStatus::Connecting, start + Duration::from_secs(3));
        assert!(!readiness.is_connected());
        assert!(!readiness.is_ready(start + Duration::from_secs(10)));
    }

    #[test]
    fn status_display() {
        assert_eq!(SessionStatus::Connected.to_string(), "connected");
        assert_eq!(SessionStatus::Disconnected.to_string(), "disconnected");
    }
}
