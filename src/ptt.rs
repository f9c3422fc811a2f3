//! Push-to-talk coordination
//!
//! Owns the open/closed state of the player's capture window. The state
//! flips before the audio capability is awaited, so a second press that
//! arrives while capture is still starting sees the window as open and is
//! turned away instead of opening a second capture channel.
//!
//! In [`TalkMode::HandsFree`] the audio session detects speech turns itself
//! and the talk button is inert.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::capability::AudioSession;
use crate::clock::Clock;
use crate::{Error, Result};

/// How the player's speech is delimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TalkMode {
    /// Speech is captured only while the talk button is held
    #[default]
    PushToTalk,
    /// The audio session detects speech turns on its own
    HandsFree,
}

impl std::fmt::Display for TalkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PushToTalk => write!(f, "push-to-talk"),
            Self::HandsFree => write!(f, "hands-free"),
        }
    }
}

impl std::str::FromStr for TalkMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push-to-talk" | "ptt" => Ok(Self::PushToTalk),
            "hands-free" | "vad" => Ok(Self::HandsFree),
            other => Err(Error::Config(format!("unknown talk mode: {other}"))),
        }
    }
}

/// Snapshot of the capture window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PttSession {
    /// Whether the window is open
    pub is_open: bool,
    /// When the most recent window opened
    pub opened_at_ms: Option<u64>,
}

/// Result of a request to open the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Capture started
    Opened {
        /// Lower bound for speech belonging to this window
        opened_at_ms: u64,
    },
    /// A window is already open
    AlreadyOpen,
    /// The previous window is still shutting down
    Busy,
    /// The audio session is not connected or not ready
    Unavailable,
    /// Hands-free mode; the session listens without the button
    HandsFree,
}

/// Result of a request to close the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Capture stopped; speech after `opened_at_ms` is final
    Closed {
        /// When the window that just closed had opened
        opened_at_ms: u64,
    },
    /// No window was open
    NotOpen,
}

#[derive(Debug, Default)]
struct Inner {
    session: PttSession,
    stopping: bool,
    mode: TalkMode,
}

/// Mediates the player's capture window and barge-in
pub struct PushToTalkCoordinator {
    audio: Arc<dyn AudioSession>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl PushToTalkCoordinator {
    /// Create a coordinator over an audio session
    #[must_use]
    pub fn new(audio: Arc<dyn AudioSession>, clock: Arc<dyn Clock>) -> Self {
        Self {
            audio,
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Current window state
    #[must_use]
    pub fn session(&self) -> PttSession {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .session
    }

    /// Current talk mode
    #[must_use]
    pub fn mode(&self) -> TalkMode {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mode
    }

    /// Switch between push-to-talk and hands-free
    ///
    /// Switching to hands-free closes a window that is still open.
    ///
    /// # Errors
    ///
    /// Returns error if closing the open window fails to stop capture
    pub async fn set_mode(&self, mode: TalkMode) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.mode == mode {
                return Ok(());
            }
            inner.mode = mode;
        }

        tracing::info!(%mode, "talk mode changed");
        self.audio.set_hands_free(mode == TalkMode::HandsFree);

        if mode == TalkMode::HandsFree {
            self.close().await?;
        }
        Ok(())
    }

    /// Whether a window could be opened right now
    #[must_use]
    pub fn can_open(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.mode == TalkMode::PushToTalk
            && !inner.session.is_open
            && !inner.stopping
            && self.audio_ready()
    }

    fn audio_ready(&self) -> bool {
        self.audio.is_connected() && self.audio.is_ready()
    }

    /// Open the capture window, interrupting the host
    ///
    /// # Errors
    ///
    /// Returns error if the audio capability fails to start capture. The
    /// window is closed again in that case.
    pub async fn open(&self) -> Result<OpenOutcome> {
        let opened_at_ms = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

            if inner.mode == TalkMode::HandsFree {
                tracing::debug!("hands-free mode, talk button ignored");
                return Ok(OpenOutcome::HandsFree);
            }
            if inner.session.is_open {
                tracing::debug!("push-to-talk already open");
                return Ok(OpenOutcome::AlreadyOpen);
            }
            if inner.stopping {
                tracing::debug!("push-to-talk still closing");
                return Ok(OpenOutcome::Busy);
            }
            if !self.audio_ready() {
                tracing::warn!(
                    connected = self.audio.is_connected(),
                    ready = self.audio.is_ready(),
                    "push-to-talk refused, audio session not ready"
                );
                return Ok(OpenOutcome::Unavailable);
            }

            self.audio.interrupt_host_speech();
            let now = self.clock.now_ms();
            inner.session = PttSession {
                is_open: true,
                opened_at_ms: Some(now),
            };
            now
        };

        if let Err(e) = self.audio.start_capture().await {
            tracing::error!(error = %e, "failed to start capture");
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.session.opened_at_ms == Some(opened_at_ms) {
                inner.session.is_open = false;
            }
            return Err(e);
        }

        tracing::debug!(opened_at_ms, "push-to-talk opened");
        Ok(OpenOutcome::Opened { opened_at_ms })
    }

    /// Close the capture window
    ///
    /// # Errors
    ///
    /// Returns error if the audio capability fails to stop capture. The
    /// window is considered closed regardless.
    pub async fn close(&self) -> Result<CloseOutcome> {
        let opened_at_ms = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if !inner.session.is_open {
                return Ok(CloseOutcome::NotOpen);
            }
            inner.session.is_open = false;
            inner.stopping = true;
            inner.session.opened_at_ms.unwrap_or_default()
        };

        let stopped = self.audio.stop_capture().await;

        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stopping = false;

        if let Err(e) = stopped {
            tracing::error!(error = %e, "failed to stop capture");
            return Err(e);
        }

        tracing::debug!(opened_at_ms, "push-to-talk closed");
        Ok(CloseOutcome::Closed { opened_at_ms })
    }
}

impl std::fmt::Debug for PushToTalkCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushToTalkCoordinator")
            .field("session", &self.session())
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}
