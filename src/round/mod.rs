//! Round lifecycle
//!
//! A round moves `Waiting → Countdown → Playing → Completed | Failed`.
//! [`RoundLifecycle`] owns the [`RoundState`] and every timer chain of the
//! round; [`EndSequenceChoreographer`] plays the post-round feedback before
//! the terminal phase is committed.

mod choreographer;
mod lifecycle;

use serde::Serialize;

pub use choreographer::{EndSequenceChoreographer, EndSequenceTiming, EndStage};
pub use lifecycle::{COUNTDOWN_TICKS, EndOutcome, RoundLifecycle, TICK};

/// Phase of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    /// Mounted, not started
    Waiting,
    /// Pre-round countdown running
    Countdown,
    /// Round in progress
    Playing,
    /// Ended in success
    Completed,
    /// Ended in failure
    Failed,
}

impl RoundPhase {
    /// Whether the round has reached an outcome
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Countdown => write!(f, "counting down"),
            Self::Playing => write!(f, "playing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Observable state of a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundState {
    /// Current phase
    pub phase: RoundPhase,
    /// Seconds left on the round timer
    pub seconds_remaining: u32,
    /// Accumulated score
    pub score: u32,
    /// Message shown to the player
    pub status_message: String,
}

/// Outcome of a finished round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundResult {
    /// Whether the player won
    pub success: bool,
    /// Final score
    pub score: u32,
    /// Closing message
    pub message: String,
    /// Seconds the round timer ran before the end
    pub time_elapsed_seconds: u32,
}

/// Sound or haptic cue requested by the round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cue {
    /// One countdown tick
    CountdownBeep,
    /// Round is starting
    GameStart,
    /// Round won
    GameWin,
    /// Round lost
    GameLose,
}

/// Stage of the end-of-round banner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum BannerStage {
    /// Nothing shown
    Hidden,
    /// Screen flickering between dark and lit
    Flicker {
        /// Whether the flash is on
        lit: bool,
    },
    /// Win/lose banner on screen
    Revealed {
        /// Whether the banner announces a win
        success: bool,
        /// Score displayed on the banner
        score: u32,
    },
}

/// Side effects emitted as the round progresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoundEvent {
    /// Countdown ticked down
    CountdownTick {
        /// Count left after this tick
        remaining: u8,
    },
    /// Round entered `Playing`
    RoundBegins {
        /// Text announcing the round to the player
        announcement: String,
    },
    /// Round timer began counting
    TimerStarted,
    /// Round timer ticked
    TimerTick {
        /// Seconds left after this tick
        seconds_remaining: u32,
    },
    /// Player may now hold to talk
    TalkWindowOpened,
    /// Hint revealed
    HintShown {
        /// Hint text
        hint: String,
    },
    /// Cue to play
    Cue {
        /// Which cue
        cue: Cue,
    },
    /// End sequence began
    EndSequenceStarted {
        /// Whether the round was won
        success: bool,
    },
    /// Flicker toggled
    Flicker {
        /// Whether the flash is on
        lit: bool,
    },
    /// Banner displayed
    BannerShown {
        /// Whether the banner announces a win
        success: bool,
        /// Displayed score
        score: u32,
    },
    /// Banner removed
    BannerHidden,
    /// Terminal phase committed
    RoundFinished {
        /// Final result
        result: RoundResult,
    },
}

/// Presentation snapshot of a round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundView {
    /// Round state
    pub state: RoundState,
    /// Countdown number on screen, if counting down
    pub countdown: Option<u8>,
    /// Remaining share of the round timer in `[0, 1]`
    pub remaining_fraction: f32,
    /// Whether the round timer is ticking
    pub timer_running: bool,
    /// Whether the player may hold to talk
    pub talk_window_open: bool,
    /// End-of-round banner stage
    pub banner: BannerStage,
}
