//! Mini-game definitions
//!
//! A game is a [`GameConfig`] plus a [`GameRules`] implementation. The
//! [`GameController`] runs any such pair through the shared round lifecycle,
//! so individual games never reimplement timers, push-to-talk or the end
//! sequence.

mod catalog;
mod controller;
mod rules;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::Scenario;
use crate::round::{EndSequenceTiming, RoundState};

pub use catalog::{Catalog, GameCategory, GameMetadata};
pub use controller::{Capabilities, GameController, RoundHandle, TalkTurn};
pub use rules::{HostJudged, KeywordAnswer, QuizQuestion, QuizRules};

/// Per-game parameters for one round
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Catalog id
    pub id: String,
    /// Title announced when play begins
    pub title: String,
    /// Initial status message
    pub instructions: String,
    /// Round timer length
    pub duration_secs: u32,
    /// Estimated time the host spends on its opening turn
    pub host_speaking_delay: Duration,
    /// Delay between mount and the scenario request
    pub scenario_delay: Duration,
    /// Optional hint revealed during the talk window
    pub hint: Option<Hint>,
    /// End sequence timing
    pub end_timing: EndSequenceTiming,
}

impl GameConfig {
    /// Create a config with default timings
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            instructions: instructions.into(),
            duration_secs: 10,
            host_speaking_delay: Duration::from_secs(8),
            scenario_delay: Duration::from_secs(1),
            hint: None,
            end_timing: EndSequenceTiming::default(),
        }
    }

    /// Set the round timer length
    #[must_use]
    pub const fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Set the host speaking delay
    #[must_use]
    pub const fn with_host_delay(mut self, delay: Duration) -> Self {
        self.host_speaking_delay = delay;
        self
    }

    /// Set the scenario request delay
    #[must_use]
    pub const fn with_scenario_delay(mut self, delay: Duration) -> Self {
        self.scenario_delay = delay;
        self
    }

    /// Reveal `text` once the talk window has been open for `after`
    #[must_use]
    pub fn with_hint(mut self, after: Duration, text: impl Into<String>) -> Self {
        self.hint = Some(Hint {
            after,
            text: text.into(),
        });
        self
    }

    /// Set the end sequence timing
    #[must_use]
    pub const fn with_end_timing(mut self, timing: EndSequenceTiming) -> Self {
        self.end_timing = timing;
        self
    }
}

/// Hint shown part-way through the talk window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    /// Delay after the talk window opens
    pub after: Duration,
    /// Hint text
    pub text: String,
}

/// Outcome decided for a round
///
/// Also the payload of the host's `finish_*` tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the player won
    pub success: bool,
    /// Final score; the round's accumulated score when absent
    #[serde(default)]
    pub score: Option<u32>,
    /// Closing message; a default win/lose message when absent
    #[serde(default)]
    pub message: Option<String>,
}

impl Verdict {
    /// Winning verdict
    #[must_use]
    pub fn win(score: u32, message: impl Into<String>) -> Self {
        Self {
            success: true,
            score: Some(score),
            message: Some(message.into()),
        }
    }

    /// Losing verdict
    #[must_use]
    pub fn lose(score: u32, message: impl Into<String>) -> Self {
        Self {
            success: false,
            score: Some(score),
            message: Some(message.into()),
        }
    }
}

/// What the rules made of an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Judgement {
    /// Nothing decided locally; the host may still finish the round
    Undecided,
    /// Round continues with a new score and message
    Progress {
        /// Accumulated score
        score: u32,
        /// Message for the player
        message: String,
    },
    /// Round is over
    Finish(Verdict),
}

/// Inputs available to a finish predicate
#[derive(Debug, Clone, Copy)]
pub struct JudgeContext<'a> {
    /// Latest player utterance from the talk window, if any
    pub utterance: Option<&'a str>,
    /// Scenario in play, if the host produced one
    pub scenario: Option<&'a Scenario>,
    /// Whether the hint has been shown this round
    pub hint_shown: bool,
    /// Round state at judging time
    pub state: &'a RoundState,
}

/// Game-specific hooks of a round
///
/// Rules are owned by a single round, so any per-round bookkeeping (a quiz
/// score, a question counter) lives on the implementing type.
pub trait GameRules: Send {
    /// Called when the scenario is known; may return an opening status message
    fn on_scenario(&mut self, scenario: &Scenario) -> Option<String> {
        let _ = scenario;
        None
    }

    /// Judge the utterance captured by a closed talk window
    ///
    /// An absent or empty utterance is a valid input.
    fn judge(&mut self, ctx: &JudgeContext<'_>) -> Judgement;
}
