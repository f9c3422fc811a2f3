//! Party Hub - round engine for voice-driven party mini-games
//!
//! Every mini-game runs the same round: a countdown, the AI host's scripted
//! turn, a push-to-talk window for the player, a scored outcome and an
//! end-of-round sequence. This crate implements that round once:
//! - Round lifecycle and end sequence state machines
//! - Push-to-talk coordination with barge-in
//! - Transcript aggregation and "what was said since" queries
//! - A per-round controller parameterized by game config and rules
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   GameController                     │
//! │   GameConfig  │  GameRules  │  RoundHandle          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Round core                          │
//! │   RoundLifecycle  │  EndSequence  │  PTT  │ Transcript│
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Capabilities                         │
//! │   HostAgent  │  AudioSession  │  transcript stream  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod capability;
pub mod clock;
pub mod config;
pub mod error;
pub mod game;
pub mod host;
pub mod ptt;
pub mod round;
pub mod sim;
pub mod transcript;

pub use capability::{AudioSession, HostAgent, Scenario, SessionReadiness, SessionStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use game::{
    Capabilities, Catalog, GameConfig, GameController, GameRules, Judgement, RoundHandle, Verdict,
};
pub use host::{HostBreadcrumb, HostNotification, HostToolCallDecoder};
pub use ptt::{CloseOutcome, OpenOutcome, PttSession, PushToTalkCoordinator, TalkMode};
pub use round::{RoundEvent, RoundLifecycle, RoundPhase, RoundResult, RoundState, RoundView};
pub use transcript::{Role, TranscriptAggregator, TranscriptEntry, TranscriptEvent};
