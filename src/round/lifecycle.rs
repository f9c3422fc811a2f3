//! Round phase state machine
//!
//! Every timer of a round (countdown, round timer, end sequence) is a
//! deadline held here. The owner asks for [`RoundLifecycle::next_deadline`],
//! sleeps until then, and calls [`RoundLifecycle::advance`], the single entry
//! point through which time moves the round. Dropping or tearing down the
//! lifecycle drops every pending deadline with it.

use std::time::Duration;

use tokio::time::Instant;

use super::{
    BannerStage, Cue, EndSequenceChoreographer, EndSequenceTiming, RoundEvent, RoundPhase,
    RoundResult, RoundState, RoundView,
};
use crate::{Error, Result};

/// Number of countdown ticks before play
pub const COUNTDOWN_TICKS: u8 = 3;

/// Granularity of the countdown and round timer
pub const TICK: Duration = Duration::from_secs(1);

const TIMES_UP: &str = "Time's up!";
const DEFAULT_WIN_MESSAGE: &str = "Well done!";
const DEFAULT_LOSE_MESSAGE: &str = "Better luck next time!";

/// What a call to `end` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    /// The end sequence started
    Started,
    /// An end sequence was already running; the call was ignored
    AlreadyEnding,
}

/// Which timer chain fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Due {
    Countdown,
    RoundTick,
    EndSequence,
}

/// Phase state machine for one round
#[derive(Debug)]
pub struct RoundLifecycle {
    title: String,
    instructions: String,
    end_timing: EndSequenceTiming,
    state: RoundState,
    duration_secs: u32,
    countdown: Option<u8>,
    next_countdown_at: Option<Instant>,
    timer_requested: bool,
    next_round_tick_at: Option<Instant>,
    ending: Option<EndSequenceChoreographer>,
    result: Option<RoundResult>,
    torn_down: bool,
    events: Vec<RoundEvent>,
}

impl RoundLifecycle {
    /// Create a round in `Waiting`
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        instructions: impl Into<String>,
        end_timing: EndSequenceTiming,
    ) -> Self {
        let instructions = instructions.into();
        Self {
            title: title.into(),
            state: RoundState {
                phase: RoundPhase::Waiting,
                seconds_remaining: 0,
                score: 0,
                status_message: instructions.clone(),
            },
            instructions,
            end_timing,
            duration_secs: 0,
            countdown: None,
            next_countdown_at: None,
            timer_requested: false,
            next_round_tick_at: None,
            ending: None,
            result: None,
            torn_down: false,
            events: Vec::new(),
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &RoundState {
        &self.state
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> RoundPhase {
        self.state.phase
    }

    /// Configured round length
    #[must_use]
    pub const fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// Whether an end sequence is running
    #[must_use]
    pub const fn is_ending(&self) -> bool {
        self.ending.is_some()
    }

    /// Whether the round timer is ticking
    #[must_use]
    pub const fn timer_running(&self) -> bool {
        self.next_round_tick_at.is_some()
    }

    /// Result of the round, once committed
    #[must_use]
    pub const fn result(&self) -> Option<&RoundResult> {
        self.result.as_ref()
    }

    /// Take the side effects produced since the last call
    pub fn take_events(&mut self) -> Vec<RoundEvent> {
        std::mem::take(&mut self.events)
    }

    /// Begin the countdown
    ///
    /// # Errors
    ///
    /// Returns `Error::OrderingViolation` unless the round is `Waiting`
    pub fn start(&mut self, duration_secs: u32, now: Instant) -> Result<()> {
        self.ensure_live()?;
        if self.state.phase != RoundPhase::Waiting {
            return Err(self.violation("start"));
        }

        self.duration_secs = duration_secs;
        self.state.seconds_remaining = duration_secs;
        self.state.phase = RoundPhase::Countdown;
        self.countdown = Some(COUNTDOWN_TICKS);
        self.next_countdown_at = Some(now + TICK);

        tracing::info!(title = %self.title, duration_secs, "round countdown started");
        Ok(())
    }

    /// Let the round timer run
    ///
    /// Requested during the countdown, the timer starts ticking as soon as
    /// play begins. Repeated requests are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `Error::OrderingViolation` outside `Countdown` and `Playing`
    pub fn start_timer(&mut self, now: Instant) -> Result<()> {
        self.ensure_live()?;
        if !matches!(self.state.phase, RoundPhase::Countdown | RoundPhase::Playing) {
            return Err(self.violation("start_timer"));
        }
        if self.timer_requested {
            return Ok(());
        }

        self.timer_requested = true;
        if self.state.phase == RoundPhase::Playing && self.ending.is_none() {
            self.schedule_round_timer(now);
        }
        Ok(())
    }

    /// Replace the accumulated score
    ///
    /// Ignored after teardown.
    pub fn update_score(&mut self, score: u32) {
        if self.torn_down {
            tracing::debug!(score, "round torn down, ignoring score update");
            return;
        }
        self.state.score = score;
    }

    /// Replace the status message
    ///
    /// Ignored after teardown.
    pub fn update_message(&mut self, message: impl Into<String>) {
        if self.torn_down {
            tracing::debug!("round torn down, ignoring message update");
            return;
        }
        self.state.status_message = message.into();
    }

    /// End the round and hand over to the end sequence
    ///
    /// The phase stays `Playing` until the sequence commits. A call made
    /// while a sequence is already running is ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::OrderingViolation` outside `Playing`
    pub fn end(
        &mut self,
        success: bool,
        message: Option<String>,
        score: Option<u32>,
        now: Instant,
    ) -> Result<EndOutcome> {
        self.ensure_live()?;
        if self.state.phase != RoundPhase::Playing {
            return Err(self.violation("end"));
        }
        if self.ending.is_some() {
            tracing::warn!(success, "round already ending, ignoring end");
            return Ok(EndOutcome::AlreadyEnding);
        }

        let score = score.unwrap_or(self.state.score);
        let message = message.filter(|m| !m.trim().is_empty()).unwrap_or_else(|| {
            if success {
                DEFAULT_WIN_MESSAGE
            } else {
                DEFAULT_LOSE_MESSAGE
            }
            .to_string()
        });
        let result = RoundResult {
            success,
            score,
            message,
            time_elapsed_seconds: self.duration_secs.saturating_sub(self.state.seconds_remaining),
        };

        tracing::info!(
            success,
            score,
            elapsed = result.time_elapsed_seconds,
            "round ended"
        );

        self.state.score = score;
        self.next_round_tick_at = None;
        self.ending = Some(EndSequenceChoreographer::begin(
            result,
            self.end_timing,
            now,
            &mut self.events,
        ));

        Ok(EndOutcome::Started)
    }

    /// Return a finished round to `Waiting`
    ///
    /// # Errors
    ///
    /// Returns `Error::OrderingViolation` unless the round is terminal
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_live()?;
        if !self.state.phase.is_terminal() {
            return Err(self.violation("reset"));
        }

        *self = Self::new(
            std::mem::take(&mut self.title),
            std::mem::take(&mut self.instructions),
            self.end_timing,
        );
        Ok(())
    }

    /// Drop every pending timer; the round accepts nothing afterwards
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        tracing::debug!(phase = %self.state.phase, "round torn down");
        self.torn_down = true;
        self.next_countdown_at = None;
        self.next_round_tick_at = None;
        self.ending = None;
        self.events.clear();
    }

    /// Whether `teardown` has run
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Earliest pending deadline across every timer chain
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_due().map(|(at, _)| at)
    }

    fn next_due(&self) -> Option<(Instant, Due)> {
        [
            self.next_countdown_at.map(|at| (at, Due::Countdown)),
            self.next_round_tick_at.map(|at| (at, Due::RoundTick)),
            self.ending
                .as_ref()
                .and_then(EndSequenceChoreographer::next_deadline)
                .map(|at| (at, Due::EndSequence)),
        ]
        .into_iter()
        .flatten()
        .min_by_key(|(at, _)| *at)
    }

    /// Run every timer step due by `now`, earliest first
    pub fn advance(&mut self, now: Instant) {
        while let Some((at, due)) = self.next_due().filter(|(at, _)| *at <= now) {
            match due {
                Due::Countdown => self.countdown_tick(at),
                Due::RoundTick => self.round_tick(at),
                Due::EndSequence => self.end_sequence_step(at),
            }
        }
    }

    fn countdown_tick(&mut self, at: Instant) {
        let remaining = self.countdown.unwrap_or(1).saturating_sub(1);
        self.countdown = Some(remaining);
        self.events.push(RoundEvent::CountdownTick { remaining });
        self.events.push(RoundEvent::Cue {
            cue: Cue::CountdownBeep,
        });
        tracing::trace!(remaining, "countdown tick");

        if remaining == 0 {
            self.next_countdown_at = None;
            self.enter_playing(at);
        } else {
            self.next_countdown_at = Some(at + TICK);
        }
    }

    fn enter_playing(&mut self, at: Instant) {
        self.countdown = None;
        self.state.phase = RoundPhase::Playing;
        self.state.seconds_remaining = self.duration_secs;

        tracing::debug!(title = %self.title, "round playing");
        self.events.push(RoundEvent::RoundBegins {
            announcement: format!("{} begins now! {}", self.title, self.instructions),
        });
        self.events.push(RoundEvent::Cue { cue: Cue::GameStart });

        if self.timer_requested {
            self.schedule_round_timer(at);
        }
    }

    fn schedule_round_timer(&mut self, now: Instant) {
        self.next_round_tick_at = Some(now + TICK);
        self.events.push(RoundEvent::TimerStarted);
        tracing::debug!(seconds = self.state.seconds_remaining, "round timer started");
    }

    fn round_tick(&mut self, at: Instant) {
        self.next_round_tick_at = None;
        self.state.seconds_remaining = self.state.seconds_remaining.saturating_sub(1);
        self.events.push(RoundEvent::TimerTick {
            seconds_remaining: self.state.seconds_remaining,
        });
        tracing::trace!(seconds = self.state.seconds_remaining, "round tick");

        if self.state.seconds_remaining > 0 {
            self.next_round_tick_at = Some(at + TICK);
            return;
        }

        if let Err(e) = self.end(false, Some(TIMES_UP.to_string()), None, at) {
            tracing::error!(error = %e, "time-out could not end the round");
        }
    }

    fn end_sequence_step(&mut self, at: Instant) {
        let Some(ending) = self.ending.as_mut() else {
            return;
        };
        let Some(result) = ending.advance(at, &mut self.events) else {
            return;
        };

        self.ending = None;
        self.state.phase = if result.success {
            RoundPhase::Completed
        } else {
            RoundPhase::Failed
        };
        self.state.status_message.clone_from(&result.message);

        tracing::info!(phase = %self.state.phase, score = result.score, "round finished");
        self.events.push(RoundEvent::RoundFinished {
            result: result.clone(),
        });
        self.result = Some(result);
    }

    /// Presentation snapshot
    #[must_use]
    pub fn view(&self, talk_window_open: bool) -> RoundView {
        #[allow(clippy::cast_precision_loss)]
        let remaining_fraction = if self.duration_secs == 0 {
            0.0
        } else {
            self.state.seconds_remaining as f32 / self.duration_secs as f32
        };

        RoundView {
            state: self.state.clone(),
            countdown: self.countdown,
            remaining_fraction,
            timer_running: self.timer_running(),
            talk_window_open: talk_window_open && self.state.phase == RoundPhase::Playing,
            banner: self
                .ending
                .as_ref()
                .map_or(BannerStage::Hidden, EndSequenceChoreographer::banner),
        }
    }

    const fn ensure_live(&self) -> Result<()> {
        if self.torn_down {
            return Err(Error::RoundClosed);
        }
        Ok(())
    }

    fn violation(&self, operation: &'static str) -> Error {
        tracing::warn!(operation, phase = %self.state.phase, "operation out of order");
        Error::OrderingViolation {
            operation,
            phase: self.state.phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn playing(duration: u32) -> (RoundLifecycle, Instant) {
        let start = Instant::now();
        let mut round = RoundLifecycle::new("Quiz", "Answer!", EndSequenceTiming::default());
        round.start(duration, start).unwrap();
        round.advance(start + secs(3));
        assert_eq!(round.phase(), RoundPhase::Playing);
        round.take_events();
        (round, start + secs(3))
    }

    #[test]
    fn new_round_waits_with_instructions() {
        let round = RoundLifecycle::new("Quiz", "Answer!", EndSequenceTiming::default());
        assert_eq!(round.phase(), RoundPhase::Waiting);
        assert_eq!(round.state().status_message, "Answer!");
        assert_eq!(round.next_deadline(), None);
    }

    #[test]
    fn countdown_runs_three_ticks_then_plays() {
        let start = Instant::now();
        let mut round = RoundLifecycle::new("Quiz", "Answer!", EndSequenceTiming::default());
        round.start(20, start).unwrap();
        assert_eq!(round.phase(), RoundPhase::Countdown);
        assert_eq!(round.view(false).countdown, Some(3));

        round.advance(start + secs(2));
        assert_eq!(round.phase(), RoundPhase::Countdown);
        assert_eq!(round.view(false).countdown, Some(1));

        round.advance(start + secs(3));
        assert_eq!(round.phase(), RoundPhase::Playing);
        assert_eq!(round.state().seconds_remaining, 20);

        let events = round.take_events();
        let ticks: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                RoundEvent::CountdownTick { remaining } => Some(*remaining),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, [2, 1, 0]);
        assert!(events.contains(&RoundEvent::RoundBegins {
            announcement: "Quiz begins now! Answer!".to_string()
        }));
    }

    #[test]
    fn playing_does_not_start_timer_by_itself() {
        let (mut round, at) = playing(10);
        round.advance(at + secs(30));

        assert_eq!(round.state().seconds_remaining, 10);
        assert!(!round.timer_running());
        assert_eq!(round.next_deadline(), None);
    }

    #[test]
    fn timer_requested_during_countdown_starts_on_play() {
        let start = Instant::now();
        let mut round = RoundLifecycle::new("Quiz", "Answer!", EndSequenceTiming::default());
        round.start(5, start).unwrap();
        round.start_timer(start).unwrap();
        assert!(!round.timer_running());

        round.advance(start + secs(3));
        assert!(round.timer_running());
        round.advance(start + secs(5));
        assert_eq!(round.state().seconds_remaining, 3);
    }

    #[test]
    fn timer_counts_down_and_times_out_once() {
        let (mut round, at) = playing(30);
        round.start_timer(at).unwrap();

        let mut last = round.state().seconds_remaining;
        for s in 1..=30 {
            round.advance(at + secs(s));
            let now = round.state().seconds_remaining;
            assert!(now <= last);
            last = now;
        }

        assert_eq!(round.state().seconds_remaining, 0);
        assert!(round.is_ending());

        round.advance(at + secs(120));
        let events = round.take_events();
        let starts = events
            .iter()
            .filter(|e| matches!(e, RoundEvent::EndSequenceStarted { .. }))
            .count();
        assert_eq!(starts, 1);

        let result = round.result().unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Time's up!");
        assert_eq!(result.time_elapsed_seconds, 30);
        assert_eq!(round.phase(), RoundPhase::Failed);
    }

    #[test]
    fn end_commits_only_after_sequence() {
        let (mut round, at) = playing(30);
        round.start_timer(at).unwrap();
        round.advance(at + secs(4));

        let outcome = round
            .end(true, Some("Great job!".to_string()), Some(85), at + secs(4))
            .unwrap();
        assert_eq!(outcome, EndOutcome::Started);
        assert_eq!(round.phase(), RoundPhase::Playing);
        assert_eq!(round.state().score, 85);
        assert!(!round.timer_running());

        round.advance(at + secs(9));
        assert_eq!(round.phase(), RoundPhase::Playing);

        round.advance(at + secs(10));
        assert_eq!(round.phase(), RoundPhase::Completed);
        assert_eq!(round.state().status_message, "Great job!");
        assert_eq!(
            round.result(),
            Some(&RoundResult {
                success: true,
                score: 85,
                message: "Great job!".to_string(),
                time_elapsed_seconds: 4,
            })
        );
    }

    #[test]
    fn second_end_is_ignored() {
        let (mut round, at) = playing(10);
        round.update_score(12);

        assert_eq!(round.end(true, None, None, at).unwrap(), EndOutcome::Started);
        assert_eq!(
            round.end(false, Some("late".to_string()), Some(0), at).unwrap(),
            EndOutcome::AlreadyEnding
        );

        round.advance(at + secs(6));
        let result = round.result().unwrap();
        assert!(result.success);
        assert_eq!(result.score, 12);
        assert_eq!(result.message, "Well done!");
    }

    #[test]
    fn out_of_order_calls_are_reported_and_leave_state_alone() {
        let mut round = RoundLifecycle::new("Quiz", "Answer!", EndSequenceTiming::default());
        let before = round.state().clone();

        let err = round.end(true, None, None, Instant::now()).unwrap_err();
        assert!(matches!(
            err,
            Error::OrderingViolation {
                operation: "end",
                phase: RoundPhase::Waiting
            }
        ));
        assert!(round.start_timer(Instant::now()).is_err());
        assert!(round.reset().is_err());
        assert_eq!(round.state(), &before);

        let (mut round, at) = playing(10);
        assert!(matches!(
            round.start(10, at),
            Err(Error::OrderingViolation {
                operation: "start",
                phase: RoundPhase::Playing
            })
        ));
        assert_eq!(round.phase(), RoundPhase::Playing);
    }

    #[test]
    fn end_after_commit_is_a_violation() {
        let (mut round, at) = playing(10);
        round.end(false, None, Some(0), at).unwrap();
        round.advance(at + secs(6));
        assert_eq!(round.phase(), RoundPhase::Failed);

        assert!(round.end(true, None, None, at + secs(7)).is_err());
        assert_eq!(round.phase(), RoundPhase::Failed);
    }

    #[test]
    fn reset_returns_to_waiting() {
        let (mut round, at) = playing(10);
        round.update_score(50);
        round.end(true, None, None, at).unwrap();
        round.advance(at + secs(6));

        round.reset().unwrap();
        assert_eq!(round.phase(), RoundPhase::Waiting);
        assert_eq!(round.state().score, 0);
        assert!(round.result().is_none());
        round.start(10, at + secs(7)).unwrap();
    }

    #[test]
    fn teardown_mid_countdown_freezes_round() {
        let start = Instant::now();
        let mut round = RoundLifecycle::new("Quiz", "Answer!", EndSequenceTiming::default());
        round.start(10, start).unwrap();
        round.advance(start + secs(1));
        let frozen = round.state().clone();

        round.teardown();
        round.advance(start + secs(60));

        assert_eq!(round.state(), &frozen);
        assert_eq!(round.next_deadline(), None);
        assert!(round.take_events().is_empty());
        assert!(matches!(round.start_timer(start), Err(Error::RoundClosed)));
    }

    #[test]
    fn updates_after_teardown_are_ignored() {
        let (mut round, at) = playing(10);
        round.update_score(30);
        round.update_message("Keep going");
        round.teardown();

        round.update_score(99);
        round.update_message("too late");

        assert_eq!(round.state().score, 30);
        assert_eq!(round.state().status_message, "Keep going");
        assert!(matches!(
            round.end(true, None, None, at),
            Err(Error::RoundClosed)
        ));
    }

    #[test]
    fn view_reports_fraction_and_banner() {
        let (mut round, at) = playing(10);
        round.start_timer(at).unwrap();
        round.advance(at + secs(5));

        let view = round.view(true);
        assert!((view.remaining_fraction - 0.5).abs() < f32::EPSILON);
        assert!(view.talk_window_open);
        assert_eq!(view.banner, BannerStage::Hidden);

        round.end(true, None, Some(10), at + secs(5)).unwrap();
        round.advance(at + secs(7));
        assert_eq!(
            round.view(true).banner,
            BannerStage::Revealed {
                success: true,
                score: 10
            }
        );
    }
}
