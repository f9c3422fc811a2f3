//! End-of-round feedback sequence
//!
//! Flicker, then banner, then commit. The sequence is driven purely by
//! deadlines; nothing the player does can shorten or cancel it. Only
//! dropping the owner stops it.

use std::time::Duration;

use tokio::time::Instant;

use super::{BannerStage, Cue, RoundEvent, RoundResult};

/// Timing of the end sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndSequenceTiming {
    /// Interval between flicker toggles
    pub flicker_interval: Duration,
    /// Number of flicker toggles
    pub flicker_ticks: u8,
    /// Budget from flicker start to commit
    pub total: Duration,
}

impl Default for EndSequenceTiming {
    fn default() -> Self {
        Self {
            flicker_interval: Duration::from_millis(150),
            flicker_ticks: 8,
            total: Duration::from_secs(6),
        }
    }
}

impl EndSequenceTiming {
    /// Time spent flickering
    #[must_use]
    pub fn flicker_duration(&self) -> Duration {
        self.flicker_interval * u32::from(self.flicker_ticks)
    }
}

/// Stage of the end sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndStage {
    /// Toggling the flash
    Flicker {
        /// Toggles done so far
        ticks: u8,
        /// Current flash state
        lit: bool,
    },
    /// Holding the banner
    Reveal,
    /// Sequence done, result handed back
    Committed,
}

/// Runs the flicker/banner/commit sequence for one result
#[derive(Debug, Clone)]
pub struct EndSequenceChoreographer {
    result: RoundResult,
    timing: EndSequenceTiming,
    stage: EndStage,
    started_at: Instant,
    next_at: Option<Instant>,
}

impl EndSequenceChoreographer {
    /// Start the sequence at `now`
    pub fn begin(
        result: RoundResult,
        timing: EndSequenceTiming,
        now: Instant,
        events: &mut Vec<RoundEvent>,
    ) -> Self {
        tracing::debug!(success = result.success, score = result.score, "end sequence started");

        events.push(RoundEvent::EndSequenceStarted {
            success: result.success,
        });
        events.push(RoundEvent::Cue {
            cue: if result.success {
                Cue::GameWin
            } else {
                Cue::GameLose
            },
        });

        let mut choreographer = Self {
            result,
            timing,
            stage: EndStage::Flicker {
                ticks: 0,
                lit: false,
            },
            started_at: now,
            next_at: Some(now + timing.flicker_interval),
        };

        if timing.flicker_ticks == 0 {
            choreographer.reveal(now, events);
        }

        choreographer
    }

    /// Result this sequence will commit
    #[must_use]
    pub const fn result(&self) -> &RoundResult {
        &self.result
    }

    /// Current stage
    #[must_use]
    pub const fn stage(&self) -> EndStage {
        self.stage
    }

    /// When the next stage step is due
    #[must_use]
    pub const fn next_deadline(&self) -> Option<Instant> {
        self.next_at
    }

    /// Banner stage for presentation
    #[must_use]
    pub const fn banner(&self) -> BannerStage {
        match self.stage {
            EndStage::Flicker { lit, .. } => BannerStage::Flicker { lit },
            EndStage::Reveal => BannerStage::Revealed {
                success: self.result.success,
                score: self.result.score,
            },
            EndStage::Committed => BannerStage::Hidden,
        }
    }

    /// Run every step due by `now`
    ///
    /// Returns the result once the commit step has run.
    pub fn advance(&mut self, now: Instant, events: &mut Vec<RoundEvent>) -> Option<RoundResult> {
        while let Some(due) = self.next_at.filter(|due| *due <= now) {
            match self.stage {
                EndStage::Flicker { ticks, lit } => {
                    let ticks = ticks + 1;
                    let lit = !lit;
                    self.stage = EndStage::Flicker { ticks, lit };
                    events.push(RoundEvent::Flicker { lit });
                    tracing::trace!(ticks, lit, "flicker");

                    if ticks >= self.timing.flicker_ticks {
                        self.reveal(due, events);
                    } else {
                        self.next_at = Some(due + self.timing.flicker_interval);
                    }
                }
                EndStage::Reveal => {
                    self.stage = EndStage::Committed;
                    self.next_at = None;
                    events.push(RoundEvent::BannerHidden);
                    tracing::debug!("end sequence committed");
                    return Some(self.result.clone());
                }
                EndStage::Committed => self.next_at = None,
            }
        }

        None
    }

    fn reveal(&mut self, at: Instant, events: &mut Vec<RoundEvent>) {
        self.stage = EndStage::Reveal;
        self.next_at = Some((self.started_at + self.timing.total).max(at));
        events.push(RoundEvent::BannerShown {
            success: self.result.success,
            score: self.result.score,
        });
    }
}
