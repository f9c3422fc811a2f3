//! Configuration management for the party hub

pub mod file;

use std::time::Duration;

use crate::ptt::TalkMode;
use crate::round::EndSequenceTiming;
use crate::{Error, Result};

use file::PartyHubConfigFile;

/// Party hub configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Defaults applied to every round
    pub round: RoundConfig,

    /// Audio session settings
    pub audio: AudioConfig,
}

/// Defaults applied to every round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundConfig {
    /// Round timer length for games without their own (`PARTY_HUB_ROUND_SECS`)
    pub duration_secs: u32,

    /// Estimated host speaking time (`PARTY_HUB_HOST_DELAY_MS`)
    pub host_speaking_delay: Duration,

    /// Delay between mount and the scenario request
    pub scenario_delay: Duration,

    /// End-of-round sequence timing
    pub end_timing: EndSequenceTiming,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            duration_secs: 10,
            host_speaking_delay: Duration::from_secs(8),
            scenario_delay: Duration::from_secs(1),
            end_timing: EndSequenceTiming::default(),
        }
    }
}

/// Audio session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Grace period after connecting before capture is allowed
    pub readiness_grace: Duration,

    /// How player speech is delimited (`PARTY_HUB_TALK_MODE`)
    pub talk_mode: TalkMode,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            readiness_grace: Duration::from_secs(2),
            talk_mode: TalkMode::PushToTalk,
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if the resolved timing is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        let config = Self::resolve(fc, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Merge a config file with environment overrides
    ///
    /// `env` looks up a variable by name. Values that fail to parse are
    /// ignored with a warning.
    pub fn resolve(fc: PartyHubConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = RoundConfig::default();
        let default_timing = defaults.end_timing;

        let duration_secs = env_parse(&env, "PARTY_HUB_ROUND_SECS")
            .or(fc.round.duration_secs)
            .unwrap_or(defaults.duration_secs);

        let host_speaking_delay = env_parse(&env, "PARTY_HUB_HOST_DELAY_MS")
            .or(fc.round.host_delay_ms)
            .map_or(defaults.host_speaking_delay, Duration::from_millis);

        let scenario_delay = fc
            .round
            .scenario_delay_ms
            .map_or(defaults.scenario_delay, Duration::from_millis);

        let end_timing = EndSequenceTiming {
            flicker_interval: env_parse(&env, "PARTY_HUB_FLICKER_MS")
                .or(fc.end_sequence.flicker_ms)
                .map_or(default_timing.flicker_interval, Duration::from_millis),
            flicker_ticks: env_parse(&env, "PARTY_HUB_FLICKER_TICKS")
                .or(fc.end_sequence.flicker_ticks)
                .unwrap_or(default_timing.flicker_ticks),
            total: env_parse(&env, "PARTY_HUB_END_SEQUENCE_MS")
                .or(fc.end_sequence.total_ms)
                .map_or(default_timing.total, Duration::from_millis),
        };

        let audio_defaults = AudioConfig::default();
        let audio = AudioConfig {
            readiness_grace: fc
                .audio
                .readiness_grace_ms
                .map_or(audio_defaults.readiness_grace, Duration::from_millis),
            talk_mode: env_parse(&env, "PARTY_HUB_TALK_MODE")
                .or(fc.audio.talk_mode)
                .unwrap_or(audio_defaults.talk_mode),
        };

        Self {
            round: RoundConfig {
                duration_secs,
                host_speaking_delay,
                scenario_delay,
                end_timing,
            },
            audio,
        }
    }

    /// Check the timing is usable
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero-length round, zero flicker ticks or
    /// a flicker longer than the whole end sequence
    pub fn validate(&self) -> Result<()> {
        let timing = &self.round.end_timing;

        if self.round.duration_secs == 0 {
            return Err(Error::Config("round duration must be at least 1 second".to_string()));
        }
        if timing.flicker_ticks == 0 {
            return Err(Error::Config("flicker ticks must be at least 1".to_string()));
        }
        if timing.flicker_duration() > timing.total {
            return Err(Error::Config(format!(
                "flicker ({:?}) exceeds end sequence budget ({:?})",
                timing.flicker_duration(),
                timing.total
            )));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
