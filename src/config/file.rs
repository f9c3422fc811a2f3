//! TOML configuration file loading
//!
//! Supports `~/.config/party-hub/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ptt::TalkMode;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct PartyHubConfigFile {
    /// Round timing defaults
    #[serde(default)]
    pub round: RoundFileConfig,

    /// End-of-round sequence timing
    #[serde(default)]
    pub end_sequence: EndSequenceFileConfig,

    /// Audio session settings
    #[serde(default)]
    pub audio: AudioFileConfig,
}

/// Round timing defaults
#[derive(Debug, Default, Deserialize)]
pub struct RoundFileConfig {
    /// Round timer length for games without their own
    pub duration_secs: Option<u32>,

    /// Estimated host speaking time before the talk window opens
    pub host_delay_ms: Option<u64>,

    /// Delay between mount and the scenario request
    pub scenario_delay_ms: Option<u64>,
}

/// End-of-round sequence timing
#[derive(Debug, Default, Deserialize)]
pub struct EndSequenceFileConfig {
    pub flicker_ms: Option<u64>,
    pub flicker_ticks: Option<u8>,
    pub total_ms: Option<u64>,
}

/// Audio session settings
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Grace period after connecting before capture is allowed
    pub readiness_grace_ms: Option<u64>,

    /// `push-to-talk` or `hands-free`
    pub talk_mode: Option<TalkMode>,
}

/// Load the TOML config file from the standard path
///
/// Returns `PartyHubConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> PartyHubConfigFile {
    let Some(path) = config_file_path() else {
        return PartyHubConfigFile::default();
    };

    if !path.exists() {
        return PartyHubConfigFile::default();
    }

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
///
/// Returns `PartyHubConfigFile::default()` if the file can't be read or parsed.
pub fn load_config_file_from(path: &Path) -> PartyHubConfigFile {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                PartyHubConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            PartyHubConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/party-hub/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("party-hub").join("config.toml"))
}
