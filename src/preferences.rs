// src/preferences.rs
//
// User preferences.
//
// Plain value type: `Clone` is a full copy, and `copy_from` lists the
// fields an edit dialog is allowed to commit.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::project::ProjectSettings;
use crate::waveforms::names;

/// Device block size when no latency is requested.
pub const DEFAULT_BLOCK_FRAMES: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub sample_rate: u32,
    pub channels: u16,
    /// Requested device latency, i.e. one device block. 0 means
    /// [`DEFAULT_BLOCK_FRAMES`].
    pub latency_ms: u32,
    /// Waveform variant used for new projects.
    pub waveform: String,
    pub reference_pitch: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            latency_ms: 0,
            waveform: names::SINE.to_string(),
            reference_pitch: 440.0,
        }
    }
}

impl Preferences {
    /// Load from a TOML file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let prefs = toml::from_str(&text)?;
        log::debug!("loaded preferences from {}", path.as_ref().display());
        Ok(prefs)
    }

    /// Load, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match std::fs::metadata(path.as_ref()) {
            Ok(_) => Self::load(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    /// Copy every user-editable field from `other`:
    /// `sample_rate`, `channels`, `latency_ms`, `waveform`, `reference_pitch`.
    pub fn copy_from(&mut self, other: &Preferences) {
        self.sample_rate = other.sample_rate;
        self.channels = other.channels;
        self.latency_ms = other.latency_ms;
        self.waveform.clone_from(&other.waveform);
        self.reference_pitch = other.reference_pitch;
    }

    /// Frames per device block for the requested latency.
    pub fn block_frames(&self) -> usize {
        if self.latency_ms == 0 {
            return DEFAULT_BLOCK_FRAMES;
        }
        let frames = u64::from(self.sample_rate) * u64::from(self.latency_ms) / 1000;
        frames.max(1) as usize
    }

    /// Configure a project's output format and tuning from preferences.
    pub fn apply_to(&self, settings: &mut ProjectSettings) {
        settings.sample_rate = self.sample_rate;
        settings.channels = self.channels;
        settings.reference_pitch = self.reference_pitch;
    }
}
