//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Lowest and highest sample rates an output graph accepts.
pub const MIN_SAMPLE_RATE: f64 = 8_000.0;
pub const MAX_SAMPLE_RATE: f64 = 384_000.0;

/// Tunables for one playback session. Every field has a default, so an
/// empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Output sample rate in Hz.
    pub sample_rate: f64,
    /// Seed for every random draw the session makes (noise, delays,
    /// voice picks). Same seed + same plan = same audio.
    pub seed: u64,
    /// Gain applied to the final mix before soft clipping.
    pub master_gain: f64,
    /// Fixed time added to each drawn inter-event delay before a category
    /// re-arms, in seconds.
    pub reschedule_buffer: f64,
    /// Wait before beds and voices start, in seconds. Browsers may refuse to
    /// play audio right after page load.
    pub start_delay: f64,
    /// Fade-in time for noise beds, in seconds.
    pub bed_fade_in: f64,
    /// Fade used when the session is stopped without an explicit fade.
    pub default_fade: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            sample_rate: 48_000.0,
            seed: 0x5EED,
            master_gain: 0.8,
            reschedule_buffer: 1.0,
            start_delay: 0.0,
            bed_fade_in: 0.5,
            default_fade: 0.3,
        }
    }
}

impl SessionConfig {
    pub fn from_json(source: &str) -> Result<Self, PlanError> {
        let config: SessionConfig = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sample rate is deliberately not checked here: an unusable rate means
    /// "no audio device" and is handled by the session, not rejected.
    pub fn validate(&self) -> Result<(), PlanError> {
        let durations = [
            ("reschedule_buffer", self.reschedule_buffer),
            ("start_delay", self.start_delay),
            ("bed_fade_in", self.bed_fade_in),
            ("default_fade", self.default_fade),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(PlanError::invalid(name, "must be a non-negative number of seconds"));
            }
        }
        if !self.master_gain.is_finite() || self.master_gain < 0.0 {
            return Err(PlanError::invalid("master_gain", "must be a non-negative number"));
        }
        Ok(())
    }

    /// Replace every unusable field with its default, keeping the rest.
    pub fn sanitized(self) -> Self {
        let defaults = SessionConfig::default();
        let usable = |value: f64, fallback: f64| {
            if value.is_finite() && value >= 0.0 { value } else { fallback }
        };
        SessionConfig {
            master_gain: usable(self.master_gain, defaults.master_gain),
            reschedule_buffer: usable(self.reschedule_buffer, defaults.reschedule_buffer),
            start_delay: usable(self.start_delay, defaults.start_delay),
            bed_fade_in: usable(self.bed_fade_in, defaults.bed_fade_in),
            default_fade: usable(self.default_fade, defaults.default_fade),
            ..self
        }
    }
}
