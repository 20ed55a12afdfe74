//! Sequence plan types.
//!
//! A plan is pure data: which noise beds loop underneath, and which voice
//! categories fire randomized one-shots on top. Plans round-trip through
//! JSON so the host page can ship its own soundscapes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dsp::filter::FilterKind;
use crate::dsp::oscillator::Waveform;
use crate::error::PlanError;

/// `(seconds from voice start, value)`.
pub type Breakpoint = (f64, f64);

/// Optional filter stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    /// Cutoff / center frequency in Hz.
    pub frequency: f64,
    /// Resonance.
    #[serde(default = "default_q")]
    pub q: f64,
    /// Boost or cut for `peaking`, in dB.
    #[serde(default)]
    pub gain_db: f64,
}

fn default_q() -> f64 {
    1.0
}

impl FilterSpec {
    pub fn new(kind: FilterKind, frequency: f64, q: f64) -> Self {
        FilterSpec {
            kind,
            frequency,
            q,
            gain_db: 0.0,
        }
    }

    fn validate(&self, path: &str) -> Result<(), PlanError> {
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(PlanError::invalid(format!("{path}.frequency"), "must be positive"));
        }
        if !(self.q.is_finite() && self.q > 0.0) {
            return Err(PlanError::invalid(format!("{path}.q"), "must be positive"));
        }
        if !self.gain_db.is_finite() {
            return Err(PlanError::invalid(format!("{path}.gain_db"), "must be finite"));
        }
        Ok(())
    }
}

/// A one-shot sound event such as a single bird call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    #[serde(default)]
    pub waveform: Waveform,
    /// Frequency envelope in Hz.
    pub frequency: Vec<Breakpoint>,
    /// Amplitude envelope. The last segment always decays exponentially.
    pub gain: Vec<Breakpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSpec>,
    /// Total length in seconds.
    pub duration: f64,
}

impl Voice {
    /// Offset of the first breakpoint, where the oscillator starts.
    pub fn onset(&self) -> f64 {
        let f = self.frequency.first().map_or(0.0, |p| p.0);
        let g = self.gain.first().map_or(0.0, |p| p.0);
        f.min(g)
    }

    fn validate(&self, path: &str) -> Result<(), PlanError> {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(PlanError::invalid(format!("{path}.duration"), "must be positive"));
        }
        validate_breakpoints(&self.frequency, &format!("{path}.frequency"), self.duration, true)?;
        validate_breakpoints(&self.gain, &format!("{path}.gain"), self.duration, false)?;
        if let Some(filter) = &self.filter {
            filter.validate(&format!("{path}.filter"))?;
        }
        Ok(())
    }
}

fn validate_breakpoints(
    points: &[Breakpoint],
    path: &str,
    duration: f64,
    strictly_positive: bool,
) -> Result<(), PlanError> {
    if points.is_empty() {
        return Err(PlanError::invalid(path, "needs at least one breakpoint"));
    }
    let mut last_time = 0.0;
    for (i, &(time, value)) in points.iter().enumerate() {
        let at = format!("{path}[{i}]");
        if !time.is_finite() || time < last_time {
            return Err(PlanError::invalid(at, "times must be non-negative and non-decreasing"));
        }
        if time > duration {
            return Err(PlanError::invalid(at, "lies past the voice duration"));
        }
        let ok = if strictly_positive {
            value.is_finite() && value > 0.0
        } else {
            value.is_finite() && value >= 0.0
        };
        if !ok {
            return Err(PlanError::invalid(at, "value out of range"));
        }
        last_time = time;
    }
    Ok(())
}

/// Sample generator for `NoiseShape::Custom`: `(sample index, white noise) -> amplitude`.
#[derive(Clone)]
pub struct Generator(pub Arc<dyn Fn(usize, f64) -> f64 + Send + Sync>);

impl Generator {
    pub fn new(f: impl Fn(usize, f64) -> f64 + Send + Sync + 'static) -> Self {
        Generator(Arc::new(f))
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Generator(..)")
    }
}

impl PartialEq for Generator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// How raw white noise is shaped across the bed's buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NoiseShape {
    White,
    /// Slow sinusoidal swell across the buffer (wind, falling water).
    Swell { period_seconds: f64, depth: f64 },
    /// Sparse loud samples over a quiet floor (leaves).
    Rustle { probability: f64, high: f64, low: f64 },
    /// Rust-side generator; cannot be expressed in JSON.
    #[serde(skip)]
    Custom(Generator),
}

impl Default for NoiseShape {
    fn default() -> Self {
        NoiseShape::White
    }
}

/// A continuous looping background sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseBed {
    pub name: String,
    /// Loop length in seconds.
    #[serde(default = "default_bed_seconds")]
    pub seconds: f64,
    /// 1 or 2. Stereo beds are generated per channel and folded into the mono mix.
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default)]
    pub shape: NoiseShape,
    /// Cascaded filter stages, applied in order.
    pub filters: Vec<FilterSpec>,
    /// Steady-state gain.
    pub gain: f64,
}

fn default_bed_seconds() -> f64 {
    2.0
}

fn default_channels() -> u16 {
    1
}

impl NoiseBed {
    fn validate(&self, path: &str) -> Result<(), PlanError> {
        if !(self.seconds.is_finite() && self.seconds > 0.0 && self.seconds <= 60.0) {
            return Err(PlanError::invalid(format!("{path}.seconds"), "must be in (0, 60]"));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(PlanError::invalid(format!("{path}.channels"), "must be 1 or 2"));
        }
        if self.filters.is_empty() {
            return Err(PlanError::invalid(format!("{path}.filters"), "needs at least one filter stage"));
        }
        for (i, filter) in self.filters.iter().enumerate() {
            filter.validate(&format!("{path}.filters[{i}]"))?;
        }
        if !(self.gain.is_finite() && self.gain >= 0.0) {
            return Err(PlanError::invalid(format!("{path}.gain"), "must not be negative"));
        }
        match &self.shape {
            NoiseShape::Swell { period_seconds, depth } => {
                if !(period_seconds.is_finite() && *period_seconds > 0.0) {
                    return Err(PlanError::invalid(format!("{path}.shape.period_seconds"), "must be positive"));
                }
                if !(0.0..=1.0).contains(depth) {
                    return Err(PlanError::invalid(format!("{path}.shape.depth"), "must be in [0, 1]"));
                }
            }
            NoiseShape::Rustle { probability, high, low } => {
                if !(0.0..=1.0).contains(probability) {
                    return Err(PlanError::invalid(format!("{path}.shape.probability"), "must be in [0, 1]"));
                }
                if !(high.is_finite() && low.is_finite()) {
                    return Err(PlanError::invalid(format!("{path}.shape"), "levels must be finite"));
                }
            }
            NoiseShape::White | NoiseShape::Custom(_) => {}
        }
        Ok(())
    }
}

/// Inter-event delay range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
}

impl DelayRange {
    pub fn new(min: f64, max: f64) -> Self {
        DelayRange { min, max }
    }
}

/// Chance of extra overlapping voices per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fanout {
    pub probability: f64,
    /// 1 or 2 extra voices at most.
    #[serde(default = "default_max_extra")]
    pub max_extra: u8,
}

fn default_max_extra() -> u8 {
    2
}

/// A named family of one-shots with its own timing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceCategory {
    pub name: String,
    /// Candidate templates; each tick picks uniformly among them.
    pub voices: Vec<Voice>,
    pub delay: DelayRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fanout: Option<Fanout>,
    /// Level applied on top of each voice's own gain envelope.
    #[serde(default = "default_level")]
    pub gain: f64,
}

fn default_level() -> f64 {
    1.0
}

impl VoiceCategory {
    pub fn new(name: impl Into<String>, voices: Vec<Voice>, delay: DelayRange) -> Self {
        VoiceCategory {
            name: name.into(),
            voices,
            delay,
            fanout: None,
            gain: 1.0,
        }
    }

    pub fn with_fanout(mut self, probability: f64, max_extra: u8) -> Self {
        self.fanout = Some(Fanout {
            probability,
            max_extra,
        });
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    fn validate(&self, path: &str) -> Result<(), PlanError> {
        if self.voices.is_empty() {
            return Err(PlanError::invalid(format!("{path}.voices"), "needs at least one voice"));
        }
        for (i, voice) in self.voices.iter().enumerate() {
            voice.validate(&format!("{path}.voices[{i}]"))?;
        }
        let DelayRange { min, max } = self.delay;
        if !(min.is_finite() && max.is_finite() && min >= 0.0 && min <= max) {
            return Err(PlanError::invalid(format!("{path}.delay"), "needs 0 <= min <= max"));
        }
        if min + max <= 0.0 {
            return Err(PlanError::invalid(format!("{path}.delay"), "must not be zero"));
        }
        if let Some(fanout) = &self.fanout {
            if !(0.0..=1.0).contains(&fanout.probability) {
                return Err(PlanError::invalid(format!("{path}.fanout.probability"), "must be in [0, 1]"));
            }
            if !(1..=2).contains(&fanout.max_extra) {
                return Err(PlanError::invalid(format!("{path}.fanout.max_extra"), "must be 1 or 2"));
            }
        }
        if !(self.gain.is_finite() && self.gain >= 0.0) {
            return Err(PlanError::invalid(format!("{path}.gain"), "must not be negative"));
        }
        Ok(())
    }
}

/// Everything one ambience session plays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequencePlan {
    #[serde(default)]
    pub beds: Vec<NoiseBed>,
    #[serde(default)]
    pub categories: Vec<VoiceCategory>,
}

impl SequencePlan {
    /// Parse and validate a plan.
    pub fn from_json(source: &str) -> Result<Self, PlanError> {
        let plan: SequencePlan = serde_json::from_str(source)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn to_json(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        for (i, bed) in self.beds.iter().enumerate() {
            bed.validate(&format!("beds[{i}]"))?;
        }
        for (i, category) in self.categories.iter().enumerate() {
            category.validate(&format!("categories[{i}]"))?;
        }
        Ok(())
    }

    /// True when the plan can never make a sound.
    pub fn is_empty(&self) -> bool {
        self.beds.is_empty() && self.categories.is_empty()
    }
}

/// A voice placed at a fixed offset, for sounds that play once (the
/// celebration chime) instead of looping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub voice: Voice,
    /// Seconds after the cue list is triggered.
    pub at: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chirp() -> Voice {
        Voice {
            name: "chirp".into(),
            waveform: Waveform::Sine,
            frequency: vec![(0.0, 3000.0), (0.1, 4000.0)],
            gain: vec![(0.0, 0.0), (0.02, 0.2), (0.1, 0.001)],
            filter: None,
            duration: 0.12,
        }
    }

    #[test]
    fn parses_minimal_plan() {
        let json = r#"{
            "beds": [{
                "name": "wind",
                "shape": { "type": "swell", "period_seconds": 6.0, "depth": 0.5 },
                "filters": [{ "kind": "lowpass", "frequency": 500 }],
                "gain": 0.1
            }],
            "categories": [{
                "name": "birds",
                "voices": [{
                    "name": "chirp",
                    "waveform": "triangle",
                    "frequency": [[0, 3000], [0.1, 4200]],
                    "gain": [[0, 0], [0.02, 0.2], [0.1, 0.001]],
                    "duration": 0.12
                }],
                "delay": { "min": 2, "max": 5 },
                "fanout": { "probability": 0.3 }
            }]
        }"#;
        let plan = SequencePlan::from_json(json).unwrap();
        assert_eq!(plan.beds[0].seconds, 2.0);
        assert_eq!(plan.beds[0].filters[0].q, 1.0);
        assert_eq!(plan.categories[0].fanout.unwrap().max_extra, 2);
        assert_eq!(plan.categories[0].voices[0].waveform, Waveform::Triangle);
    }

    #[test]
    fn empty_object_is_an_empty_plan() {
        let plan = SequencePlan::from_json("{}").unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn rejects_category_without_voices() {
        let plan = SequencePlan {
            beds: vec![],
            categories: vec![VoiceCategory::new("birds", vec![], DelayRange::new(1.0, 2.0))],
        };
        let err = plan.validate().unwrap_err();
        assert_eq!(err, PlanError::invalid("categories[0].voices", "needs at least one voice"));
    }

    #[test]
    fn rejects_unordered_breakpoints() {
        let mut voice = chirp();
        voice.gain = vec![(0.05, 0.1), (0.01, 0.2)];
        let plan = SequencePlan {
            beds: vec![],
            categories: vec![VoiceCategory::new("birds", vec![voice], DelayRange::new(1.0, 2.0))],
        };
        match plan.validate().unwrap_err() {
            PlanError::Invalid { path, .. } => assert_eq!(path, "categories[0].voices[0].gain[1]"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_fanout_beyond_two() {
        let category =
            VoiceCategory::new("birds", vec![chirp()], DelayRange::new(1.0, 2.0)).with_fanout(0.5, 3);
        let plan = SequencePlan {
            beds: vec![],
            categories: vec![category],
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn inverted_delay_range_rejected() {
        let plan = SequencePlan {
            beds: vec![],
            categories: vec![VoiceCategory::new("birds", vec![chirp()], DelayRange::new(5.0, 1.0))],
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn onset_is_earliest_breakpoint() {
        let mut voice = chirp();
        voice.frequency[0].0 = 0.03;
        voice.frequency[1].0 = 0.1;
        assert_eq!(voice.onset(), 0.0);
        voice.gain[0].0 = 0.02;
        assert_eq!(voice.onset(), 0.02);
    }

    #[test]
    fn custom_shape_is_not_serialized() {
        let bed = NoiseBed {
            name: "custom".into(),
            seconds: 1.0,
            channels: 1,
            shape: NoiseShape::Custom(Generator::new(|_, n| n)),
            filters: vec![FilterSpec::new(FilterKind::Lowpass, 800.0, 0.7)],
            gain: 0.1,
        };
        let plan = SequencePlan {
            beds: vec![bed],
            categories: vec![],
        };
        assert!(plan.validate().is_ok());
        assert!(plan.to_json().is_err());
    }
}
