//! Anti-aliased oscillators using PolyBLEP.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Sine
    }
}

/// A band-limited oscillator. Frequency may change every sample, which is
/// how automation timelines drive chirps and glides.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            phase: 0.0,
            sample_rate,
        }
    }

    /// Generate the next sample at `frequency` Hz.
    pub fn next_sample(&mut self, frequency: f64) -> f64 {
        let inc = (frequency / self.sample_rate).clamp(0.0, 0.5);
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Square => self.square(inc),
            Waveform::Triangle => self.triangle(),
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

    fn square(&self, inc: f64) -> f64 {
        let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase + 0.5) % 1.0, inc);
        value
    }

    /// Piecewise linear: -1→+1 over [0, 0.5), +1→-1 over [0.5, 1).
    fn triangle(&self) -> f64 {
        if self.phase < 0.5 {
            4.0 * self.phase - 1.0
        } else {
            3.0 - 4.0 * self.phase
        }
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// PolyBLEP (Polynomial Band-Limited Step) correction.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_zero_at_start() {
        let mut osc = Oscillator::new(Waveform::Sine, 44100.0);
        let sample = osc.next_sample(440.0);
        assert!(sample.abs() < 1e-10, "Sine should start near 0, got {sample}");
    }

    #[test]
    fn sine_range() {
        let mut osc = Oscillator::new(Waveform::Sine, 44100.0);
        for _ in 0..44100 {
            let s = osc.next_sample(440.0);
            assert!((-1.0..=1.0).contains(&s), "Sine out of range: {s}");
        }
    }

    #[test]
    fn square_range() {
        let mut osc = Oscillator::new(Waveform::Square, 44100.0);
        for _ in 0..44100 {
            let s = osc.next_sample(440.0);
            assert!((-1.5..=1.5).contains(&s), "Square out of range: {s}");
        }
    }

    #[test]
    fn triangle_range() {
        let mut osc = Oscillator::new(Waveform::Triangle, 44100.0);
        for _ in 0..44100 {
            let s = osc.next_sample(440.0);
            assert!((-1.0..=1.0).contains(&s), "Triangle out of range: {s}");
        }
    }

    #[test]
    fn glide_keeps_output_bounded() {
        let mut osc = Oscillator::new(Waveform::Sine, 44100.0);
        for i in 0..4410 {
            let freq = 2000.0 + 2000.0 * (i as f64 / 4410.0);
            let s = osc.next_sample(freq);
            assert!(s.is_finite() && s.abs() <= 1.0);
        }
    }

    #[test]
    fn waveform_names_deserialize_lowercase() {
        let w: Waveform = serde_json::from_str("\"triangle\"").unwrap();
        assert_eq!(w, Waveform::Triangle);
    }
}
