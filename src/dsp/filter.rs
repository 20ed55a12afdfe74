//! Biquad filter: matches WebAudio BiquadFilterNode coefficients.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Filter response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
    Peaking,
}

/// A biquad IIR filter (2nd order), Direct Form II Transposed.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub kind: FilterKind,
    pub frequency: f64,
    pub q: f64,
    /// Only used for `Peaking`.
    pub gain_db: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
}

impl BiquadFilter {
    pub fn new(kind: FilterKind, frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            kind,
            frequency,
            q,
            gain_db,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    /// Recompute coefficients from the current parameters.
    ///
    /// Cutoff is clamped just under Nyquist and Q away from zero so a
    /// careless plan cannot produce a NaN filter.
    pub fn update_coefficients(&mut self) {
        let nyquist = self.sample_rate / 2.0;
        let freq = self.frequency.clamp(10.0, nyquist * 0.99);
        let q = self.q.max(1e-4);

        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            FilterKind::Lowpass => {
                let b1 = 1.0 - cos_w0;
                let b0 = b1 / 2.0;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                let b1 = -(1.0 + cos_w0);
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::Bandpass => (
                alpha,
                0.0,
                -alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Peaking => {
                let a_lin = (10.0_f64).powf(self.gain_db / 40.0);
                (
                    1.0 + alpha * a_lin,
                    -2.0 * cos_w0,
                    1.0 - alpha * a_lin,
                    1.0 + alpha / a_lin,
                    -2.0 * cos_w0,
                    1.0 - alpha / a_lin,
                )
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process a single sample.
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_passes_dc() {
        let mut f = BiquadFilter::new(FilterKind::Lowpass, 5000.0, 0.707, 0.0, 44100.0);
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!((output - 1.0).abs() < 0.001, "Lowpass should pass DC, got {output}");
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut f = BiquadFilter::new(FilterKind::Highpass, 1000.0, 0.707, 0.0, 44100.0);
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!(output.abs() < 0.001, "Highpass should block DC, got {output}");
    }

    #[test]
    fn lowpass_attenuates_high_freq() {
        let mut f = BiquadFilter::new(FilterKind::Lowpass, 200.0, 0.707, 0.0, 44100.0);
        let freq = 10000.0;
        let mut max_out = 0.0_f64;
        for i in 0..4410 {
            let t = i as f64 / 44100.0;
            let out = f.process((2.0 * PI * freq * t).sin());
            if i > 1000 {
                max_out = max_out.max(out.abs());
            }
        }
        assert!(max_out < 0.01, "Lowpass@200Hz should attenuate 10kHz, got {max_out}");
    }

    #[test]
    fn peaking_with_zero_gain_is_transparent() {
        let mut f = BiquadFilter::new(FilterKind::Peaking, 3000.0, 2.0, 0.0, 44100.0);
        for i in 0..500 {
            let input = ((i as f64) * 0.37).sin();
            let out = f.process(input);
            assert!((out - input).abs() < 1e-9);
        }
    }

    #[test]
    fn cutoff_above_nyquist_stays_finite() {
        let mut f = BiquadFilter::new(FilterKind::Bandpass, 90_000.0, 0.0, 0.0, 44100.0);
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite(), "Filter output not finite at sample {i}");
        }
    }
}
