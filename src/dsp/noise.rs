//! Noise beds: looping filtered noise for wind, water and leaves.

use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::sync::Arc;

use rand::Rng;

use crate::plan::{NoiseBed, NoiseShape};

use super::envelope::{Automation, GAIN_FLOOR};
use super::filter::BiquadFilter;

/// Precompute the bed's loop buffer: seeded white noise in [-1, 1] shaped
/// by the bed's generator. Stereo beds are generated per channel and folded
/// to mono at equal power.
pub fn generate<R: Rng + ?Sized>(bed: &NoiseBed, sample_rate: f64, rng: &mut R) -> Arc<[f64]> {
    let len = ((bed.seconds * sample_rate) as usize).max(1);
    let mut channels: Vec<Vec<f64>> = (0..bed.channels.max(1))
        .map(|_| (0..len).map(|i| shape_sample(&bed.shape, i, sample_rate, rng)).collect())
        .collect();

    if channels.len() == 1 {
        return channels.remove(0).into();
    }
    let mut mono = vec![0.0; len];
    for channel in &channels {
        for (dst, &s) in mono.iter_mut().zip(channel.iter()) {
            *dst += s;
        }
    }
    let scale = FRAC_1_SQRT_2.powi(channels.len() as i32 - 1);
    mono.iter().map(|s| (s * scale).clamp(-1.0, 1.0)).collect()
}

fn shape_sample<R: Rng + ?Sized>(shape: &NoiseShape, index: usize, sample_rate: f64, rng: &mut R) -> f64 {
    let noise: f64 = rng.random_range(-1.0..=1.0);
    match shape {
        NoiseShape::White => noise,
        NoiseShape::Swell {
            period_seconds,
            depth,
        } => {
            let period = period_seconds * sample_rate;
            let phase = 2.0 * PI * index as f64 / period;
            let swell = 0.5 + 0.5 * phase.sin();
            noise * (1.0 - depth + depth * swell)
        }
        NoiseShape::Rustle {
            probability,
            high,
            low,
        } => {
            let level = if rng.random_bool(*probability) { *high } else { *low };
            (noise * level).clamp(-1.0, 1.0)
        }
        NoiseShape::Custom(generator) => {
            let value = (generator.0)(index, noise);
            if value.is_finite() { value.clamp(-1.0, 1.0) } else { 0.0 }
        }
    }
}

/// A looping buffer source → cascaded filters → gain stage.
#[derive(Debug, Clone)]
pub struct BedNode {
    buffer: Arc<[f64]>,
    position: usize,
    filters: Vec<BiquadFilter>,
    gain: Automation,
    released: bool,
}

impl BedNode {
    /// Start looping at graph time `now`, fading in to the bed's gain over
    /// `fade_in` seconds.
    pub fn new(bed: &NoiseBed, buffer: Arc<[f64]>, now: f64, fade_in: f64, sample_rate: f64) -> Self {
        let filters = bed
            .filters
            .iter()
            .map(|f| BiquadFilter::new(f.kind, f.frequency, f.q, f.gain_db, sample_rate))
            .collect();

        let mut gain = Automation::new(0.0);
        if fade_in > 0.0 {
            gain.set_value_at(0.0, now);
            gain.linear_ramp_to(bed.gain, now + fade_in);
        } else {
            gain.set_value_at(bed.gain, now);
        }

        BedNode {
            buffer,
            position: 0,
            filters,
            gain,
            released: false,
        }
    }

    pub fn render_sample(&mut self, time: f64) -> f64 {
        if self.released || self.buffer.is_empty() {
            return 0.0;
        }
        let mut sample = self.buffer[self.position];
        self.position += 1;
        if self.position >= self.buffer.len() {
            self.position = 0;
        }
        for filter in self.filters.iter_mut() {
            sample = filter.process(sample);
        }
        sample * self.gain.value_at(time)
    }

    /// Ramp exponentially from wherever the gain is at `now` down to the
    /// floor over `fade` seconds.
    pub fn fade_out(&mut self, now: f64, fade: f64) {
        self.gain.hold_at(now);
        if fade > 0.0 {
            self.gain.exponential_ramp_to(GAIN_FLOOR, now + fade);
        } else {
            self.gain.set_value_at(GAIN_FLOOR, now);
        }
    }

    /// Stop the source. A released bed renders silence forever.
    pub fn release(&mut self) {
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn gain_at(&self, time: f64) -> f64 {
        self.gain.value_at(time)
    }
}
