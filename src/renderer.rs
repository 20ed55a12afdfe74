//! Offline rendering: runs a session against a buffer instead of a
//! speaker, and encodes the result as WAV.

use crate::config::SessionConfig;
use crate::dsp::graph::BLOCK_SIZE;
use crate::plan::{Cue, SequencePlan};
use crate::sequencer::{self, PlaybackSession};

/// Extra time rendered after the last cue ends.
const CUE_TAIL: f64 = 0.05;

/// Longest body or fade `render_plan` will render, in seconds.
pub const MAX_RENDER_SECONDS: f64 = 600.0;

/// 16-bit stereo frames that still fit a RIFF size field.
const MAX_WAV_FRAMES: usize = (u32::MAX as usize - 36) / 4;

/// Render `seconds` of `plan`, then stop with `fade` and render the fade.
/// Returns mono samples at `config.sample_rate`; empty when the sample rate
/// is unusable. Both durations are capped at `MAX_RENDER_SECONDS`.
pub fn render_plan(plan: &SequencePlan, config: &SessionConfig, seconds: f64, fade: f64) -> Vec<f32> {
    let mut session = sequencer::start(plan.clone(), config.clone());
    if session.is_silent() {
        return Vec::new();
    }
    let sr = config.sample_rate;
    let body = frames(seconds, sr);
    let tail = frames(fade, sr) + BLOCK_SIZE;

    let mut out = vec![0.0_f32; body + tail];
    session.render(&mut out[..body]);
    session.stop(fade);
    session.render(&mut out[body..]);
    out
}

/// Render a cue list once, e.g. the celebration chime.
pub fn render_cues(cues: &[Cue], config: &SessionConfig) -> Vec<f32> {
    let mut config = config.clone();
    config.start_delay = 0.0;
    let mut session = PlaybackSession::start(SequencePlan::default(), config.clone());
    if session.is_silent() {
        return Vec::new();
    }
    let end = cues
        .iter()
        .map(|c| c.at.max(0.0) + c.voice.duration)
        .fold(0.0, f64::max);

    session.play_once(cues);
    let mut out = vec![0.0_f32; frames(end + CUE_TAIL, config.sample_rate)];
    session.render(&mut out);
    session.stop(0.0);
    out
}

fn frames(seconds: f64, sample_rate: f64) -> usize {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds.min(MAX_RENDER_SECONDS) * sample_rate).round() as usize
    } else {
        0
    }
}

/// Encode mono samples as a 16-bit stereo PCM WAV file. Input past what a
/// RIFF header can describe is dropped.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let samples = &samples[..samples.len().min(MAX_WAV_FRAMES)];
    let channels: u16 = 2;
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * channels as usize * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &s in samples {
        let pcm = (s as f64 * 32767.0).round().clamp(-32768.0, 32767.0) as i16;
        buf.extend_from_slice(&pcm.to_le_bytes()); // L
        buf.extend_from_slice(&pcm.to_le_bytes()); // R
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;

    fn config() -> SessionConfig {
        SessionConfig::default().with_sample_rate(16_000.0).with_seed(11)
    }

    #[test]
    fn wav_header_valid() {
        let wav = encode_wav(&[0.0, 0.5, -0.5], 16_000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 16_000);
        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 2);
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 12);
        assert_eq!(wav.len(), 44 + 12);
    }

    #[test]
    fn plan_render_length_includes_fade() {
        let out = render_plan(&presets::forest_plan(), &config(), 1.0, 0.5);
        assert_eq!(out.len(), 16_000 + 8_000 + BLOCK_SIZE);
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }

    #[test]
    fn forest_is_audible_then_fades() {
        let out = render_plan(&presets::forest_plan(), &config(), 2.0, 0.5);
        let rms = |s: &[f32]| (s.iter().map(|x| (*x as f64).powi(2)).sum::<f64>() / s.len() as f64).sqrt();
        let body = rms(&out[16_000..32_000]);
        let end = rms(&out[out.len() - BLOCK_SIZE..]);
        assert!(body > 1e-3, "forest should be audible, rms {body}");
        assert!(end < body * 0.05, "fade should silence the tail, {end} vs {body}");
    }

    #[test]
    fn render_is_deterministic_for_a_seed() {
        let a = render_plan(&presets::forest_plan(), &config(), 1.5, 0.2);
        let b = render_plan(&presets::forest_plan(), &config(), 1.5, 0.2);
        assert_eq!(a, b);
    }

    #[test]
    fn chime_renders_three_onsets() {
        let out = render_cues(&presets::celebration_chime(), &config());
        // 0.2s offset + 0.3s duration + tail
        assert_eq!(out.len(), 16_000 / 2 + 800);
        let peak = out.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.05 && peak < 1.0, "peak {peak}");

        // 10 ms windows at 16 kHz.
        let rms = |from: f64| {
            let start = (from * 16_000.0) as usize;
            let window = &out[start..start + 160];
            (window.iter().map(|x| (*x as f64).powi(2)).sum::<f64>() / 160.0).sqrt()
        };
        assert!(rms(0.005) > 0.02, "first note, rms {}", rms(0.005));
        for onset in [0.1, 0.2] {
            let before = rms(onset - 0.015);
            let after = rms(onset + 0.005);
            assert!(after > before * 2.0, "onset at {onset}s: {before} -> {after}");
        }
    }

    #[test]
    fn render_length_is_capped() {
        let sr = 8_000.0;
        assert_eq!(frames(1e9, sr), (MAX_RENDER_SECONDS * sr) as usize);
        assert_eq!(frames(f64::INFINITY, sr), 0);
        assert_eq!(frames(-1.0, sr), 0);
        assert!(2 * frames(1e9, 384_000.0) + BLOCK_SIZE <= MAX_WAV_FRAMES);
    }

    #[test]
    fn unusable_sample_rate_renders_nothing() {
        let cfg = config().with_sample_rate(0.0);
        assert!(render_plan(&presets::forest_plan(), &cfg, 1.0, 0.1).is_empty());
        assert!(render_cues(&presets::celebration_chime(), &cfg).is_empty());
    }
}
