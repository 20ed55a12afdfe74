//! Voice node: one scheduled playback of a `plan::Voice`.

use crate::plan::Voice;

use super::envelope::Automation;
use super::filter::BiquadFilter;
use super::oscillator::Oscillator;

/// Oscillator → optional filter → gain, alive between its start and stop
/// times on the graph clock. Nothing outside the graph holds on to it; the
/// graph drops it once the stop time has passed.
#[derive(Debug, Clone)]
pub struct VoiceNode {
    oscillator: Oscillator,
    frequency: Automation,
    gain: Automation,
    filter: Option<BiquadFilter>,
    level: f64,
    pub start_time: f64,
    pub stop_time: f64,
}

impl VoiceNode {
    /// Build the node for `voice` anchored at graph time `anchor`.
    pub fn new(voice: &Voice, anchor: f64, level: f64, sample_rate: f64) -> Self {
        let frequency = Automation::from_breakpoints(&voice.frequency, anchor, false);
        let mut gain = Automation::from_breakpoints(&voice.gain, anchor, true);

        // Voices whose gain envelope ends loud still decay to the floor by
        // the end of their duration.
        if let Some(&(last_t, last_v)) = voice.gain.last() {
            if last_t < voice.duration && last_v > super::envelope::GAIN_FLOOR {
                gain.exponential_ramp_to(0.0, anchor + voice.duration);
            }
        }

        let filter = voice
            .filter
            .as_ref()
            .map(|f| BiquadFilter::new(f.kind, f.frequency, f.q, f.gain_db, sample_rate));

        VoiceNode {
            oscillator: Oscillator::new(voice.waveform, sample_rate),
            frequency,
            gain,
            filter,
            level,
            start_time: anchor + voice.onset(),
            stop_time: anchor + voice.duration,
        }
    }

    /// Output at graph time `time`. Silent outside [start, stop).
    pub fn render_sample(&mut self, time: f64) -> f64 {
        if time < self.start_time || time >= self.stop_time {
            return 0.0;
        }
        let raw = self.oscillator.next_sample(self.frequency.value_at(time));
        let shaped = match self.filter.as_mut() {
            Some(filter) => filter.process(raw),
            None => raw,
        };
        shaped * self.gain.value_at(time) * self.level
    }

    pub fn has_started(&self, time: f64) -> bool {
        time >= self.start_time
    }

    pub fn is_finished(&self, time: f64) -> bool {
        time >= self.stop_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::filter::FilterKind;
    use crate::dsp::oscillator::Waveform;
    use crate::plan::FilterSpec;

    const SR: f64 = 44100.0;

    fn beep() -> Voice {
        Voice {
            name: "beep".into(),
            waveform: Waveform::Sine,
            frequency: vec![(0.0, 1000.0)],
            gain: vec![(0.0, 0.0), (0.01, 0.5), (0.2, 0.001)],
            filter: None,
            duration: 0.2,
        }
    }

    fn render(node: &mut VoiceNode, from: f64, seconds: f64) -> Vec<f64> {
        let n = (seconds * SR) as usize;
        (0..n).map(|i| node.render_sample(from + i as f64 / SR)).collect()
    }

    #[test]
    fn silent_before_start() {
        let mut node = VoiceNode::new(&beep(), 1.0, 1.0, SR);
        let out = render(&mut node, 0.0, 1.0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn produces_sound_inside_window() {
        let mut node = VoiceNode::new(&beep(), 0.5, 1.0, SR);
        let out = render(&mut node, 0.5, 0.2);
        let peak = out.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        assert!(peak > 0.3, "peak {peak}");
        assert!(peak <= 0.5 + 1e-9);
    }

    #[test]
    fn finished_after_duration() {
        let node = VoiceNode::new(&beep(), 2.0, 1.0, SR);
        assert!(!node.is_finished(2.1));
        assert!(node.is_finished(2.2));
        assert!(node.has_started(2.0));
    }

    #[test]
    fn tail_is_quiet() {
        let mut node = VoiceNode::new(&beep(), 0.0, 1.0, SR);
        let out = render(&mut node, 0.0, 0.2);
        let tail = &out[out.len() - 50..];
        assert!(tail.iter().all(|s| s.abs() < 0.01));
    }

    #[test]
    fn loud_final_breakpoint_still_decays() {
        let mut voice = beep();
        voice.gain = vec![(0.0, 0.4)];
        voice.duration = 0.3;
        let mut node = VoiceNode::new(&voice, 0.0, 1.0, SR);
        let out = render(&mut node, 0.0, 0.3);
        let tail = &out[out.len() - 20..];
        assert!(tail.iter().all(|s| s.abs() < 0.001), "tail should approach the floor");
    }

    #[test]
    fn level_scales_output() {
        let mut loud = VoiceNode::new(&beep(), 0.0, 1.0, SR);
        let mut soft = VoiceNode::new(&beep(), 0.0, 0.25, SR);
        let a = render(&mut loud, 0.0, 0.1);
        let b = render(&mut soft, 0.0, 0.1);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x * 0.25 - y).abs() < 1e-12);
        }
    }

    #[test]
    fn filtered_voice_is_finite() {
        let mut voice = beep();
        voice.filter = Some(FilterSpec::new(FilterKind::Highpass, 2000.0, 0.7));
        let mut node = VoiceNode::new(&voice, 0.0, 1.0, SR);
        assert!(render(&mut node, 0.0, 0.2).iter().all(|s| s.is_finite()));
    }
}
