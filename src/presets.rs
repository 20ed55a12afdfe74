//! Built-in soundscapes: a forest morning for the welcome screen and the
//! chime played when a habit is created.

use crate::dsp::filter::FilterKind;
use crate::dsp::oscillator::Waveform;
use crate::plan::{Cue, DelayRange, FilterSpec, NoiseBed, NoiseShape, SequencePlan, Voice, VoiceCategory};

/// C5, E5, G5.
const CHIME_NOTES: [f64; 3] = [523.25, 659.25, 783.99];
const CHIME_SPACING: f64 = 0.1;

pub fn robin() -> Voice {
    Voice {
        name: "robin".into(),
        waveform: Waveform::Sine,
        frequency: vec![
            (0.0, 2600.0),
            (0.06, 3400.0),
            (0.06, 2900.0),
            (0.14, 3600.0),
            (0.2, 3100.0),
        ],
        gain: vec![(0.0, 0.0), (0.01, 0.12), (0.12, 0.1), (0.22, 0.001)],
        filter: None,
        duration: 0.24,
    }
}

pub fn sparrow() -> Voice {
    Voice {
        name: "sparrow".into(),
        waveform: Waveform::Triangle,
        frequency: vec![(0.0, 4200.0), (0.04, 5200.0), (0.08, 4600.0)],
        gain: vec![(0.0, 0.0), (0.005, 0.08), (0.09, 0.001)],
        filter: Some(FilterSpec::new(FilterKind::Highpass, 1500.0, 0.7)),
        duration: 0.1,
    }
}

/// Fast two-note trill.
pub fn warbler() -> Voice {
    let mut frequency = Vec::new();
    for step in 0..4 {
        let t = step as f64 * 0.03;
        let f = if step % 2 == 0 { 3800.0 } else { 4400.0 };
        frequency.push((t, f));
        frequency.push((t + 0.03, f));
    }
    Voice {
        name: "warbler".into(),
        waveform: Waveform::Square,
        frequency,
        gain: vec![(0.0, 0.0), (0.01, 0.05), (0.1, 0.04), (0.15, 0.001)],
        filter: Some(FilterSpec::new(FilterKind::Lowpass, 5000.0, 0.7)),
        duration: 0.16,
    }
}

pub fn cuckoo() -> Voice {
    Voice {
        name: "cuckoo".into(),
        waveform: Waveform::Sine,
        frequency: vec![(0.0, 740.0), (0.25, 740.0), (0.3, 587.0)],
        gain: vec![
            (0.0, 0.0),
            (0.02, 0.1),
            (0.2, 0.08),
            (0.25, 0.02),
            (0.3, 0.09),
            (0.55, 0.001),
        ],
        filter: Some(FilterSpec::new(FilterKind::Lowpass, 1500.0, 0.7)),
        duration: 0.6,
    }
}

/// Low rumbling wind; the swell spans exactly one loop so the seam is silent.
pub fn wind() -> NoiseBed {
    NoiseBed {
        name: "wind".into(),
        seconds: 4.0,
        channels: 2,
        shape: NoiseShape::Swell {
            period_seconds: 4.0,
            depth: 0.6,
        },
        filters: vec![
            FilterSpec::new(FilterKind::Lowpass, 500.0, 0.5),
            FilterSpec::new(FilterKind::Highpass, 60.0, 0.7),
        ],
        gain: 0.12,
    }
}

pub fn stream() -> NoiseBed {
    NoiseBed {
        name: "stream".into(),
        seconds: 3.0,
        channels: 1,
        shape: NoiseShape::Swell {
            period_seconds: 1.5,
            depth: 0.25,
        },
        filters: vec![
            FilterSpec::new(FilterKind::Bandpass, 900.0, 0.4),
            FilterSpec::new(FilterKind::Lowpass, 2500.0, 0.7),
        ],
        gain: 0.06,
    }
}

pub fn leaves() -> NoiseBed {
    NoiseBed {
        name: "leaves".into(),
        seconds: 2.0,
        channels: 1,
        shape: NoiseShape::Rustle {
            probability: 0.015,
            high: 1.0,
            low: 0.08,
        },
        filters: vec![
            FilterSpec::new(FilterKind::Highpass, 3000.0, 0.7),
            FilterSpec::new(FilterKind::Lowpass, 8000.0, 0.7),
        ],
        gain: 0.05,
    }
}

/// Wind, water and leaves with songbirds close by and a cuckoo far off.
pub fn forest_plan() -> SequencePlan {
    SequencePlan {
        beds: vec![wind(), stream(), leaves()],
        categories: vec![
            VoiceCategory::new(
                "songbirds",
                vec![robin(), sparrow(), warbler()],
                DelayRange::new(2.0, 6.0),
            )
            .with_fanout(0.3, 2),
            VoiceCategory::new("distant", vec![cuckoo()], DelayRange::new(9.0, 16.0)).with_gain(0.6),
        ],
    }
}

/// Rising C-major arpeggio, one note every 100 ms.
pub fn celebration_chime() -> Vec<Cue> {
    CHIME_NOTES
        .iter()
        .enumerate()
        .map(|(i, &freq)| Cue {
            voice: Voice {
                name: format!("chime-{}", i + 1),
                waveform: Waveform::Sine,
                frequency: vec![(0.0, freq)],
                gain: vec![(0.0, 0.0), (0.01, 0.1), (0.3, 0.001)],
                filter: None,
                duration: 0.3,
            },
            at: i as f64 * CHIME_SPACING,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forest_plan_is_valid() {
        forest_plan().validate().unwrap();
    }

    #[test]
    fn forest_plan_survives_json() {
        let json = forest_plan().to_json().unwrap();
        let plan = SequencePlan::from_json(&json).unwrap();
        let beds: Vec<_> = plan.beds.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(beds, ["wind", "stream", "leaves"]);
        assert_eq!(plan.categories[0].voices.len(), 3);
        assert!(matches!(plan.beds[2].shape, NoiseShape::Rustle { .. }));
    }

    #[test]
    fn warbler_alternates_with_jumps() {
        let v = warbler();
        assert_eq!(v.frequency.len(), 8);
        assert_eq!(v.frequency[1].0, v.frequency[2].0);
        assert_ne!(v.frequency[1].1, v.frequency[2].1);
    }

    #[test]
    fn chime_rises() {
        let cues = celebration_chime();
        assert_eq!(cues.len(), 3);
        for pair in cues.windows(2) {
            assert!(pair[1].at > pair[0].at);
            assert!(pair[1].voice.frequency[0].1 > pair[0].voice.frequency[0].1);
        }
    }
}
