//! Output graph: the per-session audio context.
//!
//! Owns every live node, keeps the sample clock and renders blocks into
//! the caller's buffer. One graph belongs to exactly one playback session.

use log::debug;

use crate::config::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::error::AmbienceError;
use crate::plan::Voice;

use super::mixer::Mixer;
use super::noise::BedNode;
use super::voice::VoiceNode;

/// Frames rendered per graph step. Timers are checked between blocks.
pub const BLOCK_SIZE: usize = 128;

/// Handle to a bed inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BedId(usize);

pub struct OutputGraph {
    sample_rate: f64,
    frame: u64,
    voices: Vec<VoiceNode>,
    beds: Vec<Option<BedNode>>,
    mixer: Mixer,
}

impl OutputGraph {
    /// Open a graph at `sample_rate`. A rate outside the supported range
    /// means there is no usable audio output.
    pub fn open(sample_rate: f64, master_gain: f64) -> Result<Self, AmbienceError> {
        if !sample_rate.is_finite() || !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(AmbienceError::PlatformUnavailable(format!(
                "unsupported sample rate {sample_rate}"
            )));
        }
        debug!("output graph opened at {sample_rate} Hz");
        Ok(OutputGraph {
            sample_rate,
            frame: 0,
            voices: Vec::new(),
            beds: Vec::new(),
            mixer: Mixer::new(master_gain),
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current graph time in seconds.
    pub fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Schedule `voice` to play `offset` seconds from now, fire-and-forget.
    pub fn play_voice(&mut self, voice: &Voice, offset: f64, level: f64) {
        let anchor = self.now() + offset.max(0.0);
        self.voices
            .push(VoiceNode::new(voice, anchor, level, self.sample_rate));
    }

    /// Drop voices that have been scheduled but have not started yet.
    /// Returns how many were dropped.
    pub fn drop_pending_voices(&mut self) -> usize {
        let now = self.now();
        let before = self.voices.len();
        self.voices.retain(|v| v.has_started(now));
        before - self.voices.len()
    }

    pub fn add_bed(&mut self, bed: BedNode) -> BedId {
        self.beds.push(Some(bed));
        BedId(self.beds.len() - 1)
    }

    pub fn fade_bed(&mut self, id: BedId, fade: f64) {
        let now = self.now();
        if let Some(Some(bed)) = self.beds.get_mut(id.0) {
            bed.fade_out(now, fade);
        }
    }

    /// Stop and free a bed. Returns false if it was already gone.
    pub fn release_bed(&mut self, id: BedId) -> bool {
        match self.beds.get_mut(id.0).and_then(Option::take) {
            Some(mut bed) => {
                bed.release();
                true
            }
            None => false,
        }
    }

    /// Render `out.len()` frames and advance the clock.
    pub fn render(&mut self, out: &mut [f32]) {
        let frames = out.len();
        let start = self.frame;
        let sr = self.sample_rate;

        self.mixer.clear(frames);
        for voice in self.voices.iter_mut() {
            for i in 0..frames {
                let t = (start + i as u64) as f64 / sr;
                self.mixer.add(i, voice.render_sample(t));
            }
        }
        for bed in self.beds.iter_mut().flatten() {
            for i in 0..frames {
                let t = (start + i as u64) as f64 / sr;
                self.mixer.add(i, bed.render_sample(t));
            }
        }
        self.mixer.write_to(out);

        self.frame += frames as u64;
        let now = self.now();
        self.voices.retain(|v| !v.is_finished(now));
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn active_beds(&self) -> usize {
        self.beds.iter().flatten().count()
    }

    /// Live voices + live beds.
    pub fn active_resources(&self) -> usize {
        self.active_voices() + self.active_beds()
    }

    /// Release every node. The graph renders silence afterwards.
    pub fn close(&mut self) {
        for bed in self.beds.iter_mut().flatten() {
            bed.release();
        }
        self.beds.clear();
        self.voices.clear();
        debug!("output graph closed at {:.3}s", self.now());
    }
}
