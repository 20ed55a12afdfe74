//! Ambient sequencer: playback sessions and the UI-facing controller.
//!
//! `start` opens an output graph, brings up every noise bed and arms one
//! self-rescheduling timer per voice category. `PlaybackSession::stop`
//! fades the beds, cancels those timers and releases the graph once the
//! fade has elapsed. Everything runs on the graph clock inside `render`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::SessionConfig;
use crate::dsp::graph::{BLOCK_SIZE, BedId, OutputGraph};
use crate::dsp::noise::{self, BedNode};
use crate::error::AmbienceError;
use crate::plan::{Cue, SequencePlan};
use crate::timer::{TimerHandle, TimerQueue};

/// Spread between the first voice of a tick and its fan-out companions.
const FANOUT_STAGGER: std::ops::Range<f64> = 0.05..0.4;

/// How many recently played voices a session remembers.
const RECENT_VOICES: usize = 64;

/// Lifecycle of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Graph open, waiting out the start delay.
    Starting,
    Running,
    /// Fading out; resources are released when the fade ends.
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Task {
    Start,
    Tick(usize),
    Release,
}

/// One voice the sequencer scheduled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayedVoice {
    pub category: String,
    pub voice: String,
    /// Graph time the voice was scheduled to start at.
    pub at: f64,
}

/// Snapshot for hosts and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub state: SessionState,
    pub silent: bool,
    pub time: f64,
    pub active_voices: usize,
    pub active_beds: usize,
    pub pending_timers: usize,
    pub voices_played: u64,
}

#[derive(Default)]
struct SignalState {
    complete: bool,
    callbacks: Vec<Box<dyn FnOnce()>>,
}

/// Completion of a `stop`. Clones share state.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Rc<RefCell<SignalState>>,
}

impl StopSignal {
    fn pending() -> Self {
        StopSignal::default()
    }

    fn completed() -> Self {
        let signal = StopSignal::default();
        signal.inner.borrow_mut().complete = true;
        signal
    }

    pub fn is_complete(&self) -> bool {
        self.inner.borrow().complete
    }

    /// Run `f` once the fade has finished and resources are released.
    /// Runs immediately if that has already happened.
    pub fn on_complete(&self, f: impl FnOnce() + 'static) {
        let complete = self.inner.borrow().complete;
        if complete {
            f();
        } else {
            self.inner.borrow_mut().callbacks.push(Box::new(f));
        }
    }

    fn complete(&self) {
        let callbacks = {
            let mut state = self.inner.borrow_mut();
            if state.complete {
                return;
            }
            state.complete = true;
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            callback();
        }
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("StopSignal")
            .field("complete", &state.complete)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

/// Start a session for `plan`.
///
/// Never fails: when no audio output can be opened the failure is logged
/// and the returned session is silent.
pub fn start(plan: SequencePlan, config: SessionConfig) -> PlaybackSession {
    PlaybackSession::start(plan, config)
}

/// Owns every audio resource of one ambience lifetime.
pub struct PlaybackSession {
    plan: SequencePlan,
    config: SessionConfig,
    graph: Option<OutputGraph>,
    rng: StdRng,
    timers: TimerQueue<Task>,
    start_timer: Option<TimerHandle>,
    tick_timers: Vec<Option<TimerHandle>>,
    beds: Vec<BedId>,
    state: SessionState,
    stop_signal: Option<StopSignal>,
    recent: VecDeque<PlayedVoice>,
    voices_played: u64,
    silent: bool,
}

impl PlaybackSession {
    pub fn start(plan: SequencePlan, config: SessionConfig) -> Self {
        let plan = match plan.validate() {
            Ok(()) => plan,
            Err(e) => {
                warn!("{}; playing silence instead", AmbienceError::from(e));
                SequencePlan::default()
            }
        };
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("{}; using defaults for the unusable settings", AmbienceError::from(e));
                config.sanitized()
            }
        };
        let graph = match OutputGraph::open(config.sample_rate, config.master_gain) {
            Ok(graph) => Some(graph),
            Err(e) => {
                warn!("ambience disabled: {e}");
                None
            }
        };

        let mut session = PlaybackSession {
            rng: StdRng::seed_from_u64(config.seed),
            tick_timers: vec![None; plan.categories.len()],
            plan,
            config,
            graph,
            timers: TimerQueue::new(),
            start_timer: None,
            beds: Vec::new(),
            state: SessionState::Starting,
            stop_signal: None,
            recent: VecDeque::with_capacity(RECENT_VOICES),
            voices_played: 0,
            silent: false,
        };

        if session.graph.is_none() {
            session.silent = true;
            session.state = SessionState::Stopped;
            session.stop_signal = Some(StopSignal::completed());
            return session;
        }

        if session.config.start_delay > 0.0 {
            debug!("ambience starts in {:.2}s", session.config.start_delay);
            let due = session.now() + session.config.start_delay;
            session.start_timer = Some(session.timers.set_timeout(due, Task::Start));
        } else {
            session.begin_playback();
        }
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True when no audio output could be opened.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Still holding audio resources or waiting to.
    pub fn is_live(&self) -> bool {
        matches!(self.state, SessionState::Starting | SessionState::Running)
    }

    pub fn plan(&self) -> &SequencePlan {
        &self.plan
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Graph time in seconds; 0 once the graph is gone.
    pub fn now(&self) -> f64 {
        self.graph.as_ref().map_or(0.0, OutputGraph::now)
    }

    /// Live beds and voices.
    pub fn active_resources(&self) -> usize {
        self.graph.as_ref().map_or(0, OutputGraph::active_resources)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// The most recent scheduled voices, oldest first.
    pub fn recent_voices(&self) -> impl Iterator<Item = &PlayedVoice> {
        self.recent.iter()
    }

    pub fn voices_played(&self) -> u64 {
        self.voices_played
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state,
            silent: self.silent,
            time: self.now(),
            active_voices: self.graph.as_ref().map_or(0, OutputGraph::active_voices),
            active_beds: self.graph.as_ref().map_or(0, OutputGraph::active_beds),
            pending_timers: self.timers.len(),
            voices_played: self.voices_played,
        }
    }

    /// Render the next `out.len()` frames. Timers due inside the buffer fire
    /// at block boundaries. Writes silence once the session has stopped.
    pub fn render(&mut self, out: &mut [f32]) {
        for block in out.chunks_mut(BLOCK_SIZE) {
            self.run_due_timers();
            match self.graph.as_mut() {
                Some(graph) => graph.render(block),
                None => block.fill(0.0),
            }
        }
    }

    /// Play a fixed list of cues once, on top of whatever is running.
    pub fn play_once(&mut self, cues: &[Cue]) {
        if !self.is_live() {
            debug!("play_once ignored: session is {:?}", self.state);
            return;
        }
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        for cue in cues {
            graph.play_voice(&cue.voice, cue.at, 1.0);
        }
        debug!("played {} cue(s)", cues.len());
    }

    /// Fade out over `fade_seconds` and release everything.
    ///
    /// Safe to call at any point, any number of times. Redundant calls
    /// return the signal of the first stop.
    pub fn stop(&mut self, fade_seconds: f64) -> StopSignal {
        match self.begin_stop(fade_seconds) {
            Ok(signal) => signal,
            Err(AmbienceError::AlreadyStopped) => {
                debug!("stop ignored: session already {:?}", self.state);
                self.stop_signal.clone().unwrap_or_else(StopSignal::completed)
            }
            Err(e) => {
                warn!("stop failed: {e}");
                self.release();
                self.stop_signal.clone().unwrap_or_else(StopSignal::completed)
            }
        }
    }

    fn begin_stop(&mut self, fade_seconds: f64) -> Result<StopSignal, AmbienceError> {
        if !self.is_live() {
            return Err(AmbienceError::AlreadyStopped);
        }
        let fade = if fade_seconds.is_finite() && fade_seconds > 0.0 {
            fade_seconds
        } else {
            0.0
        };

        self.cancel_schedule();
        let signal = StopSignal::pending();
        self.stop_signal = Some(signal.clone());

        let was_starting = self.state == SessionState::Starting;
        self.state = SessionState::Stopping;
        if was_starting || fade == 0.0 {
            self.release();
            return Ok(signal);
        }

        let graph = self
            .graph
            .as_mut()
            .ok_or_else(|| AmbienceError::PlatformUnavailable("graph already released".into()))?;
        let dropped = graph.drop_pending_voices();
        for &bed in &self.beds {
            graph.fade_bed(bed, fade);
        }
        let due = graph.now() + fade;
        self.timers.set_timeout(due, Task::Release);
        info!(
            "ambience fading out over {fade:.2}s ({} bed(s), {dropped} unplayed voice(s) dropped)",
            self.beds.len()
        );
        Ok(signal)
    }

    fn cancel_schedule(&mut self) {
        if let Some(handle) = self.start_timer.take() {
            self.timers.cancel(handle);
        }
        for slot in self.tick_timers.iter_mut() {
            if let Some(handle) = slot.take() {
                self.timers.cancel(handle);
            }
        }
    }

    fn run_due_timers(&mut self) {
        loop {
            let Some(now) = self.graph.as_ref().map(OutputGraph::now) else {
                return;
            };
            let Some((handle, task)) = self.timers.pop_due(now) else {
                return;
            };
            match task {
                Task::Start => {
                    self.start_timer = None;
                    self.begin_playback();
                }
                Task::Tick(category) => {
                    if self.tick_timers.get(category) == Some(&Some(handle)) {
                        self.tick(category);
                    }
                }
                Task::Release => self.release(),
            }
        }
    }

    fn begin_playback(&mut self) {
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        let now = graph.now();
        let sample_rate = graph.sample_rate();
        for spec in &self.plan.beds {
            let buffer = noise::generate(spec, sample_rate, &mut self.rng);
            let node = BedNode::new(spec, buffer, now, self.config.bed_fade_in, sample_rate);
            self.beds.push(graph.add_bed(node));
        }
        for (i, slot) in self.tick_timers.iter_mut().enumerate() {
            *slot = Some(self.timers.set_timeout(now, Task::Tick(i)));
        }
        self.state = SessionState::Running;
        info!(
            "ambience started: {} bed(s), {} voice categor(ies)",
            self.plan.beds.len(),
            self.plan.categories.len()
        );
    }

    /// One step of a category's loop: play a voice somewhere inside the
    /// upcoming window, maybe a few companions, then re-arm.
    fn tick(&mut self, index: usize) {
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        let Some(category) = self.plan.categories.get(index) else {
            return;
        };
        let now = graph.now();
        let min_step = BLOCK_SIZE as f64 / graph.sample_rate();
        let delay = self
            .rng
            .random_range(category.delay.min..=category.delay.max);
        let offset = if delay > 0.0 {
            self.rng.random_range(0.0..delay)
        } else {
            0.0
        };

        let mut picks = vec![(self.rng.random_range(0..category.voices.len()), offset)];
        if let Some(fanout) = category.fanout {
            if self.rng.random_bool(fanout.probability) {
                let extra = self.rng.random_range(1..=fanout.max_extra.clamp(1, 2));
                for _ in 0..extra {
                    let pick = self.rng.random_range(0..category.voices.len());
                    let stagger = self.rng.random_range(FANOUT_STAGGER);
                    picks.push((pick, offset + stagger));
                }
            }
        }

        for (pick, at) in picks {
            let voice = &category.voices[pick];
            graph.play_voice(voice, at, category.gain);
            if self.recent.len() == RECENT_VOICES {
                self.recent.pop_front();
            }
            self.recent.push_back(PlayedVoice {
                category: category.name.clone(),
                voice: voice.name.clone(),
                at: now + at,
            });
            self.voices_played += 1;
        }

        // Always at least one block ahead.
        let due = (now + delay + self.config.reschedule_buffer).max(now + min_step);
        self.tick_timers[index] = Some(self.timers.set_timeout(due, Task::Tick(index)));
        debug!("{} tick at {now:.2}s, next in {:.2}s", category.name, due - now);
    }

    fn release(&mut self) {
        self.cancel_schedule();
        self.timers.clear();
        if let Some(mut graph) = self.graph.take() {
            for bed in self.beds.drain(..) {
                graph.release_bed(bed);
            }
            graph.close();
        }
        self.beds.clear();
        self.state = SessionState::Stopped;
        info!("ambience stopped");
        if let Some(signal) = &self.stop_signal {
            signal.complete();
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if self.state != SessionState::Stopped {
            debug!("session dropped while {:?}; releasing", self.state);
            self.release();
        }
    }
}

/// What the welcome screen and habit form need from sound: a persisted
/// on/off flag, one ambience at a time, a chime, and a transition that
/// waits for the fade.
///
/// A session that is fading out when a new one opens keeps rendering,
/// mixed under the new one, until its fade has finished.
pub struct Ambience {
    config: SessionConfig,
    sound_enabled: bool,
    session: Option<PlaybackSession>,
    fading: Vec<PlaybackSession>,
    scratch: Vec<f32>,
    sessions_opened: u64,
}

impl Ambience {
    pub fn new(config: SessionConfig, sound_enabled: bool) -> Self {
        Ambience {
            config,
            sound_enabled,
            session: None,
            fading: Vec::new(),
            scratch: Vec::new(),
            sessions_opened: 0,
        }
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    /// Turning sound off fades out whatever is playing.
    pub fn set_sound_enabled(&mut self, enabled: bool) -> Option<StopSignal> {
        self.sound_enabled = enabled;
        if enabled {
            return None;
        }
        let fade = self.config.default_fade;
        self.session.as_mut().map(|s| s.stop(fade))
    }

    /// Start `plan`. Returns false when sound is off or a session is
    /// already live; a second live session is never opened.
    pub fn start(&mut self, plan: SequencePlan) -> bool {
        if !self.sound_enabled {
            debug!("ambience not started: sound disabled");
            return false;
        }
        if let Some(session) = &self.session {
            if session.is_live() {
                warn!("ambience start requested while a session is live; keeping the current one");
                return false;
            }
        }
        let config = self.next_config();
        self.open(plan, config);
        true
    }

    /// Each session gets its own seed so repeated visits don't replay the
    /// exact same birdsong.
    fn next_config(&mut self) -> SessionConfig {
        let mut config = self.config.clone();
        config.seed = self.config.seed.wrapping_add(self.sessions_opened);
        self.sessions_opened += 1;
        config
    }

    fn open(&mut self, plan: SequencePlan, config: SessionConfig) {
        let previous = self.session.replace(PlaybackSession::start(plan, config));
        if let Some(old) = previous {
            if old.state() != SessionState::Stopped {
                debug!("keeping a {:?} session until its fade ends", old.state());
                self.fading.push(old);
            }
        }
    }

    /// Play cues once. Uses the live session, or opens a bare one.
    pub fn celebrate(&mut self, cues: &[Cue]) {
        if !self.sound_enabled {
            return;
        }
        let live = self.session.as_ref().is_some_and(PlaybackSession::is_live);
        if !live {
            let mut config = self.next_config();
            config.start_delay = 0.0;
            self.open(SequencePlan::default(), config);
        }
        if let Some(session) = self.session.as_mut() {
            session.play_once(cues);
        }
    }

    /// Fade out, then run `continuation`. With nothing playing the
    /// continuation runs right away.
    pub fn get_started(&mut self, fade_seconds: f64, continuation: impl FnOnce() + 'static) {
        match self.session.as_mut() {
            Some(session) => session.stop(fade_seconds).on_complete(continuation),
            None => continuation(),
        }
    }

    /// Drive the current session and any still fading out; stopped
    /// sessions are dropped afterwards.
    pub fn render(&mut self, out: &mut [f32]) {
        match self.session.as_mut() {
            Some(session) => session.render(out),
            None => out.fill(0.0),
        }
        if !self.fading.is_empty() {
            self.scratch.resize(out.len(), 0.0);
            let scratch = &mut self.scratch[..out.len()];
            for session in self.fading.iter_mut() {
                session.render(scratch);
                for (dst, &s) in out.iter_mut().zip(scratch.iter()) {
                    *dst = (*dst + s).clamp(-1.0, 1.0);
                }
            }
            self.fading.retain(|s| s.state() != SessionState::Stopped);
        }
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.state() == SessionState::Stopped)
        {
            self.session = None;
        }
    }

    /// Sessions replaced while fading that are still rendering.
    pub fn fading_sessions(&self) -> usize {
        self.fading.len()
    }

    /// Live beds and voices across the current and fading sessions.
    pub fn active_resources(&self) -> usize {
        self.session
            .iter()
            .chain(self.fading.iter())
            .map(PlaybackSession::active_resources)
            .sum()
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut PlaybackSession> {
        self.session.as_mut()
    }
}
