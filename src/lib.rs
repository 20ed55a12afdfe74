pub mod config;
pub mod dsp;
pub mod error;
pub mod plan;
pub mod presets;
pub mod renderer;
pub mod sequencer;
pub mod timer;

use wasm_bindgen::prelude::*;

use crate::config::SessionConfig;
use crate::error::PlanError;
use crate::plan::SequencePlan;
use crate::sequencer::{Ambience, SessionState};

pub use crate::error::AmbienceError;
pub use crate::sequencer::{PlaybackSession, StopSignal, start};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Autoplay grace used by the browser forest preset.
const WELCOME_START_DELAY: f64 = 1.0;

/// WASM-exposed: return the crate version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: install the panic hook and route `log` to the console.
/// Call once before anything else.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn ambience_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).ok();
}

fn plan_error(e: PlanError, source: &str) -> JsValue {
    JsValue::from_str(&e.report(source))
}

fn load(plan_json: &str, config_json: &str) -> Result<(SequencePlan, SessionConfig), JsValue> {
    let plan = SequencePlan::from_json(plan_json).map_err(|e| plan_error(e, plan_json))?;
    let config = if config_json.trim().is_empty() {
        SessionConfig::default()
    } else {
        SessionConfig::from_json(config_json).map_err(|e| plan_error(e, config_json))?
    };
    Ok((plan, config))
}

/// WASM-exposed: the built-in forest plan as JSON, a starting point for
/// custom soundscapes.
#[wasm_bindgen]
pub fn default_plan_json() -> Result<String, JsValue> {
    presets::forest_plan()
        .to_json()
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// WASM-exposed: render `seconds` of a plan (plus a fade) to mono f32 samples.
#[wasm_bindgen]
pub fn render_ambience_samples(
    plan_json: &str,
    seconds: f64,
    fade: f64,
    sample_rate: u32,
    seed: u32,
) -> Result<Vec<f32>, JsValue> {
    for (name, value) in [("seconds", seconds), ("fade", fade)] {
        if !(value.is_finite() && (0.0..=renderer::MAX_RENDER_SECONDS).contains(&value)) {
            return Err(JsValue::from_str(&format!(
                "{name} must be between 0 and {} seconds",
                renderer::MAX_RENDER_SECONDS
            )));
        }
    }
    let (plan, config) = load(plan_json, "")?;
    let config = config.with_sample_rate(sample_rate as f64).with_seed(seed as u64);
    Ok(renderer::render_plan(&plan, &config, seconds, fade))
}

/// WASM-exposed: render a plan to a WAV byte array.
#[wasm_bindgen]
pub fn render_ambience_wav(
    plan_json: &str,
    seconds: f64,
    fade: f64,
    sample_rate: u32,
    seed: u32,
) -> Result<Vec<u8>, JsValue> {
    let samples = render_ambience_samples(plan_json, seconds, fade, sample_rate, seed)?;
    Ok(renderer::encode_wav(&samples, sample_rate))
}

/// WASM-exposed: the habit-created chime as a WAV byte array.
#[wasm_bindgen]
pub fn render_celebration_wav(sample_rate: u32) -> Vec<u8> {
    let config = SessionConfig::default().with_sample_rate(sample_rate as f64);
    let samples = renderer::render_cues(&presets::celebration_chime(), &config);
    renderer::encode_wav(&samples, sample_rate)
}

/// Block processor for an AudioWorklet: the page calls `process` with each
/// output buffer and `stop` when the user moves on.
#[wasm_bindgen]
pub struct AmbienceProcessor {
    ambience: Ambience,
    plan: SequencePlan,
}

#[wasm_bindgen]
impl AmbienceProcessor {
    #[wasm_bindgen(constructor)]
    pub fn new(plan_json: &str, config_json: &str, sound_enabled: bool) -> Result<AmbienceProcessor, JsValue> {
        let (plan, config) = load(plan_json, config_json)?;
        Ok(AmbienceProcessor {
            ambience: Ambience::new(config, sound_enabled),
            plan,
        })
    }

    /// The welcome-screen forest, starting after a short autoplay grace.
    pub fn forest(sample_rate: f64, seed: u32, sound_enabled: bool) -> AmbienceProcessor {
        let mut config = SessionConfig::default()
            .with_sample_rate(sample_rate)
            .with_seed(seed as u64);
        config.start_delay = WELCOME_START_DELAY;
        AmbienceProcessor {
            ambience: Ambience::new(config, sound_enabled),
            plan: presets::forest_plan(),
        }
    }

    pub fn start(&mut self) -> bool {
        self.ambience.start(self.plan.clone())
    }

    pub fn process(&mut self, out: &mut [f32]) {
        self.ambience.render(out);
    }

    pub fn stop(&mut self, fade: f64) {
        if let Some(session) = self.ambience.session_mut() {
            session.stop(fade);
        }
    }

    pub fn celebrate(&mut self) {
        self.ambience.celebrate(&presets::celebration_chime());
    }

    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.ambience.set_sound_enabled(enabled);
    }

    pub fn sound_enabled(&self) -> bool {
        self.ambience.sound_enabled()
    }

    /// True once a stop has fully faded out, or when nothing was playing.
    pub fn is_stopped(&self) -> bool {
        self.ambience.fading_sessions() == 0
            && self
                .ambience
                .session()
                .is_none_or(|s| s.state() == SessionState::Stopped)
    }

    pub fn active_resources(&self) -> u32 {
        self.ambience.active_resources() as u32
    }

    pub fn stats(&self) -> Result<JsValue, JsValue> {
        let stats = self.ambience.session().map(PlaybackSession::stats);
        serde_wasm_bindgen::to_value(&stats).map_err(|e| JsValue::from_str(&format!("{e}")))
    }
}
