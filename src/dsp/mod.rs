//! DSP: pure Rust synthesis for the ambience.
//!
//! The same code drives the browser (blocks pulled from an AudioWorklet via
//! WASM) and offline rendering to WAV.

pub mod envelope;
pub mod filter;
pub mod graph;
pub mod mixer;
pub mod noise;
pub mod oscillator;
pub mod voice;
