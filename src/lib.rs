pub mod buffer;
pub mod canvas;
pub mod config;
pub mod console_display;
pub mod controller;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod history;
pub mod input;
pub mod key;
pub mod player;
pub mod recorder;
pub mod renderer;
pub mod scale;
pub mod simulator;
pub mod sync;
pub mod types;
pub mod wav_input;

#[cfg(feature = "audio")]
pub mod audio_input;
