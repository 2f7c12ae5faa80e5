// src/lib.rs

//! Audio engine core: lock-free capture from an input device to disk, range-bounded DSP
//! effects, planar cut / insert editing, and WAV / MP3 file I/O.

pub mod audio_buffer;
pub mod audio_file;
pub mod capture;
pub mod editing;
pub mod error;
pub mod fx;
pub mod fx_components;
pub mod pool;
pub mod resources;
pub mod ring;
pub mod settings;
pub mod thread_pool;

pub use audio_file::{load_audio, save_audio, AudioFile, AudioFormat, PlanarAudio, WriteInfo};
pub use editing::{apply_edit, Cut, EditOp, Insert};
pub use error::{
    CollectingErrorSink, ConsoleErrorSink, EngineError, EngineResult, ErrorKind, ErrorSink,
};
pub use fx::{apply_effect, apply_effect_all_channels, EffectKind, EffectParams, SampleRange};
pub use resources::EngineResources;
