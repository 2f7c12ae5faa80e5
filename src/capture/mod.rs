// src/capture/mod.rs

//! Recording from an input device to disk.

pub mod device;
pub mod event;
pub mod pipeline;
pub mod streamer;

pub use device::{list_input_devices, CpalInput, InputBackend, InputConfig, InputStream, ToneInput};
pub use event::{ConsoleEventHandler, EventHandler, TimedEventHandler};
pub use pipeline::{CallbackFlow, CaptureCallback, CapturePipeline, CaptureStats, PipelineState};
pub use streamer::{FileStreamer, StreamKind, StreamStats};

use crate::error::{EngineError, EngineResult, ErrorKind};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recorded files under `<session_dir>/records`, sorted by file name.
///
/// A session directory without a `records` folder simply has no recordings yet.
pub fn list_recordings(session_dir: &Path) -> EngineResult<Vec<PathBuf>> {
    let records = session_dir.join(StreamKind::Recording.subdir());
    if !records.exists() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(&records).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            EngineError::new(
                ErrorKind::FileReadError,
                format!("Failed to list {}: {}", records.display(), e),
            )
        })?;
        let path = entry.path();
        let is_recording = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(streamer::RECORDING_EXTENSION));
        if entry.file_type().is_file() && is_recording {
            found.push(path.to_path_buf());
        }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}
