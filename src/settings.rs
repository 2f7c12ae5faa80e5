use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Buffers in each pool and slots in each filled queue.
    pub pool_buffers: usize,
    /// Frames per pooled buffer.
    pub buffer_frames: usize,
    /// Worker threads. `None` uses the hardware concurrency.
    pub worker_threads: Option<usize>,
    pub recording_sample_rate: u32,
    pub recording_channels: u16,
    /// Length of one device callback block, in seconds.
    pub recording_buffer_seconds: f32,
    /// Pause between launching the disk writer and starting the input stream.
    pub settle_ms: u64,
    /// How long `record` waits for two idle workers before giving up.
    pub worker_wait_ms: u64,
    pub input_host: Option<String>,
    pub input_device: Option<String>,
    pub session_dir: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pool_buffers: 1024,
            buffer_frames: 1024,
            worker_threads: None,
            recording_sample_rate: 44_100,
            recording_channels: 2,
            recording_buffer_seconds: 0.01,
            settle_ms: 50,
            worker_wait_ms: 2_000,
            input_host: None,
            input_device: None,
            session_dir: None,
        }
    }
}

impl EngineSettings {
    /// Frames delivered per device callback.
    pub fn frames_per_callback(&self) -> usize {
        ((self.recording_sample_rate as f32 * self.recording_buffer_seconds).round() as usize)
            .max(1)
    }
}

pub fn get_config_dir() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("com", "Cypher", "CypherEngine")?;
    let config_dir = dirs.config_dir().to_path_buf();
    if !config_dir.exists() {
        if let Err(e) = fs::create_dir_all(&config_dir) {
            log::warn!(
                "Failed to create config directory at {}: {}",
                config_dir.display(),
                e
            );
            return None;
        }
    }
    Some(config_dir)
}

/// The default session directory: `<data dir>/Sessions`.
pub fn default_session_dir() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("com", "Cypher", "CypherEngine")?;
    Some(dirs.data_dir().join("Sessions"))
}

pub fn save_settings_to(settings: &EngineSettings, path: &Path) -> Result<()> {
    let json_string =
        serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, json_string)
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;
    Ok(())
}

pub fn save_settings(settings: &EngineSettings) -> Result<()> {
    let dir = get_config_dir().context("Could not determine the config directory")?;
    save_settings_to(settings, &dir.join(SETTINGS_FILE_NAME))
}

/// Reads settings from `path`, falling back to defaults when the file is missing or invalid.
pub fn load_settings_from(path: &Path) -> EngineSettings {
    if !path.exists() {
        return EngineSettings::default();
    }
    match fs::read_to_string(path) {
        Ok(json_string) => match serde_json::from_str(&json_string) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Failed to parse settings file, using defaults. Error: {}", e);
                EngineSettings::default()
            }
        },
        Err(e) => {
            log::warn!("Failed to read settings file, using defaults. Error: {}", e);
            EngineSettings::default()
        }
    }
}

pub fn load_settings() -> EngineSettings {
    match get_config_dir() {
        Some(dir) => load_settings_from(&dir.join(SETTINGS_FILE_NAME)),
        None => EngineSettings::default(),
    }
}
