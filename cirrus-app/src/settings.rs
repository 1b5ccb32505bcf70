//! Persistent daemon settings (JSON file in the data directory).

use std::fs;
use std::path::{Path, PathBuf};

use cirrus_core::{EngineConfig, SegmenterConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    pub silence_threshold_rms: f32,
    pub silence_close_ms: u32,
    pub max_utterance_secs: u32,
    pub queue_capacity: usize,
    pub worker_threads: usize,
    pub collection: String,
    pub database_path: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            silence_threshold_rms: 0.002,
            silence_close_ms: 2200,
            max_utterance_secs: 60,
            queue_capacity: 10,
            worker_threads: 2,
            collection: "wx-broadcasts".into(),
            database_path: None,
            archive_dir: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.silence_threshold_rms = self.silence_threshold_rms.clamp(0.0001, 0.5);
        self.silence_close_ms = self.silence_close_ms.clamp(200, 30_000);
        self.max_utterance_secs = self.max_utterance_secs.clamp(5, 600);
        self.queue_capacity = self.queue_capacity.clamp(1, 256);
        self.worker_threads = self.worker_threads.clamp(1, 16);
        if self.collection.trim().is_empty() {
            self.collection = "wx-broadcasts".into();
        } else {
            self.collection = self.collection.trim().to_string();
        }
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            target_sample_rate: 16_000,
            segmenter: SegmenterConfig {
                silence_threshold_rms: self.silence_threshold_rms,
                silence_close_ms: self.silence_close_ms,
                max_utterance_secs: self.max_utterance_secs,
            },
            queue_capacity: self.queue_capacity,
            worker_threads: self.worker_threads,
            collection: self.collection.clone(),
            archive_dir: self.archive_dir.clone(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("transcripts.db"))
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Cirrus")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("cirrus")
    }
}

pub fn default_settings_path() -> PathBuf {
    default_data_dir().join("settings.json")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut settings = AppSettings {
            silence_threshold_rms: 5.0,
            silence_close_ms: 10,
            max_utterance_secs: 100_000,
            queue_capacity: 0,
            worker_threads: 0,
            collection: "   ".into(),
            preferred_input_device: Some("  ".into()),
            ..AppSettings::default()
        };
        settings.normalize();

        assert!((settings.silence_threshold_rms - 0.5).abs() < f32::EPSILON);
        assert_eq!(settings.silence_close_ms, 200);
        assert_eq!(settings.max_utterance_secs, 600);
        assert_eq!(settings.queue_capacity, 1);
        assert_eq!(settings.worker_threads, 1);
        assert_eq!(settings.collection, "wx-broadcasts");
        assert!(settings.preferred_input_device.is_none());
    }

    #[test]
    fn settings_round_trip_via_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        let mut settings = AppSettings::default();
        settings.preferred_input_device = Some("USB Audio CODEC".into());
        settings.silence_close_ms = 1200;
        save_settings(&path, &settings).expect("save settings");

        let loaded = load_settings(&path);
        assert_eq!(
            loaded.preferred_input_device.as_deref(),
            Some("USB Audio CODEC")
        );
        assert_eq!(loaded.silence_close_ms, 1200);
    }

    #[test]
    fn missing_or_corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.json");
        let loaded = load_settings(&missing);
        assert_eq!(loaded.collection, "wx-broadcasts");

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{not json").expect("write corrupt file");
        let loaded = load_settings(&corrupt);
        assert_eq!(loaded.queue_capacity, 10);
    }

    #[test]
    fn engine_config_carries_segmenter_tuning() {
        let mut settings = AppSettings::default();
        settings.silence_threshold_rms = 0.004;
        settings.silence_close_ms = 1200;
        let config = settings.engine_config();
        assert!((config.segmenter.silence_threshold_rms - 0.004).abs() < f32::EPSILON);
        assert_eq!(config.segmenter.silence_close_ms, 1200);
        assert_eq!(config.target_sample_rate, 16_000);
    }
}
