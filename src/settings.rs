//! Shared settings for the mask-propagator binaries.
//! Persisted in the platform-specific config directory via `directories::ProjectDirs`,
//! then overridden by environment variables (a `.env` file is honoured by the binaries).

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::batch::DEFAULT_MASK_SUFFIX;
use crate::model::{
    SegmenterConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS, DEFAULT_TIMEOUT_SECS,
};

/// Application settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Segmentation service base URL
    pub base_url: String,
    /// Segmentation service API key
    pub api_key: String,
    /// SAM backbone ("vit_b", "vit_l", "vit_h")
    pub model_type: String,
    /// Maximum retries for service requests
    pub max_retries: u32,
    /// Retry delay in seconds
    pub retry_delay: u64,
    /// Request timeout in seconds
    pub timeout: u64,
    /// Request several candidate masks and keep the best one
    pub multimask_output: bool,
    /// Suffix appended to mask file stems
    pub mask_suffix: String,
    /// Preview overlay written during calibration; relative paths resolve
    /// inside the output directory (empty = disabled)
    pub preview_path: String,
    /// Write batch_report.json into the output directory
    pub write_report: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: "EMPTY".to_string(),
            model_type: "vit_b".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            timeout: DEFAULT_TIMEOUT_SECS,
            multimask_output: false,
            mask_suffix: DEFAULT_MASK_SUFFIX.to_string(),
            preview_path: "calibration_preview.png".to_string(),
            write_report: true,
        }
    }
}

impl AppSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "moderras", "mask-propagator")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults.
    pub fn load() -> Self {
        let defaults = Self::default();

        let mut loaded: Self = Self::settings_path()
            .and_then(|path| fs::read_to_string(&path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();

        // Backfill fields an older or hand-edited file left blank
        if loaded.base_url.is_empty() {
            loaded.base_url = defaults.base_url;
        }
        if loaded.model_type.is_empty() {
            loaded.model_type = defaults.model_type;
        }
        if loaded.timeout == 0 {
            loaded.timeout = defaults.timeout;
        }

        loaded
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<(), String> {
        let dir = Self::config_dir().ok_or("Cannot determine config directory")?;

        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        let path = dir.join("settings.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(&path, content)
            .map_err(|e| format!("Failed to write settings file: {}", e))?;

        Ok(())
    }

    /// Apply environment variable overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup; unparsable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("SEGMENTER_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("SEGMENTER_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = lookup("SAM_MODEL_TYPE") {
            self.model_type = v;
        }
        if let Some(v) = lookup("SEGMENTER_MAX_RETRIES").and_then(|s| s.parse().ok()) {
            self.max_retries = v;
        }
        if let Some(v) = lookup("SEGMENTER_RETRY_DELAY").and_then(|s| s.parse().ok()) {
            self.retry_delay = v;
        }
        if let Some(v) = lookup("SEGMENTER_TIMEOUT").and_then(|s| s.parse().ok()) {
            self.timeout = v;
        }
        if let Some(v) = lookup("MULTIMASK_OUTPUT") {
            self.multimask_output = parse_flag(&v);
        }
        if let Some(v) = lookup("MASK_SUFFIX") {
            self.mask_suffix = v;
        }
        if let Some(v) = lookup("PREVIEW_PATH") {
            self.preview_path = v;
        }
        if let Some(v) = lookup("WRITE_REPORT") {
            self.write_report = parse_flag(&v);
        }
        self
    }

    /// Segmentation client configuration.
    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig::default()
            .with_base_url(&self.base_url)
            .with_api_key(&self.api_key)
            .with_model_type(&self.model_type)
            .with_max_retries(self.max_retries)
            .with_retry_delay(self.retry_delay)
            .with_timeout(self.timeout)
    }

    /// Preview overlay path for a run writing into `output_dir`, if enabled.
    pub fn preview_path(&self, output_dir: &Path) -> Option<PathBuf> {
        let configured = self.preview_path.trim();
        if configured.is_empty() {
            return None;
        }
        let path = Path::new(configured);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            Some(output_dir.join(path))
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.to_lowercase() == "true"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.model_type, "vit_b");
        assert_eq!(settings.mask_suffix, "_mask");
        assert!(!settings.multimask_output);
        assert!(settings.write_report);
    }

    #[test]
    fn test_env_overrides() {
        let settings = AppSettings::default().with_overrides(lookup(&[
            ("SEGMENTER_BASE_URL", "http://gpu-box:9000/"),
            ("SAM_MODEL_TYPE", "vit_h"),
            ("SEGMENTER_MAX_RETRIES", "7"),
            ("SEGMENTER_TIMEOUT", "not-a-number"),
            ("MULTIMASK_OUTPUT", "TRUE"),
            ("WRITE_REPORT", "0"),
            ("PREVIEW_PATH", ""),
        ]));

        assert_eq!(settings.base_url, "http://gpu-box:9000/");
        assert_eq!(settings.model_type, "vit_h");
        assert_eq!(settings.max_retries, 7);
        assert_eq!(settings.timeout, DEFAULT_TIMEOUT_SECS);
        assert!(settings.multimask_output);
        assert!(!settings.write_report);
        assert_eq!(settings.preview_path(Path::new("out")), None);

        let config = settings.segmenter_config();
        assert_eq!(config.base_url, "http://gpu-box:9000");
        assert_eq!(config.model_type, "vit_h");
        assert_eq!(config.max_retries, 7);
    }

    #[test]
    fn test_preview_path_resolves_in_output_dir() {
        let settings = AppSettings::default();
        assert_eq!(
            settings.preview_path(Path::new("masks")),
            Some(PathBuf::from("masks/calibration_preview.png"))
        );

        let absolute = std::env::temp_dir().join("preview.png");
        let settings = AppSettings {
            preview_path: absolute.display().to_string(),
            ..Default::default()
        };
        assert_eq!(settings.preview_path(Path::new("masks")), Some(absolute));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"base_url": "http://sam:1234"}"#).unwrap();
        assert_eq!(settings.base_url, "http://sam:1234");
        assert_eq!(settings.mask_suffix, DEFAULT_MASK_SUFFIX);
        assert_eq!(settings.max_retries, DEFAULT_MAX_RETRIES);
    }
}
