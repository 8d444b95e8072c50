// SYNOID Scenes - Run Configuration
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Defaults, then an optional JSON file, then environment overrides.
// The CLI layers its own flags on top of whatever this returns.

use crate::error::SceneError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "scene_config.json";
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SCENE_MODEL: &str = "gpt-4o-mini";

/// Output encoding policy for rendered scenes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "medium".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Maximum seconds a single clip may contribute to (and occupy in) a scene.
    pub per_clip_cap_secs: f64,
    /// Extra video coverage the allocator aims for beyond the narration length.
    pub safety_margin_secs: f64,
    /// Visual slack kept after the narration ends when video is longer.
    pub trailing_slack_secs: f64,
    /// Upper bound on candidates sent to the oracle per round.
    pub max_pool_size: usize,
    /// Hard ceiling on oracle rounds for one segment.
    pub max_rounds: usize,
    /// Fixed seed for the zero-signal shuffle. `None` draws from entropy.
    pub shuffle_seed: Option<u64>,

    pub api_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub clips_table: PathBuf,
    pub narration_table: PathBuf,
    pub used_clips_store: PathBuf,
    pub scenes_dir: PathBuf,
    pub output_dir: PathBuf,
    pub skip_existing: bool,

    pub render: RenderSettings,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            per_clip_cap_secs: 5.0,
            safety_margin_secs: 1.0,
            trailing_slack_secs: 1.0,
            max_pool_size: 300,
            max_rounds: 25,
            shuffle_seed: None,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_SCENE_MODEL.to_string(),
            api_key: None,
            clips_table: PathBuf::from("clips_data.csv"),
            narration_table: PathBuf::from("transcripts_data.csv"),
            used_clips_store: PathBuf::from("used_clips.csv"),
            scenes_dir: PathBuf::from("Scenes"),
            output_dir: PathBuf::from("Output"),
            skip_existing: false,
            render: RenderSettings::default(),
        }
    }
}

impl SceneConfig {
    /// Load from `path` (or `scene_config.json` in the working directory),
    /// falling back to defaults when the file is absent or unreadable.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let mut config = match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<SceneConfig>(&content) {
                Ok(config) => {
                    info!("[CONFIG] Loaded scene config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("[CONFIG] Ignoring malformed {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("[CONFIG] Using default scene config");
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    /// Pull the oracle credentials and endpoint from the environment.
    /// Expects `dotenv()` to have run already.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SYNOID_API_URL") {
            if !url.trim().is_empty() {
                self.api_url = url;
            }
        }
        if let Ok(model) = std::env::var("SYNOID_SCENE_MODEL") {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        self.api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.take());
    }

    pub fn validate(&self) -> Result<(), SceneError> {
        if !(self.per_clip_cap_secs > 0.0) {
            return Err(SceneError::Config(format!(
                "per_clip_cap_secs must be positive, got {}",
                self.per_clip_cap_secs
            )));
        }
        if !(self.safety_margin_secs >= 0.0) {
            return Err(SceneError::Config(format!(
                "safety_margin_secs must not be negative, got {}",
                self.safety_margin_secs
            )));
        }
        if !(self.trailing_slack_secs >= 0.0) {
            return Err(SceneError::Config(format!(
                "trailing_slack_secs must not be negative, got {}",
                self.trailing_slack_secs
            )));
        }
        if self.max_pool_size == 0 {
            return Err(SceneError::Config("max_pool_size must be at least 1".into()));
        }
        if self.max_rounds == 0 {
            return Err(SceneError::Config("max_rounds must be at least 1".into()));
        }
        Ok(())
    }

    /// Masked preview of the API key for logs, e.g. `sk-ab...wxyz`.
    pub fn masked_api_key(&self) -> Option<String> {
        self.api_key.as_deref().map(mask_key)
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..5].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SceneConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.per_clip_cap_secs, 5.0);
        assert_eq!(config.safety_margin_secs, 1.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SceneConfig =
            serde_json::from_str(r#"{ "safety_margin_secs": 3.0, "render": { "fps": 24 } }"#).unwrap();
        assert_eq!(config.safety_margin_secs, 3.0);
        assert_eq!(config.per_clip_cap_secs, 5.0);
        assert_eq!(config.render.fps, 24);
        assert_eq!(config.render.video_codec, "libx264");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SceneConfig::default();
        config.per_clip_cap_secs = 0.0;
        assert!(matches!(config.validate(), Err(SceneError::Config(_))));

        let mut config = SceneConfig::default();
        config.max_pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = SceneConfig::default();
        config.safety_margin_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SceneConfig::load(Some(&dir.path().join("nope.json")));
        assert_eq!(config.max_pool_size, 300);
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdefghijklmnop"), "sk-ab...mnop");
        assert_eq!(mask_key("short"), "***");
    }
}
