use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const REDACTED: &str = "********";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,

    // Sampling per tier
    pub executor_temperature: f32,
    pub executor_max_tokens: u32,
    pub planner_temperature: f32,
    pub planner_max_tokens: u32,
    pub supervisor_temperature: f32,
    pub supervisor_max_tokens: u32,
    pub loop_temperature_factor: f32,

    // Capture
    pub image_width: u32,
    pub image_height: u32,
    pub dump_dir: PathBuf,
    pub frame_prefix: String,

    // Control loop
    pub max_steps: u32,
    pub supervisor_interval: u32,
    pub max_history_items: usize,
    pub loop_detection_threshold: usize,
    pub completion_min_chars: usize,
    pub enable_loop_prevention: bool,
    pub enable_full_archive: bool,
    pub require_verification_phase: bool,

    pub timing: Timing,
}

/// Delays inserted around synthetic input, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub cursor_settle_ms: u64,
    pub ui_render_ms: u64,
    pub input_char_ms: u64,
    pub click_double_ms: u64,
    pub drag_step_ms: u64,
    pub drag_prepare_ms: u64,
    pub turn_delay_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            cursor_settle_ms: 120,
            ui_render_ms: 2500,
            input_char_ms: 5,
            click_double_ms: 50,
            drag_step_ms: 10,
            drag_prepare_ms: 100,
            turn_delay_ms: 3500,
        }
    }
}

impl Timing {
    /// No delays at all. Used by tests and dry runs.
    pub fn instant() -> Self {
        Self {
            cursor_settle_ms: 0,
            ui_render_ms: 0,
            input_char_ms: 0,
            click_double_ms: 0,
            drag_step_ms: 0,
            drag_prepare_ms: 0,
            turn_delay_ms: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:1234/v1/chat/completions".to_string(),
            model: "qwen3-vl-2b-instruct".to_string(),
            api_key: None,
            request_timeout_secs: 240,
            executor_temperature: 0.5,
            executor_max_tokens: 1024,
            planner_temperature: 0.3,
            planner_max_tokens: 1200,
            supervisor_temperature: 0.4,
            supervisor_max_tokens: 800,
            loop_temperature_factor: 1.5,
            image_width: 512,
            image_height: 256,
            dump_dir: PathBuf::from("dumps"),
            frame_prefix: "screen_".to_string(),
            max_steps: 600,
            supervisor_interval: 5,
            max_history_items: 10,
            loop_detection_threshold: 3,
            completion_min_chars: 100,
            enable_loop_prevention: true,
            enable_full_archive: true,
            require_verification_phase: false,
            timing: Timing::default(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("DESKPILOT_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("DESKPILOT_MODEL") {
            self.model = model;
        }
        if let Ok(key) = std::env::var("DESKPILOT_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(steps) = std::env::var("DESKPILOT_MAX_STEPS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.max_steps = steps;
        }
        if let Ok(dir) = std::env::var("DESKPILOT_DUMP_DIR") {
            self.dump_dir = PathBuf::from(dir);
        }
    }

    /// Copy safe to print: the API key, if any, is masked.
    pub fn redacted(&self) -> Self {
        Self {
            api_key: self.api_key.as_ref().map(|_| REDACTED.to_string()),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_width == 0 || self.image_height == 0 {
            bail!("image dimensions must be non-zero");
        }
        if self.max_steps == 0 {
            bail!("max_steps must be at least 1");
        }
        if self.supervisor_interval == 0 {
            bail!("supervisor_interval must be at least 1");
        }
        if self.max_history_items == 0 {
            bail!("max_history_items must be at least 1");
        }
        if self.loop_detection_threshold == 0 {
            bail!("loop_detection_threshold must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_steps, 600);
        assert_eq!(config.supervisor_interval, 5);
        assert_eq!(config.timing.ui_render_ms, 2500);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            max_steps = 12
            [timing]
            turn_delay_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.max_steps, 12);
        assert_eq!(config.timing.turn_delay_ms, 0);
        assert_eq!(config.timing.cursor_settle_ms, 120);
        assert_eq!(config.image_width, 512);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = Config {
            supervisor_interval: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redacted_masks_api_key() {
        let config = Config {
            api_key: Some("sk-live-secret".to_string()),
            ..Config::default()
        };
        let printed = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!printed.contains("sk-live-secret"));
        assert!(printed.contains("api_key = \"********\""));
        assert_eq!(config.api_key.as_deref(), Some("sk-live-secret"));

        assert!(Config::default().redacted().api_key.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("deskpilot.toml");
        std::fs::write(&path, "model = \"local-vl\"\nimage_width = 640\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.image_width, 640);
        assert_eq!(config.image_height, 256);
    }
}
