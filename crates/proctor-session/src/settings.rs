//! Layered settings: defaults, optional file, environment

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use face_detector::DetectorConfig;
use lockdown::LockdownConfig;
use media_capture::CaptureConfig;
use proctoring::{Heuristics, ViolationPolicy};
use serde::{Deserialize, Serialize};

/// Environment variable prefix (`PROCTOR__DETECTOR__POLL_INTERVAL_MS=500`)
pub const ENV_PREFIX: &str = "PROCTOR";

/// Default settings file stem (`proctor.toml`, `proctor.yaml`, `proctor.json`)
pub const DEFAULT_FILE: &str = "proctor";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Everything a proctored session needs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub capture: CaptureConfig,
    pub detector: DetectorConfig,
    pub heuristics: Heuristics,
    pub policy: ViolationPolicy,
    pub lockdown: LockdownConfig,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load from `proctor.*` in the working directory and `PROCTOR__*` variables
    pub fn load() -> Result<Self> {
        Self::load_from(Some(DEFAULT_FILE))
    }

    /// Load from an optional file stem or path, then the environment
    pub fn load_from(file: Option<&str>) -> Result<Self> {
        Self::load_with(file, environment())
    }

    fn load_with(file: Option<&str>, env: Environment) -> Result<Self> {
        let defaults =
            Config::try_from(&Settings::default()).context("Failed to encode default settings")?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        let settings: Settings = builder
            .add_source(env)
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if d.poll_interval_ms == 0 {
            anyhow::bail!("detector.poll_interval_ms must be positive");
        }
        if !(0.0..=1.0).contains(&d.min_confidence) {
            anyhow::bail!("detector.min_confidence must be within 0..=1");
        }
        if self.policy.max_violations == Some(0) {
            anyhow::bail!("policy.max_violations must be at least 1");
        }
        let h = &self.heuristics;
        if h.min_face_area_ratio >= h.max_face_area_ratio {
            anyhow::bail!("heuristics.min_face_area_ratio must be below max_face_area_ratio");
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::load_with(None, env(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.detector.poll_interval_ms, 300);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::load_with(
            None,
            env(&[
                ("PROCTOR__DETECTOR__POLL_INTERVAL_MS", "500"),
                ("PROCTOR__POLICY__COOLDOWN_MS", "0"),
                ("PROCTOR__LOGGING__FORMAT", "json"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.detector.poll_interval_ms, 500);
        assert_eq!(settings.policy.cooldown_ms, 0);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.heuristics, Heuristics::default());
    }

    #[test]
    fn test_file_then_environment() {
        let path = std::env::temp_dir().join(format!("proctor-settings-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[detector]\nmin_confidence = 0.9\npoll_interval_ms = 250\n\n[lockdown]\nclipboard = false\n",
        )
        .unwrap();

        let settings = Settings::load_with(
            path.to_str(),
            env(&[("PROCTOR__DETECTOR__POLL_INTERVAL_MS", "400")]),
        )
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!((settings.detector.min_confidence - 0.9).abs() < 1e-6);
        assert_eq!(settings.detector.poll_interval_ms, 400);
        assert!(!settings.lockdown.clipboard);
        assert!(settings.lockdown.keyboard);
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let settings = Settings::load_with(Some("does-not-exist-proctor"), env(&[])).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = Settings::load_with(None, env(&[("PROCTOR__DETECTOR__POLL_INTERVAL_MS", "0")]));
        assert!(result.is_err());

        let result = Settings::load_with(None, env(&[("PROCTOR__POLICY__MAX_VIOLATIONS", "0")]));
        assert!(result.is_err());
        let settings =
            Settings::load_with(None, env(&[("PROCTOR__POLICY__MAX_VIOLATIONS", "3")])).unwrap();
        assert_eq!(settings.policy.max_violations, Some(3));
    }
}
