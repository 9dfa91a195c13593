//! Layered configuration.
//!
//! Settings come from, in increasing priority:
//!
//! 1. built-in defaults
//! 2. a TOML file (`vitalsync.toml` unless `--config` names another)
//! 3. environment variables prefixed `VITALSYNC_`, with `__` between
//!    section and key (`VITALSYNC_STORE__URL`, `VITALSYNC_RECORDER__INTERVAL`)
//!
//! `OPENAI_API_KEY` is used when `summary.api_key` is not set.
//!
//! ```toml
//! [store]
//! url = "https://my-project-default-rtdb.firebaseio.com"
//! api_key = "web-api-key"
//!
//! [recorder]
//! interval = "5s"
//!
//! [server]
//! listen = "0.0.0.0:8080"
//! template = "templates/prescription.pdf"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::data::duration::parse_duration;
use crate::source::SensorPaths;

/// Default configuration file, optional.
pub const DEFAULT_CONFIG_FILE: &str = "vitalsync.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub paths: SensorPaths,
    pub recorder: RecorderSettings,
    pub history: HistorySettings,
    pub summary: SummarySettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Database root URL. Required for every command that touches the store.
    pub url: Option<String>,
    /// Web API key for anonymous sign-in.
    pub api_key: Option<String>,
    pub auth_url: Option<String>,
    /// Token refresh service base URL.
    pub token_url: Option<String>,
    pub timeout: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            auth_url: None,
            token_url: None,
            timeout: "10s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    pub interval: String,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            interval: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub limit: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            limit: crate::data::history::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 350,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen: String,
    /// Prescription form template.
    pub template: Option<PathBuf>,
    /// Value of `Access-Control-Allow-Origin`.
    pub allow_origin: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            template: Some(PathBuf::from("templates/prescription.pdf")),
            allow_origin: "*".to_string(),
        }
    }
}

impl Settings {
    /// Load settings. An explicit `path` must exist; without one the
    /// default file is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("VITALSYNC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        let mut settings: Settings = config
            .try_deserialize()
            .context("Invalid configuration")?;

        if settings.summary.api_key.is_none() {
            settings.summary.api_key = std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty());
        }

        Ok(settings)
    }

    /// The store URL, or an error saying how to set it.
    pub fn store_url(&self) -> Result<&str> {
        match self.store.url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => bail!("store.url is not set (config file or VITALSYNC_STORE__URL)"),
        }
    }

    pub fn store_timeout(&self) -> Result<Duration> {
        parse_duration(&self.store.timeout).context("Invalid store.timeout")
    }

    /// Time between recorder samples. Must be positive.
    pub fn recorder_interval(&self) -> Result<Duration> {
        let interval =
            parse_duration(&self.recorder.interval).context("Invalid recorder.interval")?;
        if interval.is_zero() {
            bail!("recorder.interval must be greater than zero");
        }
        Ok(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.store_url().is_err());
        assert_eq!(settings.recorder_interval().unwrap(), Duration::from_secs(5));
        assert_eq!(settings.store_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(settings.history.limit, 20);
        assert_eq!(settings.paths, SensorPaths::default());
        assert_eq!(settings.summary.model, "gpt-4o-mini");
        assert_eq!(settings.server.listen, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            [store]
            url = "https://vitals.example.com"

            [paths]
            heart = "ward3/heart"

            [recorder]
            interval = "750ms"

            [summary]
            api_key = "sk-from-file"
            "#,
        );

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.store_url().unwrap(), "https://vitals.example.com");
        assert_eq!(settings.paths.heart, "ward3/heart");
        assert_eq!(settings.paths.environment, "sensors/dht11");
        assert_eq!(settings.recorder_interval().unwrap(), Duration::from_millis(750));
        assert_eq!(settings.summary.api_key.as_deref(), Some("sk-from-file"));
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("[server]\nallow_origin = \"https://file.example\"\n");
        std::env::set_var("VITALSYNC_SERVER__ALLOW_ORIGIN", "https://env.example");

        let settings = Settings::load(Some(file.path())).unwrap();
        std::env::remove_var("VITALSYNC_SERVER__ALLOW_ORIGIN");

        assert_eq!(settings.server.allow_origin, "https://env.example");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut settings = Settings::default();
        settings.recorder.interval = "0s".to_string();
        assert!(settings.recorder_interval().is_err());

        settings.recorder.interval = "soon".to_string();
        assert!(settings.recorder_interval().is_err());
    }
}
