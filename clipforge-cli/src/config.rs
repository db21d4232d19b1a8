use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clipforge::ClientConfig;
use clipforge::config::{DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::output::OutputFormat;

/// Configuration read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Default status polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Timeout for thumbnail manifest fetches in seconds
    pub manifest_timeout_secs: u64,
    pub user_agent: String,
    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
    pub output: OutputFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_secs: 30,
            poll_interval_ms: 1500,
            manifest_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: BTreeMap::new(),
            output: OutputFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, the user configuration
    /// directory is checked and defaults are used when nothing is there.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => {
                    debug!("No configuration file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path)
            .map_err(|e| AppError::config(&path, e.to_string()))?;
        let config = toml::from_str(&text).map_err(|e| AppError::config(&path, e.to_string()))?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("clipforge").join("config.toml"))
    }

    /// Build the engine configuration, applying command-line overrides.
    pub fn client_config(
        &self,
        base_url: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> Result<ClientConfig> {
        let mut config = ClientConfig::with_base_url(base_url.unwrap_or(&self.base_url))?
            .with_timeout(Duration::from_secs(timeout_secs.unwrap_or(self.timeout_secs)))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_user_agent(self.user_agent.clone());
        config.manifest_timeout = Duration::from_secs(self.manifest_timeout_secs);
        for (name, value) in &self.headers {
            config = config.with_header(name, value)?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_file_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
base_url = "https://video.example.com"
poll_interval_ms = 500
output = "json-compact"

[headers]
x-api-key = "secret"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.base_url, "https://video.example.com");
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.output, OutputFormat::JsonCompact);

        let client = config.client_config(None, Some(5)).unwrap();
        assert_eq!(client.base_url.as_str(), "https://video.example.com/");
        assert_eq!(client.timeout, Duration::from_secs(5));
        assert_eq!(client.poll_interval, Duration::from_millis(500));
        assert_eq!(client.headers["x-api-key"], "secret");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_secs = \"soon\"").unwrap();
        assert!(matches!(
            AppConfig::load(Some(file.path())),
            Err(AppError::Config { .. })
        ));
    }

    #[test]
    fn overrides_win() {
        let client = AppConfig::default()
            .client_config(Some("http://other:9000"), None)
            .unwrap();
        assert_eq!(client.base_url.as_str(), "http://other:9000/");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn bad_base_url_is_rejected() {
        assert!(AppConfig::default()
            .client_config(Some("ftp://nope"), None)
            .is_err());
    }
}
