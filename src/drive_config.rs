// Drive Ops Configuration Module
// Endpoints, timeouts and retry policy, persisted as JSON in the user config dir

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::providers::{DriveError, HttpRetryConfig};

/// Google Drive API base URL
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive media upload base URL
pub const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Metadata/listing/download endpoint
    pub api_base: String,
    /// Media upload endpoint
    pub upload_base: String,
    /// Page size requested from the listing endpoint (None = service default)
    pub page_size: Option<u32>,
    /// TCP/TLS connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Deadline for a whole operation run through a session (None = unbounded)
    pub operation_timeout_secs: Option<u64>,
    /// Retry policy for idempotent reads
    pub retry: HttpRetryConfig,
    /// Where the CLI saves downloads when no destination is given
    pub download_dir: PathBuf,
}

impl Default for DriveConfig {
    fn default() -> Self {
        // ~/Downloads/My Drive
        let download_dir = dirs::download_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("My Drive");

        Self {
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
            page_size: None,
            connect_timeout_secs: 30,
            operation_timeout_secs: None,
            retry: HttpRetryConfig::default(),
            download_dir,
        }
    }
}

impl DriveConfig {
    /// Configuration pointing both endpoints at one base URL (local mocks, proxies)
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: base.to_string(),
            upload_base: format!("{}/upload", base),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    /// Reject configurations that cannot produce working requests
    pub fn validate(&self) -> Result<(), DriveError> {
        parse_base_url("api_base", &self.api_base)?;
        parse_base_url("upload_base", &self.upload_base)?;

        if self.connect_timeout_secs == 0 {
            return Err(DriveError::InvalidConfig(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.operation_timeout_secs == Some(0) {
            return Err(DriveError::InvalidConfig(
                "operation_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        if self.page_size == Some(0) {
            return Err(DriveError::InvalidConfig(
                "page_size must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse an endpoint that path segments can be appended to
pub(crate) fn parse_base_url(field: &str, value: &str) -> Result<Url, DriveError> {
    let url = Url::parse(value)
        .map_err(|e| DriveError::InvalidConfig(format!("{}: {}", field, e)))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(DriveError::InvalidConfig(format!(
            "{}: expected an http(s) base URL, got {}",
            field, value
        )));
    }
    Ok(url)
}

/// Default location of the config file
pub fn config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("drive-ops").join("config.json")
}

/// Load configuration from the default location, falling back to defaults
pub fn load_config() -> DriveConfig {
    let path = config_path();
    if !path.exists() {
        return DriveConfig::default();
    }

    match load_config_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring config file: {}", e);
            DriveConfig::default()
        }
    }
}

/// Load configuration from an explicit file
pub fn load_config_from(path: &Path) -> Result<DriveConfig, DriveError> {
    let content = fs::read_to_string(path).map_err(|e| DriveError::local_io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| DriveError::InvalidConfig(format!("{}: {}", path.display(), e)))
}

/// Save configuration, creating parent directories as needed
pub fn save_config_to(path: &Path, config: &DriveConfig) -> Result<(), DriveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DriveError::local_io(parent, e))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| DriveError::InvalidConfig(format!("Failed to serialize config: {}", e)))?;
    fs::write(path, content).map_err(|e| DriveError::local_io(path, e))?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}
