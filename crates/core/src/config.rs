//! Preview configuration
//!
//! Settings for collaborators and recognition. Render thresholds are fixed
//! policy and live in `viewer_core`; only environment-dependent values are
//! configurable here.

use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3001";
pub const DEFAULT_CORS_PROXY: &str = "https://api.allorigins.win/raw?url=";
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";

/// Configuration for one preview controller.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewConfig {
    /// Base URL of the upload/conversion server
    pub server_url: String,
    /// Prefix a URL-encoded target is appended to when a direct fetch fails
    pub cors_proxy: String,
    /// Recognition language passed to the OCR engine
    pub ocr_language: String,
    /// How long extraction waits for the first page raster before giving up
    pub ocr_start_timeout: Duration,
    /// Timeout for collaborator requests
    pub request_timeout: Duration,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            cors_proxy: DEFAULT_CORS_PROXY.to_owned(),
            ocr_language: DEFAULT_OCR_LANGUAGE.to_owned(),
            ocr_start_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl PreviewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_cors_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.cors_proxy = proxy.into();
        self
    }

    pub fn with_ocr_language(mut self, language: impl Into<String>) -> Self {
        self.ocr_language = language.into();
        self
    }

    pub fn with_ocr_start_timeout(mut self, timeout: Duration) -> Self {
        self.ocr_start_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DOCPEEK_SERVER_URL`: conversion server base URL
    /// - `DOCPEEK_CORS_PROXY`: proxy prefix for URL fetches
    /// - `DOCPEEK_OCR_LANG`: recognition language (default: eng)
    /// - `DOCPEEK_OCR_START_TIMEOUT_MS`: first-page wait in milliseconds
    /// - `DOCPEEK_REQUEST_TIMEOUT_SECS`: collaborator request timeout
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DOCPEEK_SERVER_URL") {
            if !val.starts_with("http://") && !val.starts_with("https://") {
                return Err(ConfigError::InvalidValue("DOCPEEK_SERVER_URL".to_owned()));
            }
            config = config.with_server_url(val);
        }

        if let Ok(val) = std::env::var("DOCPEEK_CORS_PROXY") {
            config.cors_proxy = val;
        }

        if let Ok(val) = std::env::var("DOCPEEK_OCR_LANG") {
            if val.trim().is_empty() {
                return Err(ConfigError::InvalidValue("DOCPEEK_OCR_LANG".to_owned()));
            }
            config.ocr_language = val.trim().to_owned();
        }

        if let Ok(val) = std::env::var("DOCPEEK_OCR_START_TIMEOUT_MS") {
            let millis = val
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("DOCPEEK_OCR_START_TIMEOUT_MS".to_owned()))?;
            config.ocr_start_timeout = Duration::from_millis(millis);
        }

        if let Ok(val) = std::env::var("DOCPEEK_REQUEST_TIMEOUT_SECS") {
            let secs = val
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("DOCPEEK_REQUEST_TIMEOUT_SECS".to_owned()))?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),
}
