//! Service configuration, read from environment variables (optionally via a
//! `.env` file).

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::ingress::ImageStore;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8000/";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadMode {
    Disk,
    Inline,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_key: String,
    pub base_url: Url,
    pub model: String,
    pub request_timeout: Option<Duration>,
    pub upload_mode: UploadMode,
    pub upload_dir: PathBuf,
    pub public_base_url: Url,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("could not load .env: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let base_url = parse_url(
            "OPENAI_BASE_URL",
            &get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        )?;

        let request_timeout = get("ANALYZER_TIMEOUT_SECS")
            .map(|raw| {
                raw.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ConfigError::Invalid {
                        var: "ANALYZER_TIMEOUT_SECS",
                        reason: e.to_string(),
                    })
            })
            .transpose()?;

        let upload_mode = match get("UPLOAD_MODE").as_deref().map(str::to_ascii_lowercase) {
            None => UploadMode::Disk,
            Some(mode) if mode == "disk" => UploadMode::Disk,
            Some(mode) if mode == "inline" => UploadMode::Inline,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "UPLOAD_MODE",
                    reason: format!("expected `disk` or `inline`, got `{other}`"),
                })
            }
        };

        let mut public_base_url = parse_url(
            "PUBLIC_BASE_URL",
            &get("PUBLIC_BASE_URL").unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string()),
        )?;
        // Joining against a base without a trailing slash drops its last segment.
        if !public_base_url.path().ends_with('/') {
            let path = format!("{}/", public_base_url.path());
            public_base_url.set_path(&path);
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            api_key,
            base_url,
            model: get("ANALYZER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            request_timeout,
            upload_mode,
            upload_dir: PathBuf::from(
                get("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            ),
            public_base_url,
        })
    }

    pub fn image_store(&self) -> ImageStore {
        match self.upload_mode {
            UploadMode::Disk => ImageStore::Disk {
                dir: self.upload_dir.clone(),
                public_base: self.public_base_url.clone(),
            },
            UploadMode::Inline => ImageStore::Inline,
        }
    }
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}
