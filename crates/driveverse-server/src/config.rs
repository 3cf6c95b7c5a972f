use std::net::SocketAddr;
use std::path::PathBuf;

use driveverse_api::ApiConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DRIVEVERSE_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub api: ApiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("DRIVEVERSE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }

        let host = lookup("DRIVEVERSE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = lookup("DRIVEVERSE_PORT").unwrap_or_else(|| "5000".into());
        let addr_text = format!("{}:{}", host, port);
        let addr: SocketAddr = addr_text.parse().map_err(|_| ConfigError::Invalid {
            name: "DRIVEVERSE_HOST/DRIVEVERSE_PORT",
            value: addr_text.clone(),
        })?;

        let max_image_bytes = match lookup("DRIVEVERSE_MAX_IMAGE_BYTES") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                name: "DRIVEVERSE_MAX_IMAGE_BYTES",
                value: v,
            })?,
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        Ok(Self {
            addr,
            db_path: lookup("DRIVEVERSE_DB_PATH")
                .unwrap_or_else(|| "driveverse.db".into())
                .into(),
            api: ApiConfig {
                jwt_secret,
                upload_dir: lookup("DRIVEVERSE_UPLOAD_DIR")
                    .unwrap_or_else(|| "./uploads".into())
                    .into(),
                max_image_bytes,
            },
        })
    }
}
