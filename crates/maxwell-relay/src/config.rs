use std::net::{Ipv4Addr, SocketAddr};

use maxwell_common::error::{parse_env, require_env};

use crate::error::AppError;

/// 50 MiB: base64-encoded photos of a circuit diagram are routinely several MB.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_PORT: u16 = 3001;

/// Relay configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream chat-completions URL the request body is forwarded to.
    pub upstream_url: String,
    /// Bearer credential attached to every upstream call. Never sent to clients.
    pub api_key: String,
    /// Allowed CORS origin. `None` allows any origin.
    pub cors_origin: Option<String>,
    pub port: u16,
    pub body_limit_bytes: usize,
}

impl Config {
    /// Required:
    /// - `NVIDIA_API_URL`
    /// - `NVIDIA_API_KEY`
    ///
    /// Optional:
    /// - `CORS_ORIGIN` (default: `*`)
    /// - `PORT` (default: 3001)
    /// - `RELAY_BODY_LIMIT_BYTES` (default: 50 MiB)
    pub fn from_env() -> Result<Self, AppError> {
        let upstream_url = require_env("NVIDIA_API_URL")?;
        let api_key = require_env("NVIDIA_API_KEY")?;

        if !upstream_url.starts_with("http://") && !upstream_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "NVIDIA_API_URL must be an http(s) URL, got {upstream_url}"
            )));
        }

        let cors_origin = std::env::var("CORS_ORIGIN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "*");

        Ok(Self {
            upstream_url,
            api_key,
            cors_origin,
            port: parse_env("PORT")?.unwrap_or(DEFAULT_PORT),
            body_limit_bytes: parse_env("RELAY_BODY_LIMIT_BYTES")?
                .unwrap_or(DEFAULT_BODY_LIMIT_BYTES),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}
