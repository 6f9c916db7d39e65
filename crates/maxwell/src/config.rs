use std::time::Duration;

use maxwell_common::error::parse_env;
use maxwell_common::openai::ChatClientConfig;

use crate::error::AppError;
use crate::prompts::DEFAULT_MODEL;

pub const DEFAULT_API_URL: &str = "http://localhost:3001";

/// Client configuration loaded from environment variables. Everything has a default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the relay, e.g. "http://localhost:3001".
    pub api_url: String,
    /// Model id sent in every request body.
    pub model: String,
    /// Per-request timeout. `None` waits for as long as the relay does.
    pub timeout: Option<Duration>,
    pub max_error_body_bytes: usize,
    /// Typeset TeX for the terminal; `false` shows it raw.
    pub render_math: bool,
}

impl Config {
    /// Optional:
    /// - `MAXWELL_API_URL` (default: "http://localhost:3001")
    /// - `MAXWELL_MODEL` (default: "nvidia/nemotron-nano-12b-v2-vl")
    /// - `MAXWELL_TIMEOUT_SECS` (default: unset, no timeout)
    /// - `MAXWELL_MAX_ERROR_BODY_BYTES` (default: 8192)
    /// - `MAXWELL_RENDER_MATH` (default: true)
    pub fn from_env() -> Result<Self, AppError> {
        let api_url = std::env::var("MAXWELL_API_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "MAXWELL_API_URL must be an http(s) URL, got {api_url}"
            )));
        }

        let model = std::env::var("MAXWELL_MODEL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout = parse_env::<u64>("MAXWELL_TIMEOUT_SECS")?
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            api_url,
            model,
            timeout,
            max_error_body_bytes: parse_env("MAXWELL_MAX_ERROR_BODY_BYTES")?.unwrap_or(8 * 1024),
            render_math: parse_env("MAXWELL_RENDER_MATH")?.unwrap_or(true),
        })
    }

    pub fn chat_client_config(&self) -> ChatClientConfig {
        ChatClientConfig {
            timeout: self.timeout,
            max_error_body_bytes: self.max_error_body_bytes,
            ..ChatClientConfig::for_relay(&self.api_url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_points_at_relay_endpoint() {
        let config = Config {
            api_url: "http://relay.local:8080".to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Some(Duration::from_secs(90)),
            max_error_body_bytes: 1024,
            render_math: true,
        };
        let client = config.chat_client_config();
        assert_eq!(client.endpoint, "http://relay.local:8080/api/analyze-circuit");
        assert_eq!(client.timeout, Some(Duration::from_secs(90)));
        assert_eq!(client.max_error_body_bytes, 1024);
    }
}
