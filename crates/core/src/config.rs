//! Transport and pipeline configuration.
//!
//! Configuration is always passed explicitly: the transport is built from a
//! [`TransportConfig`] and the engines from a [`PipelineConfig`]. Values come
//! from defaults, an optional JSON file, and the `AI_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{QuizgenError, Result},
    provider::Provider,
};

pub const DEFAULT_MODEL: &str = "gemma3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub provider: Provider,
    pub endpoint_host: String,
    pub endpoint_port: u16,
    pub use_proxy: bool,
    pub proxy_address: String,
    /// Client-wide ceiling; each request carries its own, usually tighter, bound.
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_retries: u32,
    /// Env var holding the bearer token (OpenAI-compatible provider only).
    pub api_key_env: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            endpoint_host: "localhost".to_string(),
            endpoint_port: 11434,
            use_proxy: false,
            proxy_address: "socks5://localhost:1055".to_string(),
            request_timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
            max_retries: 0,
            api_key_env: None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: String) -> Result<T> {
    raw.trim().parse().map_err(|_| QuizgenError::InvalidConfig {
        reason: format!("{key}={raw:?} is not valid"),
    })
}

fn parse_flag(key: &str, raw: String) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(QuizgenError::InvalidConfig {
            reason: format!("{key}={raw:?} is not a boolean"),
        }),
    }
}

impl TransportConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay `AI_*` settings read through `lookup` onto `self`.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("AI_SERVER_IP") {
            self.endpoint_host = host.trim().to_string();
        }
        if let Some(port) = lookup("AI_SERVER_PORT") {
            self.endpoint_port = parse_env("AI_SERVER_PORT", port)?;
        }
        if let Some(flag) = lookup("AI_USE_PROXY") {
            self.use_proxy = parse_flag("AI_USE_PROXY", flag)?;
        }
        if let Some(proxy) = lookup("AI_PROXY_ADDRESS") {
            self.proxy_address = proxy.trim().to_string();
        }
        if let Some(timeout) = lookup("AI_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_env("AI_REQUEST_TIMEOUT_MS", timeout)?;
        }
        if let Some(retries) = lookup("AI_MAX_RETRIES") {
            self.max_retries = parse_env("AI_MAX_RETRIES", retries)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(QuizgenError::InvalidConfig { reason });

        if self.endpoint_host.trim().is_empty() {
            return invalid("endpoint_host is empty".into());
        }
        if self.endpoint_port == 0 {
            return invalid("endpoint_port must be > 0".into());
        }
        if self.request_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return invalid("timeouts must be > 0".into());
        }
        if self.use_proxy && reqwest::Url::parse(&self.proxy_address).is_err() {
            return invalid(format!("proxy_address {:?} is not a URL", self.proxy_address));
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.endpoint_host, self.endpoint_port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub default_model: String,
    pub desired_segments: usize,
    pub segmentation_temperature: f64,
    pub segmentation_top_p: f64,
    pub generation_temperature: f64,
    /// Topic polls ask for more varied wording than transcript questions.
    pub poll_temperature: f64,
    /// Per-request bound handed to the transport.
    pub request_timeout_ms: u64,
    /// 1 keeps generation strictly sequential.
    pub max_concurrent_requests: usize,
    /// Transcripts at or below this many lines fall back to a single segment.
    pub min_fallback_lines: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            desired_segments: 3,
            segmentation_temperature: 0.1,
            segmentation_top_p: 0.9,
            generation_temperature: 0.2,
            poll_temperature: 0.7,
            request_timeout_ms: 60_000,
            max_concurrent_requests: 1,
            min_fallback_lines: 8,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            return Err(QuizgenError::InvalidConfig {
                reason: "max_concurrent_requests must be > 0".into(),
            });
        }
        if self.min_fallback_lines == 0 {
            return Err(QuizgenError::InvalidConfig {
                reason: "min_fallback_lines must be > 0".into(),
            });
        }
        Ok(())
    }
}

/// On-disk form of the whole configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizgenConfig {
    pub transport: TransportConfig,
    pub pipeline: PipelineConfig,
}

impl QuizgenConfig {
    /// Load configuration from file, or defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("quizgen")
            .join("config.json")
    }
}
