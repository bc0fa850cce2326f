//! Server and client configuration.

use std::borrow::Cow;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::{
    CHAT_COMPLETIONS_PATH, DEFAULT_HOST, DEFAULT_MODEL, DEFAULT_PORT, DEFAULT_TOKEN_BUDGET,
    MODELS_PATH, TRANSPORT_ERROR_MESSAGE,
};

/// Location of the inference server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `http` or `https`
    pub scheme: String,
    /// Hostname or IP address; a bare IPv6 address is bracketed when the URL
    /// is built
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the URL scheme.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scheme = std::env::var("JARVIS_SCHEME").unwrap_or(defaults.scheme);
        let host = std::env::var("JARVIS_HOST").unwrap_or(defaults.host);
        let port = std::env::var("JARVIS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        Self { scheme, host, port }
    }

    /// `{scheme}://{host}:{port}` as a validated URL.
    pub fn base_url(&self) -> Result<Url, LlmError> {
        let raw = format!("{}://{}:{}", self.scheme, self.url_host(), self.port);
        let invalid = |reason: String| LlmError::InvalidEndpoint {
            endpoint: raw.clone(),
            reason,
        };

        if self.scheme != "http" && self.scheme != "https" {
            return Err(invalid(format!("unsupported scheme '{}'", self.scheme)));
        }

        let url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;

        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        // A host like "box/api" parses, but shifts the port into the path.
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("host must not contain a path".to_string()));
        }

        Ok(url)
    }

    /// Host as it appears in a URL.
    fn url_host(&self) -> Cow<'_, str> {
        if self.host.contains(':') && !self.host.starts_with('[') {
            Cow::Owned(format!("[{}]", self.host))
        } else {
            Cow::Borrowed(self.host.as_str())
        }
    }

    /// Endpoint for streaming chat completions.
    pub fn chat_completions_url(&self) -> Result<Url, LlmError> {
        let mut url = self.base_url()?;
        url.set_path(CHAT_COMPLETIONS_PATH);
        Ok(url)
    }

    /// Endpoint for listing available models.
    pub fn models_url(&self) -> Result<Url, LlmError> {
        let mut url = self.base_url()?;
        url.set_path(MODELS_PATH);
        Ok(url)
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.url_host(), self.port)
    }
}

/// Shared, mutable server configuration.
///
/// The client reads it once per request, so updates only affect the next
/// `submit`.
#[derive(Debug, Clone, Default)]
pub struct ServerConfigHandle {
    inner: Arc<RwLock<ServerConfig>>,
}

impl ServerConfigHandle {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Snapshot of the current configuration.
    pub fn get(&self) -> ServerConfig {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the configuration.
    pub fn set(&self, config: ServerConfig) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }
}

/// Request and streaming options for the chat client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Model id sent with every request
    pub model: String,
    /// Token budget for the context window
    pub token_budget: usize,
    /// Maximum time to wait for the next chunk (or the response headers).
    /// Zero disables the idle limit.
    pub idle_timeout: Duration,
    /// Overall deadline for a single request, if any
    pub request_timeout: Option<Duration>,
    /// Text delivered as the final delta when a session fails
    pub error_message: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            token_budget: DEFAULT_TOKEN_BUDGET,
            idle_timeout: Duration::from_secs(60),
            request_timeout: None,
            error_message: TRANSPORT_ERROR_MESSAGE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let model = std::env::var("JARVIS_MODEL").unwrap_or(defaults.model);

        let token_budget = std::env::var("JARVIS_TOKEN_BUDGET")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.token_budget);

        let idle_timeout = std::env::var("JARVIS_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_timeout);

        let request_timeout = std::env::var("JARVIS_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs);

        Self {
            model,
            token_budget,
            idle_timeout,
            request_timeout,
            error_message: defaults.error_message,
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for client configuration.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn token_budget(mut self, tokens: usize) -> Self {
        self.config.token_budget = tokens;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.config.error_message = message.into();
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
