//! Core configuration structures for the TigerHost addon service

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Service-level settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Durable addon store
    #[serde(default)]
    pub store: StoreConfig,

    /// Lifecycle task scheduling
    #[serde(default)]
    pub tasks: TaskConfig,

    /// Addon providers by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// PaaS backends by backend name
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
}

/// Service environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Environment type (production, staging, local)
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable metrics collection
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Metrics server port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Backend used for apps that do not name one
    #[serde(default)]
    pub default_backend: Option<String>,
}

/// Environment types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Local,
}

/// Addon store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database URL, e.g. `sqlite://addons.db` or `sqlite::memory:`
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Lifecycle task configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Maximum number of `check_provision` polls before giving up
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Delay used when a provider reports not-ready without a hint
    #[serde(default = "default_retry_delay_secs")]
    pub default_retry_delay_secs: u64,

    /// Lower bound applied to provider retry hints
    #[serde(default = "default_min_retry_delay_secs")]
    pub min_retry_delay_secs: u64,

    /// Upper bound applied to provider retry hints
    #[serde(default = "default_max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,

    /// Growth factor for hint-less retries
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,

    /// Maximum tasks running at once in the task runner
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registered provider kind implementing this provider (e.g. "secret")
    pub kind: String,

    /// Kind-specific options
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: HashMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// PaaS backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Controller API base URL
    pub api_url: String,

    /// Client flavour used to talk to the backend
    #[serde(default = "default_backend_client")]
    pub client: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Service account token used for users without a token of their own
    #[serde(default)]
    pub service_token: Option<String>,
}

// Default value functions
fn default_environment() -> Environment {
    Environment::Local
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_database_url() -> String {
    "sqlite://addons.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_max_poll_attempts() -> u32 {
    120
}

fn default_retry_delay_secs() -> u64 {
    30
}

fn default_min_retry_delay_secs() -> u64 {
    1
}

fn default_max_retry_delay_secs() -> u64 {
    600 // 10 minutes
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_worker_concurrency() -> usize {
    8
}

fn default_backend_client() -> String {
    "deis".to_string()
}

fn default_timeout_ms() -> u64 {
    30000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            metrics_port: default_metrics_port(),
            default_backend: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: default_max_poll_attempts(),
            default_retry_delay_secs: default_retry_delay_secs(),
            min_retry_delay_secs: default_min_retry_delay_secs(),
            max_retry_delay_secs: default_max_retry_delay_secs(),
            retry_multiplier: default_retry_multiplier(),
            worker_concurrency: default_worker_concurrency(),
        }
    }
}

impl BackendConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            client: default_backend_client(),
            timeout_ms: default_timeout_ms(),
            service_token: None,
        }
    }

    pub fn with_service_token(mut self, token: impl Into<String>) -> Self {
        self.service_token = Some(token.into());
        self
    }
}
