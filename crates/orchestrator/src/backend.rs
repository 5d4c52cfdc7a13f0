use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tigerhost_addons_config::{BackendConfig, SUPPORTED_BACKEND_CLIENTS};
use tigerhost_addons_types::AddonConfig;
use tracing::{debug, warn};

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Failure talking to an already-resolved backend client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend rejected credentials")]
    Unauthorized,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Failure resolving an authenticated client for a backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("backend {backend} uses unsupported client '{client}'")]
    UnsupportedClient { backend: String, client: String },

    #[error("no credentials for user {username} on backend {backend}")]
    MissingCredentials { username: String, backend: String },

    #[error("failed to build client: {0}")]
    ClientBuild(String),
}

// ═══════════════════════════════════════════════════════════════════════════
// TRAITS
// ═══════════════════════════════════════════════════════════════════════════

/// Authenticated client for a PaaS backend
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Set (add or overwrite) environment variables on an application
    async fn set_application_env_variables(
        &self,
        app_id: &str,
        values: &AddonConfig,
    ) -> Result<(), ClientError>;
}

/// Produces backend clients acting on behalf of a user
#[async_trait]
pub trait BackendClientResolver: Send + Sync {
    async fn authenticated_client(
        &self,
        username: &str,
        backend: &str,
    ) -> Result<Arc<dyn BackendClient>, BackendError>;
}

/// Per-user API tokens for backends
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, username: &str, backend: &str) -> Option<String>;

    /// True only when the source knows it can never return a token
    fn is_empty(&self) -> bool {
        false
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TOKEN SOURCES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InMemoryTokenSource {
    tokens: RwLock<HashMap<(String, String), String>>,
}

impl InMemoryTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, username: &str, backend: &str, token: impl Into<String>) {
        self.tokens
            .write()
            .unwrap()
            .insert((username.to_string(), backend.to_string()), token.into());
    }
}

#[async_trait]
impl TokenSource for InMemoryTokenSource {
    async fn token(&self, username: &str, backend: &str) -> Option<String> {
        self.tokens
            .read()
            .unwrap()
            .get(&(username.to_string(), backend.to_string()))
            .cloned()
    }

    fn is_empty(&self) -> bool {
        self.tokens.read().unwrap().is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DEIS CLIENT
// ═══════════════════════════════════════════════════════════════════════════

/// Client for a Deis controller, authenticated with a user token
pub struct DeisClient {
    api_url: String,
    token: String,
    client: reqwest::Client,
}

impl DeisClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        }
    }
}

#[async_trait]
impl BackendClient for DeisClient {
    async fn set_application_env_variables(
        &self,
        app_id: &str,
        values: &AddonConfig,
    ) -> Result<(), ClientError> {
        let url = format!("{}/v1/apps/{}/config/", self.api_url, app_id);
        debug!(%url, count = values.len(), "Setting application env variables");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .json(&json!({ "values": values }))
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, %body, "Deis rejected config update");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HTTP RESOLVER
// ═══════════════════════════════════════════════════════════════════════════

struct ConfiguredBackend {
    api_url: String,
    client: reqwest::Client,
    service_token: Option<String>,
}

/// Resolves clients for the backends named in configuration.
///
/// A user's own token from the [`TokenSource`] wins; otherwise the backend's
/// configured service token is used.
pub struct HttpBackendResolver {
    backends: HashMap<String, ConfiguredBackend>,
    tokens: Arc<dyn TokenSource>,
    default_backend: Option<String>,
}

impl HttpBackendResolver {
    pub fn from_config(
        backends: &HashMap<String, BackendConfig>,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, BackendError> {
        let mut configured = HashMap::with_capacity(backends.len());
        for (name, backend) in backends {
            if !SUPPORTED_BACKEND_CLIENTS.contains(&backend.client.as_str()) {
                return Err(BackendError::UnsupportedClient {
                    backend: name.clone(),
                    client: backend.client.clone(),
                });
            }

            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(backend.timeout_ms))
                .build()
                .map_err(|e| BackendError::ClientBuild(e.to_string()))?;

            configured.insert(
                name.clone(),
                ConfiguredBackend {
                    api_url: backend.api_url.clone(),
                    client,
                    service_token: backend.service_token.clone(),
                },
            );
        }

        Ok(Self {
            backends: configured,
            tokens,
            default_backend: None,
        })
    }

    /// Backend used for apps that do not name one
    pub fn with_default_backend(mut self, backend: Option<String>) -> Self {
        self.default_backend = backend;
        self
    }

    /// Whether any client could be authenticated at all
    pub fn has_credentials(&self) -> bool {
        !self.tokens.is_empty() || self.backends.values().any(|b| b.service_token.is_some())
    }
}

#[async_trait]
impl BackendClientResolver for HttpBackendResolver {
    async fn authenticated_client(
        &self,
        username: &str,
        backend: &str,
    ) -> Result<Arc<dyn BackendClient>, BackendError> {
        let backend = match (backend, &self.default_backend) {
            ("", Some(default)) => default.as_str(),
            _ => backend,
        };
        let configured = self
            .backends
            .get(backend)
            .ok_or_else(|| BackendError::UnknownBackend(backend.to_string()))?;

        let token = match self.tokens.token(username, backend).await {
            Some(token) => token,
            None => configured.service_token.clone().ok_or_else(|| {
                BackendError::MissingCredentials {
                    username: username.to_string(),
                    backend: backend.to_string(),
                }
            })?,
        };

        Ok(Arc::new(DeisClient::new(
            configured.api_url.clone(),
            token,
            configured.client.clone(),
        )))
    }
}
