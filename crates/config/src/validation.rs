//! Configuration validation

use crate::{AppConfig, BackendConfig, ConfigError, Result, TaskConfig};

/// Backend client flavours this service can talk to
pub const SUPPORTED_BACKEND_CLIENTS: &[&str] = &["deis"];

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the entire application configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut errors = Vec::new();

    // Validate service config
    if let Err(e) = validate_log_level(&config.service.log_level) {
        errors.push(e);
    }

    if config.service.metrics_enabled && config.service.metrics_port == 0 {
        errors.push(ValidationError::new(
            "service.metrics_port",
            "metrics port must be greater than 0",
        ));
    }

    if let Some(default_backend) = &config.service.default_backend {
        if !config.backends.contains_key(default_backend) {
            errors.push(ValidationError::new(
                "service.default_backend",
                format!("backend '{default_backend}' not found in backends config"),
            ));
        }
    }

    // Validate store config
    if !config.store.database_url.starts_with("sqlite:") {
        errors.push(ValidationError::new(
            "store.database_url",
            "only sqlite: database URLs are supported",
        ));
    }

    if config.store.max_connections == 0 {
        errors.push(ValidationError::new(
            "store.max_connections",
            "must be greater than 0",
        ));
    }

    errors.extend(validate_task_config(&config.tasks));

    // Validate providers
    for (name, provider) in &config.providers {
        if provider.kind.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("providers.{name}.kind"),
                "provider kind is required",
            ));
        }
    }

    // Validate backends
    for (name, backend) in &config.backends {
        if let Err(e) = validate_backend_config(backend) {
            errors.push(ValidationError::new(format!("backends.{name}"), e));
        }
    }

    // Return all errors if any were found
    if !errors.is_empty() {
        let error_msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ConfigError::ValidationError(error_msg));
    }

    Ok(())
}

fn validate_task_config(tasks: &TaskConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if tasks.max_poll_attempts == 0 {
        errors.push(ValidationError::new(
            "tasks.max_poll_attempts",
            "must be greater than 0",
        ));
    }

    if tasks.min_retry_delay_secs > tasks.max_retry_delay_secs {
        errors.push(ValidationError::new(
            "tasks.min_retry_delay_secs",
            "must be <= tasks.max_retry_delay_secs",
        ));
    }

    if tasks.default_retry_delay_secs == 0 {
        errors.push(ValidationError::new(
            "tasks.default_retry_delay_secs",
            "must be greater than 0",
        ));
    }

    if tasks.retry_multiplier < 1.0 {
        errors.push(ValidationError::new(
            "tasks.retry_multiplier",
            "must be >= 1.0",
        ));
    }

    if tasks.worker_concurrency == 0 {
        errors.push(ValidationError::new(
            "tasks.worker_concurrency",
            "must be greater than 0",
        ));
    }

    errors
}

/// Validate a backend configuration
pub fn validate_backend_config(backend: &BackendConfig) -> std::result::Result<(), String> {
    validate_url(&backend.api_url)?;

    if !SUPPORTED_BACKEND_CLIENTS.contains(&backend.client.as_str()) {
        return Err(format!(
            "unsupported client '{}', must be one of: {}",
            backend.client,
            SUPPORTED_BACKEND_CLIENTS.join(", ")
        ));
    }

    if backend.timeout_ms == 0 {
        return Err("timeout_ms must be greater than 0".to_string());
    }

    if matches!(&backend.service_token, Some(token) if token.trim().is_empty()) {
        return Err("service_token cannot be empty".to_string());
    }

    Ok(())
}

/// Validate a URL
pub fn validate_url(url: &str) -> std::result::Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    // Basic URL validation - check for scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err("URL must start with http:// or https://".to_string());
    }

    Ok(())
}

fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new(
            "service.log_level",
            format!(
                "invalid log level '{level}', must be one of: trace, debug, info, warn, error"
            ),
        )),
    }
}
