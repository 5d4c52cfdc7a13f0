//! Configuration loading from multiple sources

use crate::{AppConfig, ConfigError, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::path::Path;

/// Default prefix for environment overrides
pub const ENV_PREFIX: &str = "TIGERHOST_ADDONS";

/// Configuration loader with support for multiple formats and sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    ///
    /// Supports TOML, YAML, and JSON formats based on file extension
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        tracing::debug!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path)?;

        match extension {
            "toml" => Self::from_toml(&content),
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Err(ConfigError::LoadError(format!(
                "Unsupported file extension: {}",
                extension
            ))),
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<AppConfig> {
        toml::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(content: &str) -> Result<AppConfig> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from JSON string
    pub fn from_json(content: &str) -> Result<AppConfig> {
        serde_json::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from environment variables
    ///
    /// Uses default prefix "TIGERHOST_ADDONS"
    pub fn from_env() -> Result<AppConfig> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Load configuration from environment variables with custom prefix
    ///
    /// Nested keys are separated by a double underscore, for example:
    /// TIGERHOST_ADDONS_TASKS__MAX_POLL_ATTEMPTS=60
    pub fn from_env_with_prefix(prefix: &str) -> Result<AppConfig> {
        Self::builder().add_env(prefix).build()
    }

    /// Merge two configurations, with overlay taking precedence
    ///
    /// Provider and backend maps are combined; scalar sections come from the overlay
    pub fn merge(base: AppConfig, overlay: AppConfig) -> AppConfig {
        AppConfig {
            service: overlay.service,
            store: overlay.store,
            tasks: overlay.tasks,
            providers: {
                let mut providers = base.providers;
                providers.extend(overlay.providers);
                providers
            },
            backends: {
                let mut backends = base.backends;
                backends.extend(overlay.backends);
                backends
            },
        }
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Only the keys actually present in the environment override the file.
    pub fn from_file_with_env(path: &Path, env_prefix: &str) -> Result<AppConfig> {
        if !path.exists() {
            return Err(ConfigError::LoadError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::builder()
            .add_file(path, true)
            .add_env(env_prefix)
            .build()
    }

    /// Build configuration using the config crate's builder pattern
    ///
    /// This allows for more complex configuration scenarios with multiple sources
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder {
            builder: Config::builder(),
        }
    }
}

/// Builder for complex configuration loading scenarios
pub struct ConfigLoaderBuilder {
    builder: ConfigBuilder<config::builder::DefaultState>,
}

impl ConfigLoaderBuilder {
    /// Add a configuration file source
    pub fn add_file(mut self, path: &Path, required: bool) -> Self {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml, // Default to TOML
        };

        self.builder = self
            .builder
            .add_source(File::from(path).format(format).required(required));
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env(mut self, prefix: &str) -> Self {
        self.builder = self.builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        self
    }

    /// Set a default value for a key
    pub fn set_default(mut self, key: &str, value: &str) -> Result<Self> {
        self.builder = self.builder.set_default(key, value)?;
        Ok(self)
    }

    /// Build the final configuration
    pub fn build(self) -> Result<AppConfig> {
        let config = self.builder.build()?;
        config.try_deserialize().map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment as ServiceEnvironment;
    use std::io::Write;

    const TOML: &str = r#"
        [service]
        environment = "staging"
        log_level = "debug"
        metrics_port = 9191
        default_backend = "deis"

        [store]
        database_url = "sqlite::memory:"

        [tasks]
        max_poll_attempts = 10
        default_retry_delay_secs = 5

        [providers.secret]
        kind = "secret"
        options = { config_name = "SECRET_KEY" }

        [backends.deis]
        api_url = "http://deis.example.com"
        service_token = "svc-token"
    "#;

    #[test]
    fn test_load_from_toml() {
        let config = ConfigLoader::from_toml(TOML).unwrap();
        assert_eq!(config.service.environment, ServiceEnvironment::Staging);
        assert_eq!(config.service.log_level, "debug");
        assert_eq!(config.service.default_backend.as_deref(), Some("deis"));
        assert_eq!(config.tasks.max_poll_attempts, 10);
        // unspecified fields fall back to defaults
        assert_eq!(config.tasks.max_retry_delay_secs, 600);
        assert_eq!(config.providers["secret"].option("config_name"), Some("SECRET_KEY"));
        assert_eq!(config.backends["deis"].client, "deis");
        assert_eq!(config.backends["deis"].service_token.as_deref(), Some("svc-token"));
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
service:
  environment: production
  log_level: warn
providers:
  postgres:
    kind: rds
    options:
      engine: postgres
backends:
  deis:
    api_url: "https://deis.example.com"
    timeout_ms: 5000
        "#;

        let config = ConfigLoader::from_yaml(yaml).unwrap();
        assert_eq!(config.service.environment, ServiceEnvironment::Production);
        assert_eq!(config.providers["postgres"].kind, "rds");
        assert_eq!(config.backends["deis"].timeout_ms, 5000);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{
            "service": { "environment": "local", "log_level": "trace" },
            "providers": { "secret": { "kind": "secret" } }
        }"#;

        let config = ConfigLoader::from_json(json).unwrap();
        assert_eq!(config.service.log_level, "trace");
        assert!(config.providers["secret"].options.is_empty());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ConfigLoader::from_toml("").unwrap();
        assert_eq!(config.service.environment, ServiceEnvironment::Local);
        assert_eq!(config.store.database_url, "sqlite://addons.db");
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_from_file_rejects_unknown_extension() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        file.write_all(b"[service]").unwrap();

        let result = ConfigLoader::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }

    #[test]
    fn test_builder_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(TOML.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::builder()
            .add_file(file.path(), true)
            .build()
            .unwrap();
        assert_eq!(config.service.metrics_port, 9191);
        assert_eq!(config.providers["secret"].kind, "secret");
    }
}
