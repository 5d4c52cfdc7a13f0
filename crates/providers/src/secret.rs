use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tigerhost_addons_config::ProviderConfig;
use uuid::Uuid;

use crate::{
    config_variable_name, AddonProvider, ConfigurationError, DeprovisionResult, ProviderError,
    ProvisionStart, ProvisionStatus,
};

pub const DEFAULT_SECRET_CONFIG_NAME: &str = "SECRET_KEY";
pub const DEFAULT_SECRET_LENGTH: usize = 100;

/// Generates a random secret and stores it in a config variable.
///
/// There is no external resource: provisioning completes immediately and
/// deprovisioning only asks the user to remove the variable.
#[derive(Debug, Clone)]
pub struct SecretProvider {
    config_name: String,
    length: usize,
}

impl Default for SecretProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET_CONFIG_NAME, DEFAULT_SECRET_LENGTH)
    }
}

impl SecretProvider {
    pub fn new(config_name: impl Into<String>, length: usize) -> Self {
        Self {
            config_name: config_name.into(),
            length,
        }
    }

    /// Build from a provider config entry (`config_name`, `length` options).
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self, ConfigurationError> {
        let config_name = config
            .option("config_name")
            .unwrap_or(DEFAULT_SECRET_CONFIG_NAME);
        if config_name.is_empty() {
            return Err(ConfigurationError::InvalidOption {
                provider: name.to_string(),
                message: "config_name cannot be empty".to_string(),
            });
        }

        let length = match config.option("length") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|len| *len > 0)
                .ok_or_else(|| ConfigurationError::InvalidOption {
                    provider: name.to_string(),
                    message: format!("length must be a positive integer, got '{raw}'"),
                })?,
            None => DEFAULT_SECRET_LENGTH,
        };

        Ok(Self::new(config_name, length))
    }

    fn generate_secret(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }
}

#[async_trait]
impl AddonProvider for SecretProvider {
    async fn begin_provision(&self, _app_id: &str) -> Result<ProvisionStart, ProviderError> {
        Ok(ProvisionStart {
            message: format!(
                "A secret key will be stored into {}.",
                self.config_name
            ),
            uuid: Uuid::new_v4(),
        })
    }

    async fn provision_complete(&self, _uuid: Uuid) -> Result<ProvisionStatus, ProviderError> {
        Ok(ProvisionStatus::ready())
    }

    async fn get_config(
        &self,
        _uuid: Uuid,
        config_customization: Option<&str>,
    ) -> Result<Value, ProviderError> {
        let name = config_variable_name(&self.config_name, config_customization);
        Ok(json!({
            "config": {
                name: self.generate_secret(),
            }
        }))
    }

    async fn deprovision(&self, _uuid: Uuid) -> Result<DeprovisionResult, ProviderError> {
        Ok(DeprovisionResult {
            message: format!(
                "Please remove {} from your config manually.",
                self.config_name
            ),
        })
    }
}
