use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ProviderError;

/// Result of kicking off provisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionStart {
    /// Message to be displayed to the user
    pub message: String,

    /// Handle identifying the external resource
    pub uuid: Uuid,
}

/// Result of polling a provision in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionStatus {
    pub ready: bool,

    /// Suggested wait before polling again; only meaningful when not ready
    pub retry_after_secs: u64,
}

impl ProvisionStatus {
    pub fn ready() -> Self {
        Self {
            ready: true,
            retry_after_secs: 0,
        }
    }

    pub fn retry_after(secs: u64) -> Self {
        Self {
            ready: false,
            retry_after_secs: secs,
        }
    }
}

/// Result of kicking off deprovisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprovisionResult {
    pub message: String,
}

/// Contract implemented by every addon backend (secrets, databases,
/// containers).
///
/// Every method must return promptly; long-running work happens on the
/// provider's side and is observed through `provision_complete`.
#[async_trait]
pub trait AddonProvider: Send + Sync {
    /// Start allocating a resource for `app_id`.
    async fn begin_provision(&self, app_id: &str) -> Result<ProvisionStart, ProviderError>;

    /// Poll whether the resource identified by `uuid` is ready.
    ///
    /// Errors if the resource failed or no longer exists.
    async fn provision_complete(&self, uuid: Uuid) -> Result<ProvisionStatus, ProviderError>;

    /// Environment bindings for a ready resource, as a result object with a
    /// `config` mapping. Validation of the mapping is the caller's job.
    async fn get_config(
        &self,
        uuid: Uuid,
        config_customization: Option<&str>,
    ) -> Result<Value, ProviderError>;

    /// Start tearing the resource down.
    ///
    /// Errors if teardown cannot start or was already started.
    async fn deprovision(&self, uuid: Uuid) -> Result<DeprovisionResult, ProviderError>;
}

/// Name of a config variable, prefixed with the customization when present.
pub fn config_variable_name(base: &str, config_customization: Option<&str>) -> String {
    match config_customization {
        Some(custom) => format!("{custom}_{base}"),
        None => base.to_string(),
    }
}
