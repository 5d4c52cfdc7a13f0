use std::sync::Arc;
use thiserror::Error;
use tigerhost_addons_types::{AddonConfig, AppRef, UserRef};

use crate::backend::{BackendClientResolver, BackendError, ClientError};

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Writes an addon's config into its application's environment
#[derive(Clone)]
pub struct ConfigPropagator {
    resolver: Arc<dyn BackendClientResolver>,
}

impl ConfigPropagator {
    pub fn new(resolver: Arc<dyn BackendClientResolver>) -> Self {
        Self { resolver }
    }

    /// Push the whole mapping to the app's backend as `user`.
    pub async fn propagate(
        &self,
        app: &AppRef,
        user: &UserRef,
        config: &AddonConfig,
    ) -> Result<(), PropagationError> {
        let client = self
            .resolver
            .authenticated_client(&user.username, &app.backend)
            .await?;
        client
            .set_application_env_variables(&app.app_id, config)
            .await?;
        Ok(())
    }
}
