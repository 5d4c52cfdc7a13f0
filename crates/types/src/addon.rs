use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AddonConfig, AddonEvent, AddonState};

/// Reference to the hosted application an addon is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRef {
    /// Application id on the PaaS backend
    pub app_id: String,

    /// Name of the PaaS backend hosting the app
    pub backend: String,
}

impl AppRef {
    pub fn new(app_id: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            backend: backend.into(),
        }
    }
}

/// Reference to the principal that requested the addon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub username: String,
}

impl UserRef {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// Durable addon record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Addon {
    pub id: String,
    pub provider_name: String,
    pub provider_uuid: Option<Uuid>,
    pub state: AddonState,
    pub config: Option<AddonConfig>,
    pub config_customization: Option<String>,
    pub app: Option<AppRef>,
    pub user: Option<UserRef>,
    /// Last user-facing message or failure diagnostic
    pub message: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Addon {
    /// Create a new addon record in the initial state
    pub fn new(id: impl Into<String>, provider_name: impl Into<String>, created_at: u64) -> Self {
        Self {
            id: id.into(),
            provider_name: provider_name.into(),
            provider_uuid: None,
            state: AddonState::AwaitingProvisionStart,
            config: None,
            config_customization: None,
            app: None,
            user: None,
            message: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_app(mut self, app: AppRef) -> Self {
        self.app = Some(app);
        self
    }

    pub fn with_user(mut self, user: UserRef) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_config_customization(mut self, customization: impl Into<String>) -> Self {
        self.config_customization = Some(customization.into());
        self
    }
}

/// Entry in an addon's transition history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub event: AddonEvent,
    pub from_state: AddonState,
    pub to_state: AddonState,
    pub timestamp: u64,
    pub details: Option<String>,
}

impl StateTransition {
    pub fn new(event: AddonEvent, timestamp: u64) -> Self {
        let (from_state, to_state) = event.edge();
        Self {
            event,
            from_state,
            to_state,
            timestamp,
            details: None,
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_addon_is_awaiting_provision_start() {
        let addon = Addon::new("addon-1", "secret", 100)
            .with_app(AppRef::new("my-app", "deis"))
            .with_user(UserRef::new("alice"))
            .with_config_customization("SESSION");

        assert_eq!(addon.state, AddonState::AwaitingProvisionStart);
        assert_eq!(addon.provider_uuid, None);
        assert_eq!(addon.config, None);
        assert_eq!(addon.config_customization.as_deref(), Some("SESSION"));
        assert_eq!(addon.updated_at, 100);
        assert!(!addon.state.is_terminal());
    }

    #[test]
    fn test_transition_record_uses_event_edge() {
        let transition = StateTransition::new(AddonEvent::ProvisionFailure, 200)
            .with_details("database vanished".to_string());

        assert_eq!(transition.from_state, AddonState::WaitingForProvision);
        assert_eq!(transition.to_state, AddonState::ProvisionFailed);
        assert_eq!(transition.details.as_deref(), Some("database vanished"));
    }
}
