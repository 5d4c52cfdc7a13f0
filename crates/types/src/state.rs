use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of an addon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonState {
    AwaitingProvisionStart,
    WaitingForProvision,
    Provisioned,
    ProvisionFailed,
    ConfigSet,
    ConfigSetFailed,
    Deprovisioning,
    Deprovisioned,
    DeprovisionFailed,
}

impl AddonState {
    pub const ALL: [AddonState; 9] = [
        AddonState::AwaitingProvisionStart,
        AddonState::WaitingForProvision,
        AddonState::Provisioned,
        AddonState::ProvisionFailed,
        AddonState::ConfigSet,
        AddonState::ConfigSetFailed,
        AddonState::Deprovisioning,
        AddonState::Deprovisioned,
        AddonState::DeprovisionFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AddonState::AwaitingProvisionStart => "awaiting_provision_start",
            AddonState::WaitingForProvision => "waiting_for_provision",
            AddonState::Provisioned => "provisioned",
            AddonState::ProvisionFailed => "provision_failed",
            AddonState::ConfigSet => "config_set",
            AddonState::ConfigSetFailed => "config_set_failed",
            AddonState::Deprovisioning => "deprovisioning",
            AddonState::Deprovisioned => "deprovisioned",
            AddonState::DeprovisionFailed => "deprovision_failed",
        }
    }

    /// No event leaves a terminal state. `ConfigSet` ends the provisioning
    /// workflow but still accepts a deprovision request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AddonState::ProvisionFailed
                | AddonState::ConfigSetFailed
                | AddonState::Deprovisioned
                | AddonState::DeprovisionFailed
        )
    }

    /// States in which the addon carries a provisioned config.
    pub fn holds_config(&self) -> bool {
        matches!(
            self,
            AddonState::Provisioned
                | AddonState::ConfigSet
                | AddonState::ConfigSetFailed
                | AddonState::Deprovisioning
                | AddonState::DeprovisionFailed
        )
    }
}

impl fmt::Display for AddonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown addon state: {0}")]
pub struct UnknownStateError(pub String);

impl FromStr for AddonState {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AddonState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownStateError(s.to_string()))
    }
}

/// Named lifecycle events. Each event moves exactly one source state to
/// exactly one destination state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonEvent {
    SubmitProvisionRequest,
    ProvisionStartFailure,
    ProvisionSuccess,
    ProvisionFailure,
    ConfigVariablesSetSuccess,
    ConfigVariablesSetFailure,
    SubmitDeprovisionRequest,
    DeprovisionSuccess,
    DeprovisionFailure,
}

impl AddonEvent {
    pub const ALL: [AddonEvent; 9] = [
        AddonEvent::SubmitProvisionRequest,
        AddonEvent::ProvisionStartFailure,
        AddonEvent::ProvisionSuccess,
        AddonEvent::ProvisionFailure,
        AddonEvent::ConfigVariablesSetSuccess,
        AddonEvent::ConfigVariablesSetFailure,
        AddonEvent::SubmitDeprovisionRequest,
        AddonEvent::DeprovisionSuccess,
        AddonEvent::DeprovisionFailure,
    ];

    /// The `(source, destination)` pair of this event.
    pub fn edge(&self) -> (AddonState, AddonState) {
        use AddonState::*;
        match self {
            AddonEvent::SubmitProvisionRequest => (AwaitingProvisionStart, WaitingForProvision),
            AddonEvent::ProvisionStartFailure => (AwaitingProvisionStart, ProvisionFailed),
            AddonEvent::ProvisionSuccess => (WaitingForProvision, Provisioned),
            AddonEvent::ProvisionFailure => (WaitingForProvision, ProvisionFailed),
            AddonEvent::ConfigVariablesSetSuccess => (Provisioned, ConfigSet),
            AddonEvent::ConfigVariablesSetFailure => (Provisioned, ConfigSetFailed),
            AddonEvent::SubmitDeprovisionRequest => (ConfigSet, Deprovisioning),
            AddonEvent::DeprovisionSuccess => (Deprovisioning, Deprovisioned),
            AddonEvent::DeprovisionFailure => (Deprovisioning, DeprovisionFailed),
        }
    }

    pub fn source(&self) -> AddonState {
        self.edge().0
    }

    pub fn destination(&self) -> AddonState {
        self.edge().1
    }

    /// Events that record a failed step. They commit whatever the record
    /// holds, so a broken addon can still reach a failure state.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AddonEvent::ProvisionStartFailure
                | AddonEvent::ProvisionFailure
                | AddonEvent::ConfigVariablesSetFailure
                | AddonEvent::DeprovisionFailure
        )
    }

    /// Events allowed to change `Addon::config`.
    pub fn writes_config(&self) -> bool {
        matches!(
            self,
            AddonEvent::ProvisionSuccess | AddonEvent::DeprovisionSuccess
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AddonEvent::SubmitProvisionRequest => "submit_provision_request",
            AddonEvent::ProvisionStartFailure => "provision_start_failure",
            AddonEvent::ProvisionSuccess => "provision_success",
            AddonEvent::ProvisionFailure => "provision_failure",
            AddonEvent::ConfigVariablesSetSuccess => "config_variables_set_success",
            AddonEvent::ConfigVariablesSetFailure => "config_variables_set_failure",
            AddonEvent::SubmitDeprovisionRequest => "submit_deprovision_request",
            AddonEvent::DeprovisionSuccess => "deprovision_success",
            AddonEvent::DeprovisionFailure => "deprovision_failure",
        }
    }
}

impl fmt::Display for AddonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddonEvent {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AddonEvent::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownStateError(s.to_string()))
    }
}
