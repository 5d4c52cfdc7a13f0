use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tigerhost_addons_types::{Addon, AddonEvent, AddonState, StateTransition};

use crate::store::AddonStore;
use crate::{StoreError, TransitionError};

// ═══════════════════════════════════════════════════════════════════════════
// MANAGER
// ═══════════════════════════════════════════════════════════════════════════

/// Sole writer of addon lifecycle state.
///
/// Every state change goes through [`StateMachineManager::transition`], which
/// checks the event's source state, lets the caller edit a working copy of the
/// record, enforces the record invariants and commits the result together with
/// a history entry. Transitions on the same addon are serialised in-process;
/// the store's conditional commit catches writers in other processes.
pub struct StateMachineManager<S: AddonStore + ?Sized> {
    store: Arc<S>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: AddonStore + ?Sized> StateMachineManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Persist a new addon. It must be in the initial state without config.
    pub async fn create(&self, addon: &Addon) -> Result<(), TransitionError> {
        if addon.state != AddonState::AwaitingProvisionStart {
            return Err(TransitionError::InvariantViolation(format!(
                "new addon {} must start in {}, not {}",
                addon.id,
                AddonState::AwaitingProvisionStart,
                addon.state
            )));
        }
        if addon.config.is_some() || addon.provider_uuid.is_some() {
            return Err(TransitionError::InvariantViolation(format!(
                "new addon {} cannot carry config or a provider handle",
                addon.id
            )));
        }

        self.store.create(addon).await?;
        tracing::info!(addon_id = %addon.id, provider = %addon.provider_name, "Addon created");
        Ok(())
    }

    pub async fn get(&self, addon_id: &str) -> Result<Option<Addon>, TransitionError> {
        Ok(self.store.get(addon_id).await?)
    }

    pub async fn history(&self, addon_id: &str) -> Result<Vec<StateTransition>, TransitionError> {
        Ok(self.store.history(addon_id).await?)
    }

    /// Apply `event` to the addon, letting `mutate` edit the record first.
    ///
    /// Nothing is persisted if the addon is not in the event's source state,
    /// if `mutate` fails, or if the edited record breaks an invariant. The
    /// committed record is returned.
    pub async fn transition<F, E>(
        &self,
        addon_id: &str,
        event: AddonEvent,
        mutate: F,
    ) -> Result<Addon, E>
    where
        F: FnOnce(&mut Addon) -> Result<(), E>,
        E: From<TransitionError>,
    {
        let lock = self.addon_lock(addon_id);
        let result = {
            let _guard = lock.lock().await;
            self.transition_locked(addon_id, event, mutate).await
        };
        self.release_lock(addon_id, lock);
        result
    }

    /// Apply `event`, changing nothing but the diagnostic message.
    pub async fn fire(
        &self,
        addon_id: &str,
        event: AddonEvent,
        message: Option<String>,
    ) -> Result<Addon, TransitionError> {
        self.transition(addon_id, event, |addon| {
            if message.is_some() {
                addon.message = message;
            }
            Ok::<_, TransitionError>(())
        })
        .await
    }

    async fn transition_locked<F, E>(
        &self,
        addon_id: &str,
        event: AddonEvent,
        mutate: F,
    ) -> Result<Addon, E>
    where
        F: FnOnce(&mut Addon) -> Result<(), E>,
        E: From<TransitionError>,
    {
        let current = self
            .store
            .get(addon_id)
            .await
            .map_err(TransitionError::from)?
            .ok_or_else(|| TransitionError::NotFound(addon_id.to_string()))?;

        let (source, destination) = event.edge();
        if current.state != source {
            return Err(TransitionError::InvalidTransition {
                addon_id: addon_id.to_string(),
                event,
                current: current.state,
            }
            .into());
        }

        let mut working = current.clone();
        mutate(&mut working)?;

        check_immutables(&current, &working, event)?;

        working.state = destination;
        if event == AddonEvent::DeprovisionSuccess {
            working.config = None;
        }
        check_invariants(&working, event)?;

        let now = Utc::now().timestamp() as u64;
        working.updated_at = now;

        let mut transition = StateTransition::new(event, now);
        if working.message != current.message {
            if let Some(message) = &working.message {
                transition = transition.with_details(message.clone());
            }
        }

        match self.store.commit_transition(&working, source, transition).await {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                let latest = self
                    .store
                    .get(addon_id)
                    .await
                    .map_err(TransitionError::from)?
                    .map(|a| a.state)
                    .unwrap_or(current.state);
                return Err(TransitionError::InvalidTransition {
                    addon_id: addon_id.to_string(),
                    event,
                    current: latest,
                }
                .into());
            }
            Err(e) => return Err(TransitionError::from(e).into()),
        }

        tracing::info!(
            addon_id = %addon_id,
            event = %event,
            from = %source,
            to = %destination,
            "Addon transitioned"
        );

        Ok(working)
    }

    fn addon_lock(&self, addon_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(addon_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock entry once nobody else holds or waits on it.
    fn release_lock(&self, addon_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in `lock`
        let idle = Arc::strong_count(&lock) == 2;
        drop(lock);
        if idle {
            locks.remove(addon_id);
        }
    }
}

fn check_immutables(
    before: &Addon,
    after: &Addon,
    event: AddonEvent,
) -> Result<(), TransitionError> {
    if after.id != before.id {
        return Err(TransitionError::ImmutableField("id"));
    }
    if after.provider_name != before.provider_name {
        return Err(TransitionError::ImmutableField("provider_name"));
    }
    if after.config_customization != before.config_customization {
        return Err(TransitionError::ImmutableField("config_customization"));
    }
    if after.created_at != before.created_at {
        return Err(TransitionError::ImmutableField("created_at"));
    }
    if after.state != before.state {
        return Err(TransitionError::ImmutableField("state"));
    }
    if before.provider_uuid.is_some() && after.provider_uuid != before.provider_uuid {
        return Err(TransitionError::ImmutableField("provider_uuid"));
    }
    if !event.writes_config() && after.config != before.config {
        return Err(TransitionError::ImmutableField("config"));
    }
    Ok(())
}

fn check_invariants(addon: &Addon, event: AddonEvent) -> Result<(), TransitionError> {
    // Failure edges record bad records as they are
    if event.is_failure() {
        return Ok(());
    }

    if addon.state.holds_config() != addon.config.is_some() {
        return Err(TransitionError::InvariantViolation(format!(
            "addon {} in state {} {} config",
            addon.id,
            addon.state,
            if addon.config.is_some() {
                "cannot carry"
            } else {
                "requires"
            }
        )));
    }

    if addon.provider_uuid.is_none() {
        return Err(TransitionError::InvariantViolation(format!(
            "addon {} has no provider handle",
            addon.id
        )));
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;
    use tigerhost_addons_types::{AddonConfig, ConfigValue};
    use uuid::Uuid;

    fn manager() -> StateMachineManager<InMemoryStore> {
        StateMachineManager::new(Arc::new(InMemoryStore::new()))
    }

    fn sample_config() -> AddonConfig {
        let mut config = AddonConfig::new();
        config.insert("SECRET_KEY".to_string(), ConfigValue::from("s3cr3t"));
        config
    }

    async fn create(manager: &StateMachineManager<InMemoryStore>, id: &str) {
        manager
            .create(&Addon::new(id, "secret", 100))
            .await
            .unwrap();
    }

    async fn submit(manager: &StateMachineManager<InMemoryStore>, id: &str) -> Uuid {
        let uuid = Uuid::new_v4();
        manager
            .transition(id, AddonEvent::SubmitProvisionRequest, |addon| {
                addon.provider_uuid = Some(uuid);
                Ok::<_, TransitionError>(())
            })
            .await
            .unwrap();
        uuid
    }

    #[tokio::test]
    async fn test_create_rejects_non_initial_state() {
        let manager = manager();
        let mut addon = Addon::new("addon-1", "secret", 100);
        addon.state = AddonState::Provisioned;

        let result = manager.create(&addon).await;
        assert!(matches!(result, Err(TransitionError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let manager = manager();
        create(&manager, "addon-1").await;
        let uuid = submit(&manager, "addon-1").await;

        let addon = manager
            .transition("addon-1", AddonEvent::ProvisionSuccess, |addon| {
                addon.config = Some(sample_config());
                Ok::<_, TransitionError>(())
            })
            .await
            .unwrap();
        assert_eq!(addon.state, AddonState::Provisioned);
        assert_eq!(addon.provider_uuid, Some(uuid));

        manager
            .fire("addon-1", AddonEvent::ConfigVariablesSetSuccess, None)
            .await
            .unwrap();
        manager
            .fire("addon-1", AddonEvent::SubmitDeprovisionRequest, None)
            .await
            .unwrap();
        let addon = manager
            .fire(
                "addon-1",
                AddonEvent::DeprovisionSuccess,
                Some("Please remove SECRET_KEY".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(addon.state, AddonState::Deprovisioned);
        assert_eq!(addon.config, None);
        assert_eq!(addon.message.as_deref(), Some("Please remove SECRET_KEY"));

        let history = manager.history("addon-1").await.unwrap();
        let events: Vec<_> = history.iter().map(|t| t.event).collect();
        assert_eq!(
            events,
            vec![
                AddonEvent::SubmitProvisionRequest,
                AddonEvent::ProvisionSuccess,
                AddonEvent::ConfigVariablesSetSuccess,
                AddonEvent::SubmitDeprovisionRequest,
                AddonEvent::DeprovisionSuccess,
            ]
        );
        assert_eq!(
            history[4].details.as_deref(),
            Some("Please remove SECRET_KEY")
        );
    }

    #[tokio::test]
    async fn test_wrong_source_state_is_rejected() {
        let manager = manager();
        create(&manager, "addon-1").await;

        let mut called = false;
        let result = manager
            .transition("addon-1", AddonEvent::ProvisionSuccess, |_| {
                called = true;
                Ok::<_, TransitionError>(())
            })
            .await;

        assert!(!called);
        assert!(matches!(
            result,
            Err(TransitionError::InvalidTransition {
                current: AddonState::AwaitingProvisionStart,
                ..
            })
        ));
        assert!(manager.history("addon-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_addon() {
        let manager = manager();
        let result = manager
            .fire("ghost", AddonEvent::SubmitProvisionRequest, None)
            .await;
        assert!(matches!(result, Err(TransitionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_closure_error_persists_nothing() {
        #[derive(Debug)]
        enum TaskError {
            Provider(String),
            Transition(TransitionError),
        }

        impl From<TransitionError> for TaskError {
            fn from(e: TransitionError) -> Self {
                TaskError::Transition(e)
            }
        }

        let manager = manager();
        create(&manager, "addon-1").await;

        let result = manager
            .transition("addon-1", AddonEvent::SubmitProvisionRequest, |addon| {
                addon.provider_uuid = Some(Uuid::new_v4());
                addon.message = Some("half done".to_string());
                Err(TaskError::Provider("quota exceeded".to_string()))
            })
            .await;

        assert!(matches!(result, Err(TaskError::Provider(_))));
        let addon = manager.get("addon-1").await.unwrap().unwrap();
        assert_eq!(addon.state, AddonState::AwaitingProvisionStart);
        assert_eq!(addon.provider_uuid, None);
        assert_eq!(addon.message, None);

        let stale = manager
            .transition("addon-1", AddonEvent::ProvisionFailure, |_| Ok(()))
            .await;
        assert!(matches!(stale, Err(TaskError::Transition(_))));
    }

    #[tokio::test]
    async fn test_immutable_fields() {
        let manager = manager();
        create(&manager, "addon-1").await;
        submit(&manager, "addon-1").await;

        let result = manager
            .transition("addon-1", AddonEvent::ProvisionFailure, |addon| {
                addon.provider_uuid = Some(Uuid::new_v4());
                Ok::<_, TransitionError>(())
            })
            .await;
        assert!(matches!(
            result,
            Err(TransitionError::ImmutableField("provider_uuid"))
        ));

        let result = manager
            .transition("addon-1", AddonEvent::ProvisionFailure, |addon| {
                addon.provider_name = "postgres".to_string();
                Ok::<_, TransitionError>(())
            })
            .await;
        assert!(matches!(
            result,
            Err(TransitionError::ImmutableField("provider_name"))
        ));

        let result = manager
            .transition("addon-1", AddonEvent::ProvisionFailure, |addon| {
                addon.config = Some(sample_config());
                Ok::<_, TransitionError>(())
            })
            .await;
        assert!(matches!(
            result,
            Err(TransitionError::ImmutableField("config"))
        ));

        let addon = manager.get("addon-1").await.unwrap().unwrap();
        assert_eq!(addon.state, AddonState::WaitingForProvision);
    }

    #[tokio::test]
    async fn test_provision_success_requires_config() {
        let manager = manager();
        create(&manager, "addon-1").await;
        submit(&manager, "addon-1").await;

        let result = manager
            .fire("addon-1", AddonEvent::ProvisionSuccess, None)
            .await;
        assert!(matches!(result, Err(TransitionError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn test_submit_requires_provider_uuid() {
        let manager = manager();
        create(&manager, "addon-1").await;

        let result = manager
            .fire("addon-1", AddonEvent::SubmitProvisionRequest, None)
            .await;
        assert!(matches!(result, Err(TransitionError::InvariantViolation(_))));

        // start failure never received a handle
        let addon = manager
            .fire(
                "addon-1",
                AddonEvent::ProvisionStartFailure,
                Some("quota exceeded".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(addon.state, AddonState::ProvisionFailed);
    }

    #[tokio::test]
    async fn test_failure_edges_accept_incomplete_records() {
        let manager = manager();

        // provisioned without config, as left by an older writer
        let mut broken = Addon::new("addon-1", "secret", 100);
        broken.state = AddonState::Provisioned;
        broken.provider_uuid = Some(Uuid::new_v4());
        manager.store().create(&broken).await.unwrap();

        let success = manager
            .fire("addon-1", AddonEvent::ConfigVariablesSetSuccess, None)
            .await;
        assert!(matches!(success, Err(TransitionError::InvariantViolation(_))));

        let addon = manager
            .fire(
                "addon-1",
                AddonEvent::ConfigVariablesSetFailure,
                Some("addon has no config".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(addon.state, AddonState::ConfigSetFailed);
        assert_eq!(addon.config, None);

        // waiting on a provider it never got a handle from
        let mut orphan = Addon::new("addon-2", "secret", 100);
        orphan.state = AddonState::WaitingForProvision;
        manager.store().create(&orphan).await.unwrap();

        let addon = manager
            .fire(
                "addon-2",
                AddonEvent::ProvisionFailure,
                Some("addon has no provider handle".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(addon.state, AddonState::ProvisionFailed);
        assert_eq!(addon.provider_uuid, None);
        assert_eq!(manager.history("addon-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_transitions_serialise() {
        let manager = Arc::new(manager());
        create(&manager, "addon-1").await;
        submit(&manager, "addon-1").await;

        let success = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .transition("addon-1", AddonEvent::ProvisionSuccess, |addon| {
                        addon.config = Some(sample_config());
                        Ok::<_, TransitionError>(())
                    })
                    .await
            })
        };
        let failure = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .fire(
                        "addon-1",
                        AddonEvent::ProvisionFailure,
                        Some("timed out".to_string()),
                    )
                    .await
            })
        };

        let results = [success.await.unwrap(), failure.await.unwrap()];
        let committed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(committed, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.is_invalid_transition()));

        let addon = manager.get("addon-1").await.unwrap().unwrap();
        let history = manager.history("addon-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].to_state, addon.state);
        assert!(manager.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poisoned_lock_map_still_serves_transitions() {
        let manager = Arc::new(manager());
        create(&manager, "addon-1").await;

        let poisoner = manager.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.locks.lock().unwrap();
            panic!("worker died holding the lock map");
        })
        .join();
        assert!(manager.locks.is_poisoned());

        submit(&manager, "addon-1").await;
        let addon = manager.get("addon-1").await.unwrap().unwrap();
        assert_eq!(addon.state, AddonState::WaitingForProvision);
    }

    #[tokio::test]
    async fn test_many_concurrent_duplicates() {
        let manager = Arc::new(manager());
        create(&manager, "addon-1").await;
        submit(&manager, "addon-1").await;

        let attempts = (0..16).map(|_| {
            let manager = manager.clone();
            async move {
                manager
                    .fire("addon-1", AddonEvent::ProvisionFailure, None)
                    .await
            }
        });
        let results = futures::future::join_all(attempts).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(manager.history("addon-1").await.unwrap().len(), 2);
    }
}
