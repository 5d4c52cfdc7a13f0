use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tigerhost_addons_types::{Addon, AddonState, StateTransition};

use crate::StoreError;

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Addon storage trait - can be implemented for different backends
#[async_trait]
pub trait AddonStore: Send + Sync {
    /// Store a new addon
    async fn create(&self, addon: &Addon) -> Result<(), StoreError>;

    /// Get addon by ID
    async fn get(&self, id: &str) -> Result<Option<Addon>, StoreError>;

    /// Replace the addon record and append a history entry, atomically.
    ///
    /// The write only happens if the stored state still equals `expected`;
    /// otherwise `StoreError::Conflict` is returned and nothing changes.
    async fn commit_transition(
        &self,
        addon: &Addon,
        expected: AddonState,
        transition: StateTransition,
    ) -> Result<(), StoreError>;

    /// List addons in a given state, oldest first, skipping the first `offset`
    async fn list_by_state(
        &self,
        state: AddonState,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Addon>, StoreError>;

    /// Transition history for an addon, oldest first
    async fn history(&self, id: &str) -> Result<Vec<StateTransition>, StoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE (for testing)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InMemoryStore {
    addons: Arc<RwLock<HashMap<String, Addon>>>,
    transitions: Arc<RwLock<HashMap<String, Vec<StateTransition>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of addons (for testing)
    pub fn len(&self) -> usize {
        self.addons.read().unwrap().len()
    }

    /// Check if store is empty (for testing)
    pub fn is_empty(&self) -> bool {
        self.addons.read().unwrap().is_empty()
    }
}

#[async_trait]
impl AddonStore for InMemoryStore {
    async fn create(&self, addon: &Addon) -> Result<(), StoreError> {
        let mut addons = self.addons.write().unwrap();
        if addons.contains_key(&addon.id) {
            return Err(StoreError::DuplicateId(addon.id.clone()));
        }
        addons.insert(addon.id.clone(), addon.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Addon>, StoreError> {
        Ok(self.addons.read().unwrap().get(id).cloned())
    }

    async fn commit_transition(
        &self,
        addon: &Addon,
        expected: AddonState,
        transition: StateTransition,
    ) -> Result<(), StoreError> {
        // Both maps are written under the addons lock so readers never see
        // a new state without its history entry.
        let mut addons = self.addons.write().unwrap();
        let stored = addons
            .get_mut(&addon.id)
            .ok_or_else(|| StoreError::NotFound(addon.id.clone()))?;

        if stored.state != expected {
            return Err(StoreError::Conflict {
                id: addon.id.clone(),
                expected,
            });
        }

        *stored = addon.clone();
        self.transitions
            .write()
            .unwrap()
            .entry(addon.id.clone())
            .or_default()
            .push(transition);

        Ok(())
    }

    async fn list_by_state(
        &self,
        state: AddonState,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Addon>, StoreError> {
        let addons = self.addons.read().unwrap();
        let mut results: Vec<_> = addons
            .values()
            .filter(|a| a.state == state)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(results.into_iter().skip(offset).take(limit).collect())
    }

    async fn history(&self, id: &str) -> Result<Vec<StateTransition>, StoreError> {
        Ok(self
            .transitions
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use tigerhost_addons_types::AddonEvent;

    fn create_test_addon(id: &str, created_at: u64) -> Addon {
        Addon::new(id, "secret", created_at)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryStore::new();
        let addon = create_test_addon("addon-1", 100);

        store.create(&addon).await.unwrap();

        assert_eq!(store.get("addon-1").await.unwrap(), Some(addon));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_id() {
        let store = InMemoryStore::new();
        let addon = create_test_addon("addon-1", 100);

        store.create(&addon).await.unwrap();
        let result = store.create(&addon).await;

        assert!(matches!(result, Err(StoreError::DuplicateId(_))));
    }

    #[tokio::test]
    async fn test_commit_transition_appends_history() {
        let store = InMemoryStore::new();
        let mut addon = create_test_addon("addon-1", 100);
        store.create(&addon).await.unwrap();

        addon.state = AddonState::WaitingForProvision;
        let transition = StateTransition::new(AddonEvent::SubmitProvisionRequest, 150);
        store
            .commit_transition(&addon, AddonState::AwaitingProvisionStart, transition.clone())
            .await
            .unwrap();

        let stored = store.get("addon-1").await.unwrap().unwrap();
        assert_eq!(stored.state, AddonState::WaitingForProvision);
        assert_eq!(store.history("addon-1").await.unwrap(), vec![transition]);
    }

    #[tokio::test]
    async fn test_commit_transition_conflict() {
        let store = InMemoryStore::new();
        let mut addon = create_test_addon("addon-1", 100);
        store.create(&addon).await.unwrap();

        addon.state = AddonState::Provisioned;
        let result = store
            .commit_transition(
                &addon,
                AddonState::WaitingForProvision,
                StateTransition::new(AddonEvent::ProvisionSuccess, 150),
            )
            .await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        let stored = store.get("addon-1").await.unwrap().unwrap();
        assert_eq!(stored.state, AddonState::AwaitingProvisionStart);
        assert!(store.history("addon-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_transition_missing_addon() {
        let store = InMemoryStore::new();
        let addon = create_test_addon("ghost", 100);

        let result = store
            .commit_transition(
                &addon,
                AddonState::AwaitingProvisionStart,
                StateTransition::new(AddonEvent::SubmitProvisionRequest, 150),
            )
            .await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_state() {
        let store = InMemoryStore::new();
        for (id, created_at) in [("addon-3", 300), ("addon-1", 100), ("addon-2", 200)] {
            store
                .create(&create_test_addon(id, created_at))
                .await
                .unwrap();
        }

        let mut provisioned = create_test_addon("addon-4", 50);
        provisioned.state = AddonState::Provisioned;
        store.create(&provisioned).await.unwrap();

        let awaiting = store
            .list_by_state(AddonState::AwaitingProvisionStart, 0, 2)
            .await
            .unwrap();
        let ids: Vec<_> = awaiting.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["addon-1", "addon-2"]);

        let rest = store
            .list_by_state(AddonState::AwaitingProvisionStart, 2, 2)
            .await
            .unwrap();
        let ids: Vec<_> = rest.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["addon-3"]);

        let done = store
            .list_by_state(AddonState::Provisioned, 0, 10)
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
    }
}
