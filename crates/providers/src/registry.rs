use std::collections::HashMap;
use std::sync::Arc;

use tigerhost_addons_config::ProviderConfig;

use crate::{AddonProvider, ConfigurationError, SecretProvider};

/// Builds a provider instance from its named config entry
pub type ProviderFactory = Arc<
    dyn Fn(&str, &ProviderConfig) -> Result<Arc<dyn AddonProvider>, ConfigurationError>
        + Send
        + Sync,
>;

/// Name of the built-in secret provider kind
pub const SECRET_KIND: &str = "secret";

/// Maps provider names to live provider instances.
///
/// Instances are built eagerly from configuration, so an unknown kind is
/// reported at startup instead of at the first task that needs it.
#[derive(Clone)]
pub struct ProviderRegistry {
    kinds: HashMap<String, ProviderFactory>,
    providers: HashMap<String, Arc<dyn AddonProvider>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.kinds.keys().collect();
        kinds.sort();
        let mut providers: Vec<_> = self.providers.keys().collect();
        providers.sort();
        f.debug_struct("ProviderRegistry")
            .field("kinds", &kinds)
            .field("providers", &providers)
            .finish()
    }
}

impl ProviderRegistry {
    /// Empty registry with the built-in kinds available
    pub fn new() -> Self {
        let mut registry = Self {
            kinds: HashMap::new(),
            providers: HashMap::new(),
        };
        registry.register_kind(SECRET_KIND, |name, config| {
            let provider = SecretProvider::from_config(name, config)?;
            Ok(Arc::new(provider) as Arc<dyn AddonProvider>)
        });
        registry
    }

    /// Registry populated from the `providers` section of the app config
    pub fn from_config(
        providers: &HashMap<String, ProviderConfig>,
    ) -> Result<Self, ConfigurationError> {
        let mut registry = Self::new();
        registry.load(providers)?;
        Ok(registry)
    }

    /// Make a provider kind available to `load`.
    pub fn register_kind<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str, &ProviderConfig) -> Result<Arc<dyn AddonProvider>, ConfigurationError>
            + Send
            + Sync
            + 'static,
    {
        self.kinds.insert(kind.into(), Arc::new(factory));
    }

    /// Instantiate every configured provider. Nothing is inserted on error.
    pub fn load(
        &mut self,
        providers: &HashMap<String, ProviderConfig>,
    ) -> Result<(), ConfigurationError> {
        let mut built = HashMap::with_capacity(providers.len());
        for (name, config) in providers {
            let factory =
                self.kinds
                    .get(&config.kind)
                    .ok_or_else(|| ConfigurationError::UnknownKind {
                        name: name.clone(),
                        kind: config.kind.clone(),
                    })?;
            built.insert(name.clone(), factory(name, config)?);
            tracing::debug!(provider = %name, kind = %config.kind, "Registered addon provider");
        }
        self.providers.extend(built);
        Ok(())
    }

    /// Register an already-built provider under `name`.
    pub fn insert(&mut self, name: impl Into<String>, provider: Arc<dyn AddonProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Provider registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn AddonProvider>, ConfigurationError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret_config() -> HashMap<String, ProviderConfig> {
        let mut providers = HashMap::new();
        providers.insert("secret".to_string(), ProviderConfig::new(SECRET_KIND));
        providers.insert(
            "session".to_string(),
            ProviderConfig::new(SECRET_KIND).with_option("config_name", "SESSION_KEY"),
        );
        providers
    }

    #[tokio::test]
    async fn test_from_config_resolves_each_name() {
        let registry = ProviderRegistry::from_config(&secret_config()).unwrap();
        assert_eq!(registry.names(), vec!["secret", "session"]);

        let session = registry.resolve("session").unwrap();
        let result = session.get_config(uuid::Uuid::new_v4(), None).await.unwrap();
        assert!(result["config"].get("SESSION_KEY").is_some());
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.resolve("postgres"),
            Err(ConfigurationError::UnknownProvider(name)) if name == "postgres"
        ));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let mut providers = secret_config();
        providers.insert("postgres".to_string(), ProviderConfig::new("rds"));

        let err = ProviderRegistry::from_config(&providers).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownKind {
                name: "postgres".to_string(),
                kind: "rds".to_string(),
            }
        );
    }

    #[test]
    fn test_failed_load_inserts_nothing() {
        let mut registry = ProviderRegistry::new();
        let mut providers = secret_config();
        providers.insert("postgres".to_string(), ProviderConfig::new("rds"));

        assert!(registry.load(&providers).is_err());
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_register_custom_kind() {
        let mut registry = ProviderRegistry::new();
        registry.register_kind("short-secret", |_, _| {
            Ok(Arc::new(SecretProvider::new("TOKEN", 8)) as Arc<dyn AddonProvider>)
        });

        let mut providers = HashMap::new();
        providers.insert("token".to_string(), ProviderConfig::new("short-secret"));
        registry.load(&providers).unwrap();

        assert!(registry.contains("token"));
    }
}
