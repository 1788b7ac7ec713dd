//! Registry module - Procedures callable by remote clients
//!
//! Entries are added and removed by the hosting process. Dispatch only reads;
//! the lock lets registration happen while the server is running.

mod procedure;

pub use procedure::*;

use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Procedure not registered: {0}")]
    NotFound(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Name to procedure mapping
#[derive(Debug, Default)]
pub struct Registry {
    procedures: RwLock<BTreeMap<String, Procedure>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a procedure under its own name, replacing any previous entry
    pub async fn register(&self, procedure: Procedure) {
        let name = procedure.name().to_string();
        self.register_as(name, procedure).await;
    }

    /// Register a procedure under an alias, replacing any previous entry
    pub async fn register_as(&self, name: impl Into<String>, procedure: Procedure) {
        let name = name.into();
        let mut procedures = self.procedures.write().await;
        if procedures.insert(name.clone(), procedure).is_some() {
            tracing::debug!("Replaced procedure '{}'", name);
        } else {
            tracing::debug!("Registered procedure '{}'", name);
        }
    }

    /// Remove the entry for `name`
    pub async fn unregister(&self, name: &str) -> RegistryResult<Procedure> {
        let mut procedures = self.procedures.write().await;
        let procedure = procedures
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        tracing::debug!("Unregistered procedure '{}'", name);
        Ok(procedure)
    }

    /// Remove the entry registered under the procedure's own name
    pub async fn unregister_procedure(&self, procedure: &Procedure) -> RegistryResult<Procedure> {
        self.unregister(procedure.name()).await
    }

    /// Look up a procedure by name
    pub async fn resolve(&self, name: &str) -> Option<Procedure> {
        self.procedures.read().await.get(name).cloned()
    }

    /// One `name(params)` descriptor per entry, ordered by name
    pub async fn list_signatures(&self) -> Vec<String> {
        let procedures = self.procedures.read().await;
        procedures
            .iter()
            .map(|(name, procedure)| procedure.signature(name))
            .collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.procedures.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.procedures.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.procedures.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn echo() -> Procedure {
        Procedure::new("echo", |args| Ok(json!(args.iter().collect::<Vec<_>>()))).param("text")
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = Registry::new();
        assert!(registry.is_empty().await);

        registry.register(echo()).await;
        let procedure = registry.resolve("echo").await.unwrap();
        assert_eq!(procedure.call(&["hi".to_string()]), Ok(json!(["hi"])));
        assert!(registry.resolve("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let registry = Registry::new();
        registry.register(echo()).await;
        registry
            .register(Procedure::new("echo", |_| Ok(json!("replaced"))))
            .await;

        assert_eq!(registry.len().await, 1);
        let procedure = registry.resolve("echo").await.unwrap();
        assert_eq!(procedure.call(&[]), Ok(json!("replaced")));
    }

    #[tokio::test]
    async fn test_reregistering_same_procedure_is_idempotent() {
        let registry = Registry::new();
        let procedure = echo();
        registry.register(procedure.clone()).await;
        let before = registry.list_signatures().await;
        registry.register(procedure).await;

        assert_eq!(registry.list_signatures().await, before);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_alias() {
        let registry = Registry::new();
        registry.register_as("say", echo()).await;

        assert!(registry.contains("say").await);
        assert!(!registry.contains("echo").await);
        assert_eq!(registry.list_signatures().await, vec!["say(text)".to_string()]);
    }

    #[tokio::test]
    async fn test_unregister_missing_leaves_registry_untouched() {
        let registry = Registry::new();
        registry.register(echo()).await;

        assert_eq!(
            registry.unregister("nope").await.unwrap_err(),
            RegistryError::NotFound("nope".to_string())
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_by_procedure() {
        let registry = Registry::new();
        let procedure = echo();
        registry.register(procedure.clone()).await;

        registry.unregister_procedure(&procedure).await.unwrap();
        assert!(registry.is_empty().await);
        assert!(registry.unregister_procedure(&procedure).await.is_err());
    }

    #[tokio::test]
    async fn test_signatures_track_registrations() {
        let registry = Registry::new();
        registry.register(echo()).await;
        registry
            .register(
                Procedure::new("add", |_| Ok(Value::Null))
                    .param("x")
                    .param("y"),
            )
            .await;

        assert_eq!(
            registry.list_signatures().await,
            vec!["add(x, y)".to_string(), "echo(text)".to_string()]
        );
    }
}
