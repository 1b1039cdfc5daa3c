//! Procedure registry for the procedural tier.
//!
//! Procedures are named, statically-typed strategy implementations. The
//! procedural tier stores only the symbolic name, so a snapshot carries a
//! string reference instead of an executable value.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// A named strategy an agent can invoke through the procedural tier
#[async_trait]
pub trait Procedure: Send + Sync {
    /// Run the procedure with a JSON input
    async fn run(&self, input: serde_json::Value) -> Result<serde_json::Value>;
}

/// Registry of available procedures, indexed by symbolic name.
///
/// The procedural memory tier resolves its stored references against this
/// registry at call time.
#[derive(Default, Clone)]
pub struct ProcedureRegistry {
    procedures: HashMap<String, Arc<dyn Procedure>>,
}

impl ProcedureRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            procedures: HashMap::new(),
        }
    }

    /// Register a procedure under the given name.
    ///
    /// If a procedure with this name already exists, it is replaced.
    pub fn register(&mut self, name: impl Into<String>, procedure: Arc<dyn Procedure>) {
        self.procedures.insert(name.into(), procedure);
    }

    /// Look up a procedure by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Procedure>> {
        self.procedures.get(name).cloned()
    }

    /// Whether a name resolves in this registry
    pub fn contains(&self, name: &str) -> bool {
        self.procedures.contains_key(name)
    }

    /// List all registered procedure names
    pub fn list_names(&self) -> Vec<&str> {
        self.procedures.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Procedure for Echo {
        async fn run(&self, input: serde_json::Value) -> Result<serde_json::Value> {
            Ok(input)
        }
    }

    #[tokio::test]
    async fn registered_procedure_resolves_and_runs() {
        let mut registry = ProcedureRegistry::new();
        registry.register("echo", Arc::new(Echo));

        assert!(registry.contains("echo"));
        assert!(!registry.contains("missing"));

        let procedure = registry.get("echo").unwrap();
        let out = procedure.run(serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(out, serde_json::json!({"x": 1}));
    }

    #[test]
    fn re_registering_replaces() {
        let mut registry = ProcedureRegistry::new();
        registry.register("echo", Arc::new(Echo));
        registry.register("echo", Arc::new(Echo));
        assert_eq!(registry.list_names().len(), 1);
    }
}
