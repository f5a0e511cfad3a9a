//! Tool registry
//!
//! A static name → [`ToolDescriptor`] table built once at startup and shared
//! read-only (behind an `Arc`) by the dispatch runtime. Each tool's input
//! schema is compiled when it is registered.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use super::schema::ArgumentValidator;
use super::{ToolDefinition, ToolDescriptor};
use crate::error::{GoogleMcpError, Result};

#[derive(Debug)]
struct RegisteredTool {
    descriptor: ToolDescriptor,
    validator: ArgumentValidator,
}

/// Tool registry for the dispatch runtime
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    ///
    /// # Errors
    ///
    /// Returns [`GoogleMcpError::Config`] when a tool with the same name is
    /// already registered or its input schema does not compile. Both are
    /// startup failures.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(GoogleMcpError::Config(format!(
                "tool '{}' registered twice",
                descriptor.name
            ))
            .into());
        }
        let validator = ArgumentValidator::compile(&descriptor.input_schema).map_err(|e| {
            GoogleMcpError::Config(format!("tool '{}': {e}", descriptor.name))
        })?;
        tracing::debug!(tool = %descriptor.name, "Registered tool");
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                descriptor,
                validator,
            },
        );
        Ok(())
    }

    /// Look up a tool by name
    ///
    /// # Errors
    ///
    /// Returns [`GoogleMcpError::UnknownTool`] when no tool has that name.
    pub fn resolve(&self, name: &str) -> Result<&ToolDescriptor> {
        self.entry(name).map(|tool| &tool.descriptor)
    }

    /// Validates `arguments` against the compiled schema of tool `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleMcpError::UnknownTool`] for an unregistered name and
    /// [`GoogleMcpError::InvalidArguments`] when validation fails.
    pub fn check_arguments(&self, name: &str, arguments: &Value) -> Result<()> {
        self.entry(name)?.validator.validate(arguments)
    }

    fn entry(&self, name: &str) -> Result<&RegisteredTool> {
        self.tools
            .get(name)
            .ok_or_else(|| GoogleMcpError::UnknownTool(name.to_string()).into())
    }

    /// Union of every registered tool's scopes.
    ///
    /// This is the fixed set requested during interactive authorization.
    pub fn required_scopes(&self) -> BTreeSet<String> {
        self.tools
            .values()
            .flat_map(|tool| tool.descriptor.required_scopes.iter().cloned())
            .collect()
    }

    /// All descriptors, sorted by name.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut descriptors: Vec<_> = self.tools.values().map(|tool| &tool.descriptor).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Wire definitions for `tools/list`, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.descriptors()
            .into_iter()
            .map(ToolDescriptor::definition)
            .collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credential;
    use crate::error::{kind_of, ErrorKind};
    use crate::tools::ToolHandler;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl ToolHandler for Noop {
        async fn invoke(
            &self,
            _arguments: serde_json::Value,
            _credential: &Credential,
        ) -> crate::error::Result<serde_json::Value> {
            Ok(json!(null))
        }
    }

    fn tool(name: &str, scopes: &[&str]) -> ToolDescriptor {
        ToolDescriptor::new(
            name,
            "test tool",
            json!({"type": "object"}),
            scopes.iter().copied(),
            Arc::new(Noop),
        )
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("b", &["s1"])).unwrap();
        registry.register(tool("a", &["s2"])).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("a").unwrap().name, "a");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("a", &[])).unwrap();
        let err = registry.register(tool("a", &[])).unwrap_err();
        assert!(err.to_string().contains("registered twice"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_schema_fails_registration() {
        let mut registry = ToolRegistry::new();
        let err = registry
            .register(ToolDescriptor::new(
                "broken",
                "bad schema",
                json!({"type": "not-a-type"}),
                Vec::<String>::new(),
                Arc::new(Noop),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_check_arguments_uses_compiled_schema() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::new(
                "rows",
                "takes rows",
                json!({
                    "type": "object",
                    "properties": {"values": {"type": "array", "items": {"type": "array"}}},
                    "required": ["values"]
                }),
                Vec::<String>::new(),
                Arc::new(Noop),
            ))
            .unwrap();

        assert!(registry.check_arguments("rows", &json!({"values": [[1, 2]]})).is_ok());
        let err = registry
            .check_arguments("rows", &json!({"values": [1, 2]}))
            .unwrap_err();
        assert_eq!(kind_of(&err), ErrorKind::InvalidArguments);
        let err = registry.check_arguments("missing", &json!({})).unwrap_err();
        assert_eq!(kind_of(&err), ErrorKind::UnknownTool);
    }

    #[test]
    fn test_resolve_unknown_tool() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        let err = registry.resolve("missing").unwrap_err();
        assert_eq!(kind_of(&err), ErrorKind::UnknownTool);
    }

    #[test]
    fn test_required_scopes_is_union() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("a", &["s1", "s2"])).unwrap();
        registry.register(tool("b", &["s2", "s3"])).unwrap();

        let scopes: Vec<_> = registry.required_scopes().into_iter().collect();
        assert_eq!(scopes, vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_definitions_sorted_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("zeta", &[])).unwrap();
        registry.register(tool("alpha", &[])).unwrap();

        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
