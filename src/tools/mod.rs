//! Tools module for google-mcp
//!
//! This module contains the tool handler interface, the tool registry, and
//! the Google Workspace tool implementations.

pub mod google;
pub mod registry;
pub mod schema;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::Credential;
use crate::error::{GoogleMcpError, Result};

pub use registry::ToolRegistry;

/// Tool handler trait for implementing one remote API operation
///
/// Handlers are black boxes to the dispatch runtime: they receive validated
/// arguments and a credential covering their declared scopes, and return a
/// structured result or fail.
///
/// # Examples
///
/// ```
/// use google_mcp::auth::Credential;
/// use google_mcp::error::Result;
/// use google_mcp::tools::ToolHandler;
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct Echo;
///
/// #[async_trait]
/// impl ToolHandler for Echo {
///     async fn invoke(&self, arguments: Value, _credential: &Credential) -> Result<Value> {
///         Ok(arguments)
///     }
/// }
/// ```
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Executes the tool
    ///
    /// # Errors
    ///
    /// Returns [`GoogleMcpError::InvalidArguments`] for arguments the handler
    /// cannot use and [`GoogleMcpError::Upstream`] when the remote call fails.
    async fn invoke(
        &self,
        arguments: serde_json::Value,
        credential: &Credential,
    ) -> Result<serde_json::Value>;
}

/// A registered tool: name, schema, scopes, and handler.
///
/// Immutable after registration.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Unique tool name
    pub name: String,
    /// Human-readable description shown to the agent
    pub description: String,
    /// JSON schema of the arguments object
    pub input_schema: serde_json::Value,
    /// OAuth scopes the handler needs
    pub required_scopes: BTreeSet<String>,
    /// The implementation
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    /// Creates a descriptor.
    pub fn new<I, S>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        required_scopes: I,
        handler: Arc<dyn ToolHandler>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            required_scopes: required_scopes.into_iter().map(Into::into).collect(),
            handler,
        }
    }

    /// The wire form used in `tools/list`.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("required_scopes", &self.required_scopes)
            .finish_non_exhaustive()
    }
}

/// Tool entry of a `tools/list` result.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Description
    pub description: String,
    /// JSON schema for the arguments
    pub input_schema: serde_json::Value,
}

/// Deserializes tool arguments into a typed parameter struct.
///
/// # Errors
///
/// Returns [`GoogleMcpError::InvalidArguments`] when the arguments do not
/// fit `T`.
pub fn parse_arguments<T: DeserializeOwned>(arguments: serde_json::Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| GoogleMcpError::InvalidArguments(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl ToolHandler for Noop {
        async fn invoke(
            &self,
            _arguments: serde_json::Value,
            _credential: &Credential,
        ) -> Result<serde_json::Value> {
            Ok(json!({}))
        }
    }

    #[test]
    fn test_descriptor_definition_uses_camel_case_schema_key() {
        let descriptor = ToolDescriptor::new(
            "noop",
            "Does nothing",
            json!({"type": "object", "properties": {}}),
            ["scope-a"],
            Arc::new(Noop),
        );
        let value = serde_json::to_value(descriptor.definition()).unwrap();
        assert_eq!(value["name"], "noop");
        assert_eq!(value["inputSchema"]["type"], "object");
        assert!(descriptor.required_scopes.contains("scope-a"));
    }

    #[derive(Debug, Deserialize)]
    struct Params {
        query: String,
    }

    #[test]
    fn test_parse_arguments_maps_to_invalid_arguments() {
        let ok: Params = parse_arguments(json!({"query": "x"})).unwrap();
        assert_eq!(ok.query, "x");

        let err = parse_arguments::<Params>(json!({"query": 5})).unwrap_err();
        assert_eq!(
            crate::error::kind_of(&err),
            crate::error::ErrorKind::InvalidArguments
        );
    }
}
