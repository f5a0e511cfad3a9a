//! Argument validation against a tool's input schema
//!
//! Schemas are compiled with `jsonschema` once, when the tool is registered,
//! so a malformed schema is a startup failure rather than a per-call one.

use std::fmt;

use serde_json::Value;

use crate::error::{GoogleMcpError, Result};

/// Maximum number of violations listed in one error message.
const MAX_REPORTED_ERRORS: usize = 5;

/// A compiled input schema.
///
/// # Examples
///
/// ```
/// use google_mcp::tools::schema::ArgumentValidator;
/// use serde_json::json;
///
/// let validator = ArgumentValidator::compile(&json!({
///     "type": "object",
///     "properties": {"query": {"type": "string"}},
///     "required": ["query"]
/// }))
/// .unwrap();
/// assert!(validator.validate(&json!({"query": "budget"})).is_ok());
/// assert!(validator.validate(&json!({})).is_err());
/// ```
pub struct ArgumentValidator {
    validator: jsonschema::Validator,
}

impl fmt::Debug for ArgumentValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentValidator").finish_non_exhaustive()
    }
}

impl ArgumentValidator {
    /// Compiles `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleMcpError::Config`] when `schema` is not a valid JSON
    /// Schema.
    pub fn compile(schema: &Value) -> Result<Self> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| GoogleMcpError::Config(format!("invalid input schema: {e}")))?;
        Ok(Self { validator })
    }

    /// Validates `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleMcpError::InvalidArguments`] listing the first few
    /// violations.
    pub fn validate(&self, arguments: &Value) -> Result<()> {
        if self.validator.is_valid(arguments) {
            return Ok(());
        }

        let message = self
            .validator
            .iter_errors(arguments)
            .take(MAX_REPORTED_ERRORS)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(GoogleMcpError::InvalidArguments(message).into())
    }
}
