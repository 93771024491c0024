//! MCP tool definitions
//!
//! Definitions are derived from the registered operation descriptors, so
//! `tools/list` always matches what `tools/call` will accept.

use crate::gate::{Operation, TOKEN_PARAM};
use crate::handlers::{OperationFamily, OperationRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Tool definition for MCP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// Input schema (JSON Schema)
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDefinition {
    fn from_operation(family: &OperationFamily, op: &Operation) -> Self {
        let mut properties = op.properties.clone();
        let mut description = op.description.to_string();

        if family.is_destructive(op) {
            description.push_str(
                " Requires confirmation: the first call returns a confirmation token; \
                 call again with the same arguments plus confirmation_token to proceed.",
            );
            if let Value::Object(map) = &mut properties {
                map.insert(
                    TOKEN_PARAM.to_string(),
                    json!({
                        "type": "string",
                        "description": "Token from a previous CONFIRMATION REQUIRED response"
                    }),
                );
            }
        }

        Self {
            name: op.name.to_string(),
            description,
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": op.required,
            }),
        }
    }
}

/// Definitions for every registered operation, in registration order
pub fn get_all_tools(registry: &OperationRegistry) -> Vec<ToolDefinition> {
    registry
        .operations()
        .map(|(family, op)| ToolDefinition::from_operation(family, op))
        .collect()
}
