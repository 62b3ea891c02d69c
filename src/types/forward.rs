//! Forward references and the local tool/resource descriptors they produce

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::labels::{Labels, LabelsAware};

/// `type` of a tool proxied from a forward
pub const REMOTE_TOOL_TYPE: &str = "mcp-remote-tool";

/// `type` of a resource proxied from a forward
pub const REMOTE_RESOURCE_TYPE: &str = "mcp-remote-resource";

/// A persisted pointer to a remote MCP server whose tools/resources are proxied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardReference {
    /// Repository id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Forward name
    pub name: String,
    /// Namespace the forward's tools/resources are exposed under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Remote endpoint URL
    pub address: String,
    /// Metadata labels
    #[serde(default)]
    pub labels: Labels,
}

impl ForwardReference {
    /// Create a forward reference
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            namespace: None,
            address: address.into(),
            labels: Labels::new(),
        }
    }

    /// Set the namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Registry key for this forward
    #[must_use]
    pub fn key(&self) -> NameNamespacePair {
        NameNamespacePair::new(self.name.clone(), self.namespace.clone())
    }
}

impl LabelsAware for ForwardReference {
    fn labels(&self) -> &Labels {
        &self.labels
    }
}

/// (name, namespace) key of a forward binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameNamespacePair {
    /// Forward name
    pub name: String,
    /// Optional namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl NameNamespacePair {
    /// Build a key
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
        }
    }
}

impl fmt::Display for NameNamespacePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Schema property metadata (only string-typed properties survive translation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// JSON type name
    #[serde(rename = "type")]
    pub property_type: String,
    /// Human description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Simplified JSON-schema of a tool's arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Always `object`
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Named properties
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    /// Required property names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl InputSchema {
    /// Translate a remote JSON schema.
    ///
    /// Only properties whose `type` is `string` are carried over; every other
    /// schema type is dropped. `required` is kept as-is.
    #[must_use]
    pub fn from_json_schema(schema: &Value) -> Self {
        let mut input = Self::default();

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                if property.get("type").and_then(Value::as_str) == Some("string") {
                    input.properties.insert(
                        name.clone(),
                        Property {
                            property_type: "string".to_string(),
                            description: property
                                .get("description")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        },
                    );
                }
            }
        }

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            input.required = required
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        input
    }

    /// Render as a JSON schema value
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        json!({
            "type": self.schema_type,
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// Local descriptor of a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolReference {
    /// Repository id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Invocation URI
    #[serde(default)]
    pub uri: String,
    /// Tool kind (`mcp-remote-tool` for forwarded tools)
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Metadata labels
    #[serde(default)]
    pub labels: Labels,
    /// Argument schema
    #[serde(default)]
    pub input_schema: InputSchema,
}

impl LabelsAware for ToolReference {
    fn labels(&self) -> &Labels {
        &self.labels
    }
}

/// Local descriptor of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    /// Repository id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Resource location (URI)
    pub location: String,
    /// Resource kind (`mcp-remote-resource` for forwarded resources)
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Metadata labels
    #[serde(default)]
    pub labels: Labels,
}

impl LabelsAware for ResourceReference {
    fn labels(&self) -> &Labels {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_only_string_properties_survive() {
        let schema = json!({
            "type": "object",
            "properties": {
                "city": {"type": "string", "description": "City name"},
                "days": {"type": "integer"},
                "verbose": {"type": "boolean"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["city", "days"]
        });

        let input = InputSchema::from_json_schema(&schema);
        assert_eq!(input.properties.len(), 1);
        assert_eq!(
            input.properties.get("city"),
            Some(&Property {
                property_type: "string".to_string(),
                description: Some("City name".to_string()),
            })
        );
        assert_eq!(input.required, vec!["city".to_string(), "days".to_string()]);
    }

    #[test]
    fn test_missing_schema_yields_empty_object() {
        let input = InputSchema::from_json_schema(&Value::Null);
        assert_eq!(input, InputSchema::default());
        assert_eq!(input.to_json_schema()["type"], "object");
    }

    #[test]
    fn test_pair_display() {
        assert_eq!(NameNamespacePair::new("a", None).to_string(), "a");
        assert_eq!(
            NameNamespacePair::new("a", Some("ns".into())).to_string(),
            "ns/a"
        );
    }
}
