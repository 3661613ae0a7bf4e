//! Record types for the metadata and instance store.
//!
//! Design goals:
//! - Small, serializable structures that cross the store boundary by value.
//! - Property bags are JSON maps so scripts and wire formats share one shape.
//! - Minimal helpers to keep this file focused on data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema metadata for a class of objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectType {
    /// Opaque identifier.
    pub id: String,
    /// Stable machine-facing name used by scripts and queries.
    pub api_name: String,
    /// Human-readable name for display surfaces.
    pub display_name: String,
    /// Optional free-form description.
    pub description: Option<String>,
}

/// Schema metadata for a class of links between two object types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkType {
    pub id: String,
    pub api_name: String,
    pub display_name: String,
    /// Object type on the outgoing side of the link.
    pub source_type_id: String,
    /// Object type on the incoming side of the link.
    pub target_type_id: String,
}

/// One stored object instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectRecord {
    pub id: String,
    pub type_id: String,
    /// JSON object mapping property api-names to values.
    pub properties: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored link row between two objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkRecord {
    pub id: String,
    pub link_type_id: String,
    pub source_id: String,
    pub target_id: String,
    /// Properties carried by the link itself, not its endpoints.
    pub properties: Value,
    pub created_at: DateTime<Utc>,
}

/// A stored user function, read-only from the execution subsystem's side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub id: String,
    pub api_name: String,
    pub script_body: String,
    /// JSON schema describing the expected invocation context, if declared.
    pub input_schema: Option<Value>,
    /// Declared output type name, if any.
    pub output_type: Option<String>,
}

/// Traversal direction for link queries relative to an origin object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Outgoing,
    Incoming,
    Both,
}

impl LinkDirection {
    /// Parses the direction names accepted at the script boundary.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "outgoing" => Some(LinkDirection::Outgoing),
            "incoming" => Some(LinkDirection::Incoming),
            "both" => Some(LinkDirection::Both),
            _ => None,
        }
    }
}

impl ObjectRecord {
    /// Returns a property value by api-name, if present.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.as_object().and_then(|m| m.get(name))
    }
}
