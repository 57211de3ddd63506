//! Schema documents and field specifications

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Field that names the schema a value claims to conform to
pub const DISCRIMINATOR: &str = "$type";

/// Creation timestamp carried by every record
pub const CREATED_AT: &str = "createdAt";

/// Kind of schema definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    /// Opaque enumerable symbol
    Token,
    /// Shape of values stored in a collection
    Record,
    /// Reusable nested shape, reachable through `ref` fields
    Object,
    /// Query parameters or output
    Query,
    /// Procedure input or output
    Procedure,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Token => "token",
            SchemaKind::Record => "record",
            SchemaKind::Object => "object",
            SchemaKind::Query => "query",
            SchemaKind::Procedure => "procedure",
        }
    }

    /// Whether values of this kind are validated field by field
    pub fn is_shaped(&self) -> bool {
        !matches!(self, SchemaKind::Token)
    }

    /// Whether the top-level value must carry a matching discriminator
    pub fn requires_discriminator(&self) -> bool {
        matches!(self, SchemaKind::Record)
    }
}

/// Primitive kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    /// RFC 3339 date-time string
    Timestamp,
    /// Reference to an uploaded blob
    Blob,
    Array,
    /// Inline nested object
    Object,
    /// Nested object whose shape is another schema
    Ref,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
            FieldType::Blob => "blob",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Ref => "ref",
        }
    }
}

/// Specification of a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Token identifiers the value must belong to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_values: Option<Vec<String>>,

    /// Element specification for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSpec>>,

    /// Nested fields for inline objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, FieldSpec>>,

    /// Target schema for `ref` fields
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Reject undeclared fields of an inline object
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub closed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            description: None,
            known_values: None,
            items: None,
            fields: None,
            reference: None,
            closed: false,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn timestamp() -> Self {
        Self::new(FieldType::Timestamp)
    }

    pub fn blob() -> Self {
        Self::new(FieldType::Blob)
    }

    pub fn array(items: FieldSpec) -> Self {
        let mut spec = Self::new(FieldType::Array);
        spec.items = Some(Box::new(items));
        spec
    }

    pub fn object(fields: impl IntoIterator<Item = (impl Into<String>, FieldSpec)>) -> Self {
        let mut spec = Self::new(FieldType::Object);
        spec.fields = Some(fields.into_iter().map(|(k, v)| (k.into(), v)).collect());
        spec
    }

    pub fn reference(target: impl Into<String>) -> Self {
        let mut spec = Self::new(FieldType::Ref);
        spec.reference = Some(target.into());
        spec
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    pub fn known_values(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.known_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn range(mut self, minimum: Option<i64>, maximum: Option<i64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A single schema document, as loaded from disk or built in code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    /// Globally unique identifier (e.g., "com.ffion.status")
    pub id: String,
    pub kind: SchemaKind,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    /// Value a token stands for in `knownValues` sets; defaults to the id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Reject undeclared top-level fields
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub closed: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldSpec>,
}

impl SchemaDocument {
    pub fn new(id: impl Into<String>, kind: SchemaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            description: String::new(),
            version: None,
            symbol: None,
            closed: false,
            fields: BTreeMap::new(),
        }
    }

    /// Create a token definition
    pub fn token(id: impl Into<String>, description: impl Into<String>) -> Self {
        let mut doc = Self::new(id, SchemaKind::Token);
        doc.description = description.into();
        doc
    }

    /// Create a record definition
    pub fn record(
        id: impl Into<String>,
        fields: impl IntoIterator<Item = (impl Into<String>, FieldSpec)>,
    ) -> Self {
        Self::new(id, SchemaKind::Record).with_fields(fields)
    }

    /// Create a reusable object definition
    pub fn object(
        id: impl Into<String>,
        fields: impl IntoIterator<Item = (impl Into<String>, FieldSpec)>,
    ) -> Self {
        Self::new(id, SchemaKind::Object).with_fields(fields)
    }

    pub fn with_fields(
        mut self,
        fields: impl IntoIterator<Item = (impl Into<String>, FieldSpec)>,
    ) -> Self {
        self.fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    /// Parse a document from a JSON value
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a document from JSON text
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Symbol used when this document appears in a `knownValues` set
    pub fn token_symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_record_document() {
        let doc = SchemaDocument::from_json(json!({
            "id": "com.ffion.status",
            "kind": "record",
            "description": "Current state of the cat",
            "version": "1.0.0",
            "fields": {
                "state": {
                    "type": "string",
                    "required": true,
                    "knownValues": ["com.ffion.sleeping"]
                },
                "tags": { "type": "array", "items": { "type": "string" }, "maxLength": 4 }
            }
        }))
        .unwrap();

        assert_eq!(doc.kind, SchemaKind::Record);
        assert_eq!(doc.version, Some(Version::new(1, 0, 0)));
        let state = &doc.fields["state"];
        assert!(state.required);
        assert_eq!(state.known_values.as_deref(), Some(&["com.ffion.sleeping".to_string()][..]));
        let tags = &doc.fields["tags"];
        assert_eq!(tags.items.as_ref().unwrap().field_type, FieldType::String);
        assert_eq!(tags.max_length, Some(4));
    }

    #[test]
    fn test_parse_minimal_token() {
        let doc = SchemaDocument::from_json_str(r#"{"id": "sleepingToken", "kind": "token"}"#).unwrap();
        assert_eq!(doc.kind, SchemaKind::Token);
        assert!(doc.fields.is_empty());
        assert_eq!(doc.token_symbol(), "sleepingToken");
    }

    #[test]
    fn test_token_symbol_override() {
        let doc = SchemaDocument::token("com.ffion.sleeping", "Asleep").with_symbol("sleeping");
        assert_eq!(doc.token_symbol(), "sleeping");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result = SchemaDocument::from_json(json!({"id": "x", "kind": "subscription"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_ref_field_serializes_as_ref() {
        let spec = FieldSpec::reference("com.ffion.image");
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value, json!({"type": "ref", "ref": "com.ffion.image"}));
    }
}
