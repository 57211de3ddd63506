//! Record validation
//!
//! Recursive descent over a schema's field specifications. Validation is a
//! pure function of the registry, the schema identifier and the value; the
//! first violated rule is returned together with the path of the offending
//! field. Nothing is coerced.
//!
//! Order of checks for a shaped value:
//! 1. discriminator (`$type`) matches the schema identifier
//! 2. every required field is present
//! 3. undeclared fields are rejected when the shape is closed
//! 4. primitive kinds conform
//! 5. `knownValues` membership
//! 6. the same steps for nested objects, refs and array elements

use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SchemaError, ValidationError};
use crate::registry::SchemaRegistry;
use crate::schema::{FieldSpec, FieldType, SchemaDocument, DISCRIMINATOR};

type Outcome = std::result::Result<(), ValidationError>;

/// Root path in validation errors
pub const ROOT: &str = "$";

/// How fields that the schema does not declare are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFields {
    /// Stored as submitted
    #[default]
    Permit,
    /// Rejected with `UnknownField`
    Reject,
}

/// Validates values against schemas held in a registry
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    registry: &'a SchemaRegistry,
    unknown_fields: UnknownFields,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            unknown_fields: UnknownFields::default(),
        }
    }

    pub fn with_unknown_fields(mut self, policy: UnknownFields) -> Self {
        self.unknown_fields = policy;
        self
    }

    /// Validate `value` against the schema named `schema_id`
    pub fn validate(&self, schema_id: &str, value: &Value) -> Outcome {
        let schema = self
            .registry
            .get(schema_id)
            .ok_or_else(|| ValidationError::UnknownSchema {
                path: ROOT.to_string(),
                id: schema_id.to_string(),
            })?;

        if !schema.kind.is_shaped() {
            // a bare token value is its identifier or its symbol
            let allowed: BTreeSet<&str> = [schema.id.as_str(), schema.token_symbol()].into();
            return match value {
                Value::String(s) if allowed.contains(s.as_str()) => Ok(()),
                Value::String(s) => Err(ValidationError::ValueNotAllowed {
                    path: ROOT.to_string(),
                    value: s.clone(),
                    allowed: allowed.into_iter().map(str::to_string).collect(),
                }),
                other => Err(mismatch(ROOT, "string", other)),
            };
        }

        let object = expect_object(ROOT, value)?;
        self.check_discriminator(schema, object, ROOT, schema.kind.requires_discriminator())?;
        self.check_shape(&schema.fields, schema.closed, object, ROOT)
    }

    fn check_discriminator(
        &self,
        schema: &SchemaDocument,
        object: &Map<String, Value>,
        path: &str,
        required: bool,
    ) -> Outcome {
        match object.get(DISCRIMINATOR) {
            Some(Value::String(found)) if *found == schema.id => Ok(()),
            Some(Value::String(found)) => Err(ValidationError::DiscriminatorMismatch {
                path: join(path, DISCRIMINATOR),
                expected: schema.id.clone(),
                found: found.clone(),
            }),
            Some(other) => Err(mismatch(&join(path, DISCRIMINATOR), "string", other)),
            None if required => Err(ValidationError::MissingField {
                path: join(path, DISCRIMINATOR),
            }),
            None => Ok(()),
        }
    }

    fn check_shape(
        &self,
        fields: &BTreeMap<String, FieldSpec>,
        closed: bool,
        object: &Map<String, Value>,
        path: &str,
    ) -> Outcome {
        for (name, spec) in fields {
            if spec.required && !object.contains_key(name) {
                return Err(ValidationError::MissingField {
                    path: join(path, name),
                });
            }
        }

        let reject_unknown = closed || self.unknown_fields == UnknownFields::Reject;
        for (name, value) in object {
            if name == DISCRIMINATOR {
                continue;
            }
            match fields.get(name) {
                Some(spec) => self.check_field(spec, value, &join(path, name))?,
                None if reject_unknown => {
                    return Err(ValidationError::UnknownField {
                        path: join(path, name),
                    })
                }
                None => {}
            }
        }
        Ok(())
    }

    fn check_field(&self, spec: &FieldSpec, value: &Value, path: &str) -> Outcome {
        match spec.field_type {
            FieldType::String => {
                let s = value.as_str().ok_or_else(|| mismatch(path, "string", value))?;
                check_length(spec, s.chars().count(), path)?;
                self.check_known_values(spec, s, path)
            }
            FieldType::Integer => match value.as_i64() {
                Some(n) => check_range(spec, n, path),
                None if value.is_u64() => Err(ValidationError::OutOfRange {
                    path: path.to_string(),
                    reason: "integer exceeds the signed 64-bit range".to_string(),
                }),
                None => Err(mismatch(path, "integer", value)),
            },
            FieldType::Boolean => match value {
                Value::Bool(_) => Ok(()),
                other => Err(mismatch(path, "boolean", other)),
            },
            FieldType::Timestamp => {
                let s = value.as_str().ok_or_else(|| mismatch(path, "timestamp", value))?;
                DateTime::parse_from_rfc3339(s)
                    .map(|_| ())
                    .map_err(|_| ValidationError::TypeMismatch {
                        path: path.to_string(),
                        expected: "timestamp".to_string(),
                        found: format!("{:?}", s),
                    })
            }
            FieldType::Blob => check_blob(value, path),
            FieldType::Array => {
                let items = value.as_array().ok_or_else(|| mismatch(path, "array", value))?;
                check_length(spec, items.len(), path)?;
                let Some(item_spec) = spec.items.as_deref() else {
                    return Ok(());
                };
                for (i, item) in items.iter().enumerate() {
                    self.check_field(item_spec, item, &format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            FieldType::Object => {
                let object = expect_object(path, value)?;
                let empty = BTreeMap::new();
                let fields = spec.fields.as_ref().unwrap_or(&empty);
                self.check_shape(fields, spec.closed, object, path)
            }
            FieldType::Ref => {
                let target_id = spec.reference.as_deref().unwrap_or_default();
                let target = self.registry.get(target_id).ok_or_else(|| {
                    ValidationError::UnknownSchema {
                        path: path.to_string(),
                        id: target_id.to_string(),
                    }
                })?;
                let object = expect_object(path, value)?;
                self.check_discriminator(target, object, path, false)?;
                self.check_shape(&target.fields, target.closed, object, path)
            }
        }
    }

    fn check_known_values(&self, spec: &FieldSpec, value: &str, path: &str) -> Outcome {
        if spec.known_values.is_none() {
            return Ok(());
        }
        let allowed = self.registry.resolve_known_values(spec).map_err(|err| {
            let id = match err {
                SchemaError::UnknownReference { reference, .. }
                | SchemaError::InvalidReference { reference, .. } => reference,
                other => other.to_string(),
            };
            ValidationError::UnknownSchema {
                path: path.to_string(),
                id,
            }
        })?;
        if allowed.contains(value) {
            return Ok(());
        }
        Err(ValidationError::ValueNotAllowed {
            path: path.to_string(),
            value: value.to_string(),
            allowed: allowed.into_iter().collect(),
        })
    }
}

/// Validate with the default unknown-field policy
pub fn validate(registry: &SchemaRegistry, schema_id: &str, value: &Value) -> Outcome {
    Validator::new(registry).validate(schema_id, value)
}

fn check_blob(value: &Value, path: &str) -> Outcome {
    let object = expect_object(path, value)?;
    match object.get(DISCRIMINATOR) {
        Some(Value::String(t)) if t == "blob" => {}
        Some(Value::String(t)) => {
            return Err(ValidationError::DiscriminatorMismatch {
                path: join(path, DISCRIMINATOR),
                expected: "blob".to_string(),
                found: t.clone(),
            })
        }
        Some(other) => return Err(mismatch(&join(path, DISCRIMINATOR), "string", other)),
        None => {
            return Err(ValidationError::MissingField {
                path: join(path, DISCRIMINATOR),
            })
        }
    }

    for name in ["ref", "mimeType"] {
        match object.get(name) {
            Some(Value::String(_)) => {}
            Some(other) => return Err(mismatch(&join(path, name), "string", other)),
            None => return Err(ValidationError::MissingField { path: join(path, name) }),
        }
    }

    match object.get("size") {
        Some(size) if size.is_u64() => Ok(()),
        Some(size) if size.is_i64() => Err(ValidationError::OutOfRange {
            path: join(path, "size"),
            reason: "blob size cannot be negative".to_string(),
        }),
        Some(other) => Err(mismatch(&join(path, "size"), "integer", other)),
        None => Err(ValidationError::MissingField {
            path: join(path, "size"),
        }),
    }
}

fn check_length(spec: &FieldSpec, len: usize, path: &str) -> Outcome {
    if let Some(min) = spec.min_length {
        if len < min {
            return Err(ValidationError::OutOfRange {
                path: path.to_string(),
                reason: format!("length {} is below the minimum of {}", len, min),
            });
        }
    }
    if let Some(max) = spec.max_length {
        if len > max {
            return Err(ValidationError::OutOfRange {
                path: path.to_string(),
                reason: format!("length {} exceeds the maximum of {}", len, max),
            });
        }
    }
    Ok(())
}

fn check_range(spec: &FieldSpec, n: i64, path: &str) -> Outcome {
    if spec.minimum.is_some_and(|min| n < min) || spec.maximum.is_some_and(|max| n > max) {
        return Err(ValidationError::OutOfRange {
            path: path.to_string(),
            reason: format!(
                "{} is outside [{}, {}]",
                n,
                spec.minimum.map_or("-inf".to_string(), |m| m.to_string()),
                spec.maximum.map_or("inf".to_string(), |m| m.to_string()),
            ),
        });
    }
    Ok(())
}

fn expect_object<'v>(path: &str, value: &'v Value) -> Result<&'v Map<String, Value>, ValidationError> {
    value.as_object().ok_or_else(|| mismatch(path, "object", value))
}

fn mismatch(path: &str, expected: &str, found: &Value) -> ValidationError {
    ValidationError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: json_type_name(found).to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, field: &str) -> String {
    if path == ROOT {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}
