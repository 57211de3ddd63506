//! Schema Registry
//!
//! Holds parsed schema documents indexed by identifier. Every cross-reference
//! (`knownValues` entries and `ref` targets) is resolved while loading, so a
//! registry that exists is a registry whose references are all satisfied.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, SchemaError};
use crate::schema::{
    FieldSpec, FieldType, SchemaDocument, SchemaKind, CREATED_AT, DISCRIMINATOR,
};

const MAX_ID_LEN: usize = 317;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z][a-zA-Z0-9-]*(\.[a-zA-Z][a-zA-Z0-9-]*)*$")
            .expect("identifier pattern is valid")
    })
}

/// Whether `id` is an acceptable schema identifier
pub fn is_valid_identifier(id: &str) -> bool {
    id.len() <= MAX_ID_LEN && identifier_pattern().is_match(id)
}

/// Read-only set of schema definitions
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, SchemaDocument>,
}

impl SchemaRegistry {
    /// Build a registry from a set of documents
    ///
    /// Fails on the first duplicate identifier, malformed document or
    /// unresolvable reference.
    pub fn load(documents: impl IntoIterator<Item = SchemaDocument>) -> Result<Self> {
        let mut schemas: HashMap<String, SchemaDocument> = HashMap::new();

        for mut doc in documents {
            if !is_valid_identifier(&doc.id) {
                return Err(SchemaError::InvalidIdentifier { id: doc.id });
            }
            if schemas.contains_key(&doc.id) {
                return Err(SchemaError::SchemaConflict { id: doc.id });
            }
            normalize(&mut doc)?;
            schemas.insert(doc.id.clone(), doc);
        }

        let registry = Self { schemas };
        for doc in registry.schemas.values() {
            for (name, spec) in &doc.fields {
                registry.check_field(doc, name, spec)?;
            }
        }

        tracing::debug!(schemas = registry.schemas.len(), "schema registry loaded");
        Ok(registry)
    }

    /// Look up a schema by identifier
    pub fn resolve(&self, id: &str) -> Result<&SchemaDocument> {
        self.schemas
            .get(id)
            .ok_or_else(|| SchemaError::UnknownSchema { id: id.to_string() })
    }

    pub fn get(&self, id: &str) -> Option<&SchemaDocument> {
        self.schemas.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.schemas.contains_key(id)
    }

    /// Expand a field's `knownValues` into the set of accepted values
    ///
    /// Each referenced token contributes its identifier and, when it declares
    /// one, its symbol as an alias. Returns an empty set when the field
    /// declares no known values.
    pub fn resolve_known_values(&self, spec: &FieldSpec) -> Result<BTreeSet<String>> {
        let Some(references) = &spec.known_values else {
            return Ok(BTreeSet::new());
        };

        let mut allowed = BTreeSet::new();
        for reference in references {
            let token = self.schemas.get(reference).ok_or_else(|| {
                SchemaError::UnknownReference {
                    schema: String::new(),
                    path: String::new(),
                    reference: reference.clone(),
                }
            })?;
            if token.kind != SchemaKind::Token {
                return Err(SchemaError::InvalidReference {
                    schema: String::new(),
                    path: String::new(),
                    reference: reference.clone(),
                    expected: SchemaKind::Token.as_str().to_string(),
                    found: token.kind.as_str().to_string(),
                });
            }
            allowed.insert(token.id.clone());
            allowed.insert(token.token_symbol().to_string());
        }
        Ok(allowed)
    }

    /// All identifiers, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// All documents of one kind, sorted by identifier
    pub fn by_kind(&self, kind: SchemaKind) -> Vec<&SchemaDocument> {
        let mut docs: Vec<_> = self.schemas.values().filter(|d| d.kind == kind).collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Structural and referential checks for one field, recursing into nested specs
    fn check_field(&self, doc: &SchemaDocument, path: &str, spec: &FieldSpec) -> Result<()> {
        let invalid = |msg: &str| SchemaError::InvalidFormat(format!("{} at {}: {}", doc.id, path, msg));

        if spec.field_type != FieldType::Ref && spec.reference.is_some() {
            return Err(invalid("only ref fields may name a ref target"));
        }
        if spec.field_type != FieldType::Array && spec.items.is_some() {
            return Err(invalid("only array fields may declare items"));
        }
        if spec.field_type != FieldType::Object && spec.fields.is_some() {
            return Err(invalid("only object fields may declare nested fields"));
        }
        if spec.known_values.is_some() && spec.field_type != FieldType::String {
            return Err(invalid("knownValues requires a string field"));
        }
        if let (Some(min), Some(max)) = (spec.min_length, spec.max_length) {
            if min > max {
                return Err(invalid("minLength exceeds maxLength"));
            }
        }
        if let (Some(min), Some(max)) = (spec.minimum, spec.maximum) {
            if min > max {
                return Err(invalid("minimum exceeds maximum"));
            }
        }

        if let Some(references) = &spec.known_values {
            for reference in references {
                self.expect_kind(doc, path, reference, |k| k == SchemaKind::Token, "token")?;
            }
        }

        match spec.field_type {
            FieldType::Array => {
                let items = spec
                    .items
                    .as_deref()
                    .ok_or_else(|| invalid("array fields must declare items"))?;
                self.check_field(doc, &format!("{}[]", path), items)
            }
            FieldType::Object => {
                for (name, nested) in spec.fields.iter().flatten() {
                    self.check_field(doc, &format!("{}.{}", path, name), nested)?;
                }
                Ok(())
            }
            FieldType::Ref => {
                let target = spec
                    .reference
                    .as_deref()
                    .ok_or_else(|| invalid("ref fields must name a target"))?;
                // records may be embedded by shape, tokens never
                self.expect_kind(
                    doc,
                    path,
                    target,
                    |k| matches!(k, SchemaKind::Object | SchemaKind::Record),
                    "object",
                )
            }
            _ => Ok(()),
        }
    }

    fn expect_kind(
        &self,
        doc: &SchemaDocument,
        path: &str,
        reference: &str,
        accept: impl Fn(SchemaKind) -> bool,
        expected: &str,
    ) -> Result<()> {
        let target = self.schemas.get(reference).ok_or_else(|| SchemaError::UnknownReference {
            schema: doc.id.clone(),
            path: path.to_string(),
            reference: reference.to_string(),
        })?;
        if !accept(target.kind) {
            return Err(SchemaError::InvalidReference {
                schema: doc.id.clone(),
                path: path.to_string(),
                reference: reference.to_string(),
                expected: expected.to_string(),
                found: target.kind.as_str().to_string(),
            });
        }
        Ok(())
    }
}

/// Per-document checks that need no other document
fn normalize(doc: &mut SchemaDocument) -> Result<()> {
    let invalid = |msg: String| SchemaError::InvalidFormat(format!("{}: {}", doc.id, msg));

    if doc.kind == SchemaKind::Token {
        if !doc.fields.is_empty() {
            return Err(invalid("tokens cannot declare fields".to_string()));
        }
        return Ok(());
    }
    if doc.symbol.is_some() {
        return Err(invalid("only tokens may declare a symbol".to_string()));
    }
    if doc.fields.contains_key(DISCRIMINATOR) {
        return Err(invalid(format!("{} is reserved", DISCRIMINATOR)));
    }

    if doc.kind == SchemaKind::Record {
        match doc.fields.get(CREATED_AT) {
            Some(spec) if spec.field_type != FieldType::Timestamp => {
                return Err(invalid(format!("{} must be a timestamp", CREATED_AT)));
            }
            Some(_) => {}
            None => {
                doc.fields.insert(
                    CREATED_AT.to_string(),
                    FieldSpec::timestamp()
                        .required()
                        .describe("Client-declared creation time"),
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat_tokens() -> Vec<SchemaDocument> {
        ["eating", "zoomies", "playing", "sleeping"]
            .iter()
            .map(|s| SchemaDocument::token(format!("com.ffion.{}", s), *s).with_symbol(*s))
            .collect()
    }

    fn status_schema() -> SchemaDocument {
        SchemaDocument::record(
            "com.ffion.status",
            [
                (
                    "state",
                    FieldSpec::string().required().known_values([
                        "com.ffion.eating",
                        "com.ffion.zoomies",
                        "com.ffion.playing",
                        "com.ffion.sleeping",
                    ]),
                ),
                ("text", FieldSpec::string()),
            ],
        )
    }

    #[test]
    fn test_load_and_resolve() {
        let mut docs = cat_tokens();
        docs.push(status_schema());
        let registry = SchemaRegistry::load(docs).unwrap();

        assert_eq!(registry.len(), 5);
        let status = registry.resolve("com.ffion.status").unwrap();
        assert_eq!(status.kind, SchemaKind::Record);
        assert!(registry.resolve("com.ffion.nap").is_err());
    }

    #[test]
    fn test_duplicate_id_conflicts() {
        let docs = vec![
            SchemaDocument::token("sleepingToken", "a"),
            SchemaDocument::token("sleepingToken", "b"),
        ];
        match SchemaRegistry::load(docs) {
            Err(SchemaError::SchemaConflict { id }) => assert_eq!(id, "sleepingToken"),
            other => panic!("Expected SchemaConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_known_value_fails_at_load() {
        let docs = vec![status_schema()];
        match SchemaRegistry::load(docs) {
            Err(SchemaError::UnknownReference { schema, path, reference }) => {
                assert_eq!(schema, "com.ffion.status");
                assert_eq!(path, "state");
                assert_eq!(reference, "com.ffion.eating");
            }
            other => panic!("Expected UnknownReference, got {:?}", other),
        }
    }

    #[test]
    fn test_known_value_must_be_token() {
        let docs = vec![
            SchemaDocument::record("com.ffion.other", Vec::<(String, FieldSpec)>::new()),
            SchemaDocument::record(
                "com.ffion.bad",
                [("state", FieldSpec::string().known_values(["com.ffion.other"]))],
            ),
        ];
        assert!(matches!(
            SchemaRegistry::load(docs),
            Err(SchemaError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_ref_to_token_rejected() {
        let docs = vec![
            SchemaDocument::token("com.ffion.sleeping", "Asleep"),
            SchemaDocument::record(
                "com.ffion.bad",
                [("nested", FieldSpec::reference("com.ffion.sleeping"))],
            ),
        ];
        assert!(matches!(
            SchemaRegistry::load(docs),
            Err(SchemaError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_nested_references_checked() {
        let docs = vec![SchemaDocument::record(
            "com.ffion.album",
            [(
                "photos",
                FieldSpec::array(FieldSpec::reference("com.ffion.missing")),
            )],
        )];
        match SchemaRegistry::load(docs) {
            Err(SchemaError::UnknownReference { path, .. }) => assert_eq!(path, "photos[]"),
            other => panic!("Expected UnknownReference, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_known_values_accepts_ids_and_symbols() {
        let mut docs = cat_tokens();
        docs.push(SchemaDocument::token("sleepingToken", "bare token"));
        let registry = SchemaRegistry::load(docs).unwrap();

        let spec = FieldSpec::string().known_values(["com.ffion.sleeping", "sleepingToken"]);
        let values = registry.resolve_known_values(&spec).unwrap();
        assert_eq!(
            values.into_iter().collect::<Vec<_>>(),
            vec![
                "com.ffion.sleeping".to_string(),
                "sleeping".to_string(),
                "sleepingToken".to_string(),
            ]
        );

        let missing = FieldSpec::string().known_values(["com.ffion.napping"]);
        assert!(matches!(
            registry.resolve_known_values(&missing),
            Err(SchemaError::UnknownReference { .. })
        ));

        assert!(registry.resolve_known_values(&FieldSpec::string()).unwrap().is_empty());
    }

    #[test]
    fn test_records_get_created_at() {
        let registry = SchemaRegistry::load(vec![SchemaDocument::record(
            "note",
            [("text", FieldSpec::string())],
        )])
        .unwrap();
        let spec = &registry.resolve("note").unwrap().fields[CREATED_AT];
        assert_eq!(spec.field_type, FieldType::Timestamp);
        assert!(spec.required);
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(is_valid_identifier("com.ffion.status"));
        assert!(is_valid_identifier("sleepingToken"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("com..status"));
        assert!(!is_valid_identifier("1status"));
        assert!(!is_valid_identifier("com/ffion"));

        let result = SchemaRegistry::load(vec![SchemaDocument::token("bad id", "")]);
        assert!(matches!(result, Err(SchemaError::InvalidIdentifier { .. })));
    }

    #[test]
    fn test_malformed_fields_rejected() {
        let mut no_items = FieldSpec::new(FieldType::Array);
        no_items.required = true;
        let docs = vec![SchemaDocument::record("list", [("xs", no_items)])];
        assert!(matches!(SchemaRegistry::load(docs), Err(SchemaError::InvalidFormat(_))));

        let docs = vec![SchemaDocument::record(
            "flags",
            [("on", FieldSpec::boolean().known_values(["x"]))],
        )];
        assert!(matches!(SchemaRegistry::load(docs), Err(SchemaError::InvalidFormat(_))));

        let mut token = SchemaDocument::token("tok", "");
        token.fields.insert("x".to_string(), FieldSpec::string());
        assert!(matches!(SchemaRegistry::load(vec![token]), Err(SchemaError::InvalidFormat(_))));
    }
}
