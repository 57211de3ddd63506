//! Record Repository
//!
//! Owns the mapping from (collection, key) to stored record. Every write is
//! validated against the schema named by its collection before a key is
//! allocated; rejected writes leave no trace, not even a consumed key.
//!
//! Each collection has its own lock. Allocating a key and inserting the record
//! happen under that collection's write lock, so a reader either sees a record
//! with its full value or does not see its key at all, and insertion order
//! within a collection always matches key order.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RepoConfig;
use crate::error::{RepoError, RepoResult};
use crate::fingerprint::Fingerprint;
use crate::registry::SchemaRegistry;
use crate::schema::{SchemaKind, CREATED_AT, DISCRIMINATOR};
use crate::tid::{Key, KeyGenerator};
use crate::uri::{RecordUri, DEFAULT_SCHEME};
use crate::validator::{UnknownFields, Validator};

/// A validated record as held by its collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub uri: RecordUri,
    pub key: Key,
    pub fingerprint: Fingerprint,
    pub value: Value,
}

/// One page of a collection listing, newest first
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<StoredRecord>,
    /// Pass back to `list_page` to continue below the last returned key
    pub cursor: Option<Key>,
}

/// Repository behaviour knobs
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    pub identity: String,
    pub uri_scheme: String,
    pub clock_id: u16,
    pub default_limit: usize,
    pub max_limit: usize,
    pub unknown_fields: UnknownFields,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self::from(&RepoConfig::default())
    }
}

impl From<&RepoConfig> for RepositoryOptions {
    fn from(config: &RepoConfig) -> Self {
        Self {
            identity: config.repository.identity.clone(),
            uri_scheme: config.repository.uri_scheme.clone(),
            clock_id: config.repository.clock_id,
            default_limit: config.listing.default_limit,
            max_limit: config.listing.max_limit,
            unknown_fields: config.validation.unknown_fields,
        }
    }
}

impl RepositoryOptions {
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }
}

type Collection = Arc<RwLock<BTreeMap<Key, StoredRecord>>>;

/// In-memory, schema-governed record store
pub struct RecordRepository {
    registry: Arc<SchemaRegistry>,
    keys: KeyGenerator,
    options: RepositoryOptions,
    collections: RwLock<HashMap<String, Collection>>,
}

impl RecordRepository {
    pub fn new(registry: Arc<SchemaRegistry>, options: RepositoryOptions) -> Self {
        let keys = KeyGenerator::new(options.clock_id);
        Self::with_key_generator(registry, options, keys)
    }

    /// Build a repository around an existing key generator
    pub fn with_key_generator(
        registry: Arc<SchemaRegistry>,
        mut options: RepositoryOptions,
        keys: KeyGenerator,
    ) -> Self {
        if options.uri_scheme.is_empty() {
            options.uri_scheme = DEFAULT_SCHEME.to_string();
        }
        options.clock_id = keys.clock_id();
        Self {
            registry,
            keys,
            options,
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn identity(&self) -> &str {
        &self.options.identity
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// Validate and store a new record in `collection`
    ///
    /// `$type` defaults to the collection and `createdAt` to the current time
    /// when the value does not carry them.
    pub fn create(&self, collection: &str, mut value: Value) -> RepoResult<StoredRecord> {
        self.expect_collection(collection)?;

        if let Some(object) = value.as_object_mut() {
            object
                .entry(DISCRIMINATOR)
                .or_insert_with(|| Value::String(collection.to_string()));
            object.entry(CREATED_AT).or_insert_with(|| {
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
            });
        }

        Validator::new(&self.registry)
            .with_unknown_fields(self.options.unknown_fields)
            .validate(collection, &value)
            .map_err(|err| {
                tracing::warn!(collection, path = err.path(), rule = err.rule(), "record rejected");
                RepoError::InvalidRecord(err)
            })?;

        let fingerprint = Fingerprint::of(&value);
        let shard = self.collection(collection);
        let mut records = shard.write();
        let key = self.keys.next()?;
        let record = StoredRecord {
            uri: RecordUri::new(
                self.options.uri_scheme.as_str(),
                self.options.identity.as_str(),
                collection,
                key,
            ),
            key,
            fingerprint,
            value,
        };
        records.insert(key, record.clone());
        drop(records);

        tracing::debug!(uri = %record.uri, fingerprint = %record.fingerprint, "record created");
        Ok(record)
    }

    /// Fetch one record
    pub fn get(&self, collection: &str, key: &str) -> RepoResult<StoredRecord> {
        let parsed = parse_key(key)?;
        self.existing(collection)
            .and_then(|shard| shard.read().get(&parsed).cloned())
            .ok_or_else(|| RepoError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            })
    }

    /// Newest records first, at most `limit` of them (default from options)
    pub fn list(&self, collection: &str, limit: Option<usize>) -> RepoResult<Vec<StoredRecord>> {
        Ok(self.list_page(collection, limit, None)?.records)
    }

    /// Newest records strictly below `cursor`, at most `limit` of them
    pub fn list_page(
        &self,
        collection: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> RepoResult<RecordPage> {
        self.expect_collection(collection)?;
        let limit = self.effective_limit(limit)?;
        let upper = match cursor {
            Some(c) => Bound::Excluded(parse_key(c)?),
            None => Bound::Unbounded,
        };

        let Some(shard) = self.existing(collection) else {
            return Ok(RecordPage::default());
        };
        let records = shard.read();
        let page: Vec<StoredRecord> = records
            .range((Bound::Unbounded, upper))
            .rev()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect();

        let cursor = page.last().and_then(|last| {
            records
                .range(..last.key)
                .next_back()
                .map(|_| last.key)
        });

        Ok(RecordPage { records: page, cursor })
    }

    /// Remove a record; deleting an absent key is not an error
    ///
    /// Returns whether a record was removed.
    pub fn delete(&self, collection: &str, key: &str) -> RepoResult<bool> {
        let parsed = parse_key(key)?;
        let removed = match self.existing(collection) {
            Some(shard) => shard.write().remove(&parsed).is_some(),
            None => false,
        };
        tracing::debug!(collection, key, removed, "record delete");
        Ok(removed)
    }

    /// Number of records in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.existing(collection)
            .map(|shard| shard.read().len())
            .unwrap_or(0)
    }

    /// Collections currently holding at least one record, sorted
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .iter()
            .filter(|(_, shard)| !shard.read().is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    fn expect_collection(&self, collection: &str) -> RepoResult<()> {
        match self.registry.get(collection) {
            Some(schema) if schema.kind == SchemaKind::Record => Ok(()),
            _ => Err(RepoError::UnknownCollection {
                collection: collection.to_string(),
            }),
        }
    }

    fn effective_limit(&self, limit: Option<usize>) -> RepoResult<usize> {
        match limit {
            Some(0) => Err(RepoError::InvalidLimit("limit must be positive".to_string())),
            Some(n) => Ok(n.min(self.options.max_limit)),
            None => Ok(self.options.default_limit.min(self.options.max_limit)),
        }
    }

    fn existing(&self, collection: &str) -> Option<Collection> {
        self.collections.read().get(collection).cloned()
    }

    fn collection(&self, collection: &str) -> Collection {
        if let Some(shard) = self.existing(collection) {
            return shard;
        }
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .clone()
    }
}

impl std::fmt::Debug for RecordRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordRepository")
            .field("identity", &self.options.identity)
            .field("schemas", &self.registry.len())
            .field("collections", &self.collections.read().len())
            .finish()
    }
}

fn parse_key(key: &str) -> RepoResult<Key> {
    Key::parse(key).ok_or_else(|| RepoError::InvalidKey {
        key: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::schema::{FieldSpec, SchemaDocument};
    use serde_json::json;

    fn registry() -> Arc<SchemaRegistry> {
        let mut docs: Vec<SchemaDocument> = ["eating", "zoomies", "playing", "sleeping"]
            .iter()
            .map(|s| SchemaDocument::token(*s, format!("The cat is {}", s)))
            .collect();
        docs.push(SchemaDocument::token("sleepingToken", "A bare token"));
        docs.push(SchemaDocument::record(
            "status",
            [
                (
                    "state",
                    FieldSpec::string()
                        .required()
                        .known_values(["eating", "zoomies", "playing", "sleeping"]),
                ),
                ("text", FieldSpec::string()),
            ],
        ));
        docs.push(SchemaDocument::object("caption", [("text", FieldSpec::string())]));
        Arc::new(SchemaRegistry::load(docs).unwrap())
    }

    fn repo() -> RecordRepository {
        RecordRepository::new(registry(), RepositoryOptions::default().with_identity("did:plc:ffion"))
    }

    #[test]
    fn test_create_then_get() {
        let repo = repo();
        let created = repo.create("status", json!({"state": "sleeping"})).unwrap();

        assert_eq!(created.value["state"], "sleeping");
        assert_eq!(created.value["$type"], "status");
        assert!(created.value.get("createdAt").is_some());
        assert_eq!(
            created.uri.to_string(),
            format!("at://did:plc:ffion/status/{}", created.key)
        );
        assert!(created.fingerprint.matches(&created.value));

        let fetched = repo.get("status", &created.key.to_string()).unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_create_rejects_unknown_state() {
        let repo = repo();
        match repo.create("status", json!({"state": "napping"})) {
            Err(RepoError::InvalidRecord(ValidationError::ValueNotAllowed { path, .. })) => {
                assert_eq!(path, "state")
            }
            other => panic!("Expected ValueNotAllowed, got {:?}", other),
        }
        assert_eq!(repo.len("status"), 0);
    }

    #[test]
    fn test_keys_strictly_increase() {
        let repo = repo();
        let keys: Vec<String> = (0..50)
            .map(|_| repo.create("status", json!({"state": "eating"})).unwrap().key.to_string())
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_list_newest_first_with_limit() {
        let repo = repo();
        let states = ["eating", "zoomies", "playing", "sleeping"];
        let created: Vec<StoredRecord> = states
            .iter()
            .map(|s| repo.create("status", json!({"state": s})).unwrap())
            .collect();

        let listed = repo.list("status", Some(3)).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].key, created[3].key);
        assert_eq!(listed[1].key, created[2].key);
        assert_eq!(listed[2].key, created[1].key);

        let all = repo.list("status", None).unwrap();
        let mut keys: Vec<String> = all.iter().map(|r| r.key.to_string()).collect();
        let listed_order = keys.clone();
        keys.sort();
        keys.reverse();
        assert_eq!(listed_order, keys);

        let newest = repo.create("status", json!({"state": "sleeping"})).unwrap();
        assert_eq!(repo.list("status", Some(1)).unwrap()[0].key, newest.key);
    }

    #[test]
    fn test_list_empty_and_unknown_collections() {
        let repo = repo();
        assert!(repo.list("status", None).unwrap().is_empty());
        assert!(matches!(
            repo.list("com.ffion.nowhere", None),
            Err(RepoError::UnknownCollection { .. })
        ));
        // tokens and objects are not collections
        assert!(matches!(
            repo.create("sleepingToken", json!({})),
            Err(RepoError::UnknownCollection { .. })
        ));
        assert!(matches!(
            repo.create("caption", json!({"text": "hi"})),
            Err(RepoError::UnknownCollection { .. })
        ));
    }

    #[test]
    fn test_limit_zero_and_cap() {
        let options = RepositoryOptions {
            max_limit: 2,
            ..RepositoryOptions::default()
        };
        let repo = RecordRepository::new(registry(), options);
        for _ in 0..5 {
            repo.create("status", json!({"state": "playing"})).unwrap();
        }
        assert!(matches!(repo.list("status", Some(0)), Err(RepoError::InvalidLimit(_))));
        assert_eq!(repo.list("status", Some(1000)).unwrap().len(), 2);
        assert_eq!(repo.list("status", None).unwrap().len(), 2);
    }

    #[test]
    fn test_pagination_with_cursor() {
        let repo = repo();
        let created: Vec<Key> = (0..5)
            .map(|_| repo.create("status", json!({"state": "zoomies"})).unwrap().key)
            .collect();

        let first = repo.list_page("status", Some(2), None).unwrap();
        assert_eq!(
            first.records.iter().map(|r| r.key).collect::<Vec<_>>(),
            vec![created[4], created[3]]
        );
        let cursor = first.cursor.unwrap().to_string();

        let second = repo.list_page("status", Some(2), Some(&cursor)).unwrap();
        assert_eq!(
            second.records.iter().map(|r| r.key).collect::<Vec<_>>(),
            vec![created[2], created[1]]
        );

        let cursor = second.cursor.unwrap().to_string();
        let last = repo.list_page("status", Some(2), Some(&cursor)).unwrap();
        assert_eq!(last.records.len(), 1);
        assert_eq!(last.records[0].key, created[0]);
        assert!(last.cursor.is_none());

        assert!(matches!(
            repo.list_page("status", Some(2), Some("bogus")),
            Err(RepoError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_get_missing_and_malformed() {
        let repo = repo();
        let key = Key::from_parts(1, 0).to_string();
        assert!(matches!(repo.get("status", &key), Err(RepoError::NotFound { .. })));
        assert!(matches!(repo.get("status", "../etc"), Err(RepoError::InvalidKey { .. })));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let repo = repo();
        let record = repo.create("status", json!({"state": "eating"})).unwrap();
        let key = record.key.to_string();

        assert!(repo.delete("status", &key).unwrap());
        assert!(!repo.delete("status", &key).unwrap());
        assert!(!repo.delete("never-written", &key).unwrap());
        assert!(matches!(repo.get("status", &key), Err(RepoError::NotFound { .. })));
        assert!(repo.list("status", None).unwrap().is_empty());
    }

    #[test]
    fn test_explicit_type_must_match_collection() {
        let repo = repo();
        let result = repo.create("status", json!({"$type": "caption", "state": "eating"}));
        assert!(matches!(
            result,
            Err(RepoError::InvalidRecord(ValidationError::DiscriminatorMismatch { .. }))
        ));
    }

    #[test]
    fn test_unknown_fields_pass_through_by_default() {
        let repo = repo();
        let record = repo
            .create("status", json!({"state": "eating", "bowl": "empty"}))
            .unwrap();
        assert_eq!(record.value["bowl"], "empty");

        let strict = RecordRepository::new(
            registry(),
            RepositoryOptions {
                unknown_fields: UnknownFields::Reject,
                ..RepositoryOptions::default()
            },
        );
        assert!(matches!(
            strict.create("status", json!({"state": "eating", "bowl": "empty"})),
            Err(RepoError::InvalidRecord(ValidationError::UnknownField { .. }))
        ));
    }

    #[test]
    fn test_collections_listing() {
        let repo = repo();
        assert!(repo.collections().is_empty());
        repo.create("status", json!({"state": "eating"})).unwrap();
        assert_eq!(repo.collections(), vec!["status".to_string()]);
    }
}
