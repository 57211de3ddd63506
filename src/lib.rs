//! Lexicon Record Repository
//!
//! A schema-governed record store: typed records are validated against
//! declarative schema documents, assigned a sortable, strictly increasing key
//! and kept per collection for newest-first listing and lookup by key.
//!
//! ## Features
//!
//! - **Schema Registry**: Token, record, object, query and procedure documents,
//!   with every `knownValues` and `ref` reference resolved at load time
//! - **Validation**: Recursive, path-reporting checks with no coercion
//! - **Sortable Keys**: 13-character timestamp keys that never repeat or go backwards
//! - **Fingerprints**: SHA-256 content fingerprints for every stored record
//!
//! ## Architecture
//!
//! ```text
//! create(collection, value)
//!   ├── Validator ── SchemaRegistry
//!   ├── KeyGenerator
//!   └── collection map: Key -> StoredRecord
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod loader;
pub mod registry;
pub mod repository;
pub mod schema;
pub mod service;
pub mod tid;
pub mod uri;
pub mod validator;

pub use config::RepoConfig;
pub use error::{RepoError, RepoResult, Result, SchemaError, ValidationError};
pub use fingerprint::Fingerprint;
pub use registry::SchemaRegistry;
pub use repository::{RecordPage, RecordRepository, RepositoryOptions, StoredRecord};
pub use schema::{FieldSpec, FieldType, SchemaDocument, SchemaKind};
pub use service::RepoService;
pub use tid::{Clock, Key, KeyGenerator, KeySpaceExhausted, SystemClock};
pub use uri::RecordUri;
pub use validator::{validate, UnknownFields, Validator};
