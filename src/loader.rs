//! Schema Loading
//!
//! Collects schema documents from a filesystem directory or from the bundle
//! compiled into the binary. Loading only parses documents; cross-reference
//! checks belong to `SchemaRegistry::load`.

use std::fs;
use std::path::Path;

use include_dir::{include_dir, Dir};
use walkdir::WalkDir;

use crate::error::{Result, SchemaError};
use crate::registry::SchemaRegistry;
use crate::schema::SchemaDocument;

/// Schema documents shipped with the crate
static BUNDLED: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/lexicons");

/// Read every `*.json` document under `schema_dir`, sorted by path
pub fn load_from_directory(schema_dir: &Path) -> Result<Vec<SchemaDocument>> {
    if !schema_dir.is_dir() {
        return Err(SchemaError::InvalidFormat(format!(
            "{} is not a directory",
            schema_dir.display()
        )));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(schema_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| SchemaError::InvalidFormat(e.to_string()))?;
        let path = entry.path();
        if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }

        let content = fs::read_to_string(path)?;
        let doc = SchemaDocument::from_json_str(&content).map_err(|e| {
            SchemaError::InvalidFormat(format!("{}: {}", path.display(), e))
        })?;
        tracing::trace!(id = %doc.id, path = %path.display(), "schema document read");
        documents.push(doc);
    }

    tracing::debug!(count = documents.len(), dir = %schema_dir.display(), "schema documents loaded");
    Ok(documents)
}

/// Parse every `*.json` document in an embedded directory tree
pub fn load_from_embedded(dir: &Dir<'_>) -> Result<Vec<SchemaDocument>> {
    let mut files = Vec::new();
    collect_embedded_files(dir, &mut files);
    files.sort_by(|a, b| a.0.cmp(b.0));

    files
        .into_iter()
        .map(|(path, content)| {
            SchemaDocument::from_json_str(content).map_err(|e| {
                SchemaError::InvalidFormat(format!("{}: {}", path.display(), e))
            })
        })
        .collect()
}

/// The bundled documents
pub fn load_bundled() -> Result<Vec<SchemaDocument>> {
    load_from_embedded(&BUNDLED)
}

/// Recursively collect JSON files from an embedded directory
fn collect_embedded_files<'a>(dir: &'a Dir<'_>, files: &mut Vec<(&'a Path, &'a str)>) {
    for file in dir.files() {
        let path = file.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Some(content) = file.contents_utf8() {
                files.push((path, content));
            }
        }
    }

    for subdir in dir.dirs() {
        collect_embedded_files(subdir, files);
    }
}

impl SchemaRegistry {
    /// Registry over the bundled documents
    pub fn bundled() -> Result<Self> {
        Self::load(load_bundled()?)
    }

    /// Registry over every document found under `dir`
    pub fn from_directory(dir: &Path) -> Result<Self> {
        Self::load(load_from_directory(dir)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaKind;

    #[test]
    fn test_bundled_registry() {
        let registry = SchemaRegistry::bundled().unwrap();
        assert_eq!(registry.resolve("com.ffion.status").unwrap().kind, SchemaKind::Record);
        assert_eq!(registry.by_kind(SchemaKind::Token).len(), 4);
        assert!(registry.contains("com.ffion.image"));
        assert!(registry.contains("com.ffion.getStatuses"));
    }

    #[test]
    fn test_directory_loading() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("com/example");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            nested.join("mood.json"),
            r#"{"id": "com.example.mood", "kind": "token"}"#,
        )
        .unwrap();
        fs::write(
            nested.join("note.json"),
            r#"{"id": "com.example.note", "kind": "record",
                "fields": {"mood": {"type": "string", "knownValues": ["com.example.mood"]}}}"#,
        )
        .unwrap();
        fs::write(nested.join("README.md"), "not a schema").unwrap();

        let docs = load_from_directory(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
        let registry = SchemaRegistry::load(docs).unwrap();
        assert!(registry.contains("com.example.note"));
    }

    #[test]
    fn test_directory_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        match load_from_directory(dir.path()) {
            Err(SchemaError::InvalidFormat(msg)) => assert!(msg.contains("broken.json")),
            other => panic!("Expected InvalidFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_across_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.json", "b.json"] {
            fs::write(dir.path().join(name), r#"{"id": "dup", "kind": "token"}"#).unwrap();
        }
        assert!(matches!(
            SchemaRegistry::from_directory(dir.path()),
            Err(SchemaError::SchemaConflict { .. })
        ));
    }
}
