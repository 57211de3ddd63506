//! Request/response surface over the repository
//!
//! These are the four operations a transport layer exposes. Authentication is
//! the caller's business: by the time a request reaches this module the
//! caller has already been authorized to act on the repository.

use std::num::IntErrorKind;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RepoError, RepoResult};
use crate::repository::{RecordRepository, StoredRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordInput {
    pub collection: String,
    pub record: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRecordOutput {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRecordsInput {
    pub collection: String,
    /// Positive integer, as received from the transport
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRecordsOutput {
    pub records: Vec<RecordView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRef {
    pub collection: String,
    pub rkey: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    pub uri: String,
    pub cid: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRecordOutput {
    pub deleted: bool,
}

/// Error body handed back to the record producer unchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorView {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<&RepoError> for ErrorView {
    fn from(err: &RepoError) -> Self {
        let (error, path) = match err {
            RepoError::InvalidRecord(inner) => (inner.rule(), Some(inner.path().to_string())),
            RepoError::UnknownCollection { .. } => ("UnknownCollection", None),
            RepoError::NotFound { .. } => ("NotFound", None),
            RepoError::InvalidKey { .. } => ("InvalidKey", None),
            RepoError::InvalidLimit(_) => ("InvalidLimit", None),
            RepoError::KeySpaceExhausted(_) => ("KeySpaceExhausted", None),
        };
        Self {
            error: error.to_string(),
            message: err.to_string(),
            path,
        }
    }
}

impl From<StoredRecord> for RecordView {
    fn from(record: StoredRecord) -> Self {
        Self {
            uri: record.uri.to_string(),
            cid: record.fingerprint.to_string(),
            value: record.value,
        }
    }
}

/// Parse a transport-supplied limit; it must be a positive integer
///
/// Values too large for `usize` are still positive and come back as
/// `usize::MAX`, which the repository clamps to its configured cap.
pub fn parse_limit(raw: Option<&str>) -> RepoResult<Option<usize>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let invalid = || RepoError::InvalidLimit(format!("{:?} is not a positive integer", raw));
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(invalid()),
        Ok(n) => Ok(Some(n)),
        Err(err) if *err.kind() == IntErrorKind::PosOverflow => Ok(Some(usize::MAX)),
        Err(_) => Err(invalid()),
    }
}

/// The repository operations as a transport sees them
#[derive(Debug, Clone)]
pub struct RepoService {
    repo: Arc<RecordRepository>,
}

impl RepoService {
    pub fn new(repo: Arc<RecordRepository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &RecordRepository {
        &self.repo
    }

    pub fn create_record(&self, input: CreateRecordInput) -> RepoResult<CreateRecordOutput> {
        let record = self.repo.create(&input.collection, input.record)?;
        Ok(CreateRecordOutput {
            uri: record.uri.to_string(),
            cid: record.fingerprint.to_string(),
        })
    }

    pub fn list_records(&self, input: ListRecordsInput) -> RepoResult<ListRecordsOutput> {
        let limit = parse_limit(input.limit.as_deref())?;
        let page = self
            .repo
            .list_page(&input.collection, limit, input.cursor.as_deref())?;
        Ok(ListRecordsOutput {
            records: page.records.into_iter().map(RecordView::from).collect(),
            cursor: page.cursor.map(|k| k.to_string()),
        })
    }

    pub fn get_record(&self, input: RecordRef) -> RepoResult<RecordView> {
        self.repo
            .get(&input.collection, &input.rkey)
            .map(RecordView::from)
    }

    pub fn delete_record(&self, input: RecordRef) -> RepoResult<DeleteRecordOutput> {
        let deleted = self.repo.delete(&input.collection, &input.rkey)?;
        Ok(DeleteRecordOutput { deleted })
    }
}
