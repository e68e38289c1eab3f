//! Repository layer contracts and the two storage variants.
//!
//! # Responsibility
//! - Define the dataset-level data access contract used by `RecordStore`.
//! - Isolate SQL and spreadsheet details from store orchestration.
//!
//! # Invariants
//! - `fetch_all` returns normalized records: every field present, years
//!   coerced to integers, dates coerced to calendar dates or blank.
//! - `persist` either durably applies the write or returns an error.

use crate::db::DbError;
use crate::model::record::{Field, Record, SurrogateId};
use crate::sheet::SheetError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub mod normalize;
pub mod sheet_repo;
pub mod sql_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Transport/storage error raised by repository implementations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Sheet(SheetError),
    /// The backend call did not finish within its deadline.
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    /// Updated row no longer exists in the backend.
    MissingRow(SurrogateId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Sheet(err) => write!(f, "{err}"),
            Self::Timeout { operation, after } => {
                write!(f, "{operation} timed out after {}ms", after.as_millis())
            }
            Self::MissingRow(id) => write!(f, "row with id {id} no longer exists"),
            Self::InvalidData(message) => write!(f, "invalid data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Sheet(err) => Some(err),
            Self::Timeout { .. } | Self::MissingRow(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SheetError> for RepoError {
    fn from(value: SheetError) -> Self {
        Self::Sheet(value)
    }
}

/// Storage variant behind a repository, used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Sheet,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Sheet => "sheet",
        }
    }
}

/// The mutation that produced a new dataset.
///
/// Whole-document backends may ignore it and overwrite everything; row-based
/// backends use it to issue targeted statements.
#[derive(Debug, Clone, Copy)]
pub enum WriteOp<'a> {
    Update {
        record: &'a Record,
        fields: &'a [Field],
    },
    Insert {
        record: &'a Record,
    },
}

impl WriteOp<'_> {
    pub fn group_name(&self) -> &str {
        match self {
            Self::Update { record, .. } | Self::Insert { record } => &record.group_name,
        }
    }
}

/// Backend acknowledgement of a successful write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Key assigned to an inserted row, when the backend assigns one.
    pub inserted_id: Option<SurrogateId>,
}

/// Dataset-level repository contract.
pub trait RecordRepository {
    fn kind(&self) -> BackendKind;
    /// Reads and normalizes the full dataset in backend order.
    fn fetch_all(&self) -> RepoResult<Vec<Record>>;
    /// Persists `dataset`, which already contains the effect of `op`.
    fn persist(&self, dataset: &[Record], op: &WriteOp<'_>) -> RepoResult<WriteReceipt>;
}
