//! Core record management for group associations.
//! This crate owns the record shape, both storage variants and the
//! cached write-through store that presentation layers drive.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sheet;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, BackendConfig, ConfigError, LoggingSettings, StoreSettings};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::record::{
    fee_year_bounds, Contact, ContactPart, Contacts, Field, FieldChanges, Record,
    RecordValidationError, Role, SurrogateId,
};
pub use repo::sheet_repo::{SheetRecordRepository, DEFAULT_WORKSHEET};
pub use repo::sql_repo::{SqliteRecordRepository, RECORD_TABLE};
pub use repo::{BackendKind, RecordRepository, RepoError, RepoResult, WriteOp, WriteReceipt};
pub use service::record_store::{
    LoadOutcome, LoadSource, RecordStore, StoreError, StoreResult, DEFAULT_CACHE_TTL,
};
pub use sheet::{CellValue, SheetClient, SheetError, WorkbookFile, WriteGate};
