//! Record store: cached, write-through access to the group dataset.
//!
//! # Responsibility
//! - Load the full dataset from a repository and cache it for a bounded TTL.
//! - Serve lookups and the group name list from the cached dataset.
//! - Validate, persist and then publish updates and inserts.
//!
//! # Invariants
//! - Validation and uniqueness checks run before any backend write.
//! - The cached dataset only reflects a mutation after the backend
//!   acknowledged it; a failed write drops the cache instead.
//! - A successful write marks the cache stale, so the next `load` reads the
//!   backend even within the TTL.
//! - Mutations never run against an unloaded dataset, so a failed read can
//!   never be written back over the backend.
//!
//! # Concurrency
//! One store serves one interaction at a time (`&mut self`). Concurrent
//! writers in other processes are last-writer-wins.

use crate::clock::{Clock, SystemClock};
use crate::model::record::{Field, FieldChanges, Record, RecordValidationError};
use crate::repo::{RecordRepository, RepoError, WriteOp};
use chrono::{Datelike, NaiveDate};
use log::{error, info, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Cache lifetime used when none is configured.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

pub type StoreResult<T> = Result<T, StoreError>;

/// Reportable store failures. None of them is fatal to the process.
#[derive(Debug)]
pub enum StoreError {
    /// Backend could not be reached or read.
    BackendUnavailable(RepoError),
    ValidationFailed(RecordValidationError),
    DuplicateGroup(String),
    NotFound(String),
    /// Update passed validation but the write-through failed.
    UpdateFailed {
        group_name: String,
        source: RepoError,
    },
    /// Insert passed validation but the write-through failed.
    InsertFailed {
        group_name: String,
        source: RepoError,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackendUnavailable(err) => write!(f, "backend unavailable: {err}"),
            Self::ValidationFailed(err) => write!(f, "validation failed: {err}"),
            Self::DuplicateGroup(name) => write!(f, "group `{name}` already exists"),
            Self::NotFound(name) => write!(f, "no data for group `{name}`"),
            Self::UpdateFailed { group_name, source } => {
                write!(f, "failed to save changes for `{group_name}`: {source}")
            }
            Self::InsertFailed { group_name, source } => {
                write!(f, "failed to add group `{group_name}`: {source}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BackendUnavailable(err) => Some(err),
            Self::ValidationFailed(err) => Some(err),
            Self::UpdateFailed { source, .. } | Self::InsertFailed { source, .. } => Some(source),
            Self::DuplicateGroup(_) | Self::NotFound(_) => None,
        }
    }
}

impl From<RecordValidationError> for StoreError {
    fn from(value: RecordValidationError) -> Self {
        Self::ValidationFailed(value)
    }
}

/// Where a `load` result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Backend,
    /// The backend read failed; the dataset is empty.
    Unavailable,
}

/// Result of `RecordStore::load`.
///
/// A failed read still yields a well-formed (empty) dataset; the failure is
/// reported alongside it.
#[derive(Debug)]
pub struct LoadOutcome {
    pub records: Vec<Record>,
    pub source: LoadSource,
    pub failure: Option<StoreError>,
}

impl LoadOutcome {
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
struct CachedDataset {
    records: Vec<Record>,
    fetched_at: Instant,
    stale: bool,
}

/// Owned, injectable store over one repository.
pub struct RecordStore<R, C = SystemClock> {
    repo: R,
    clock: C,
    ttl: Duration,
    cache: Option<CachedDataset>,
}

impl<R: RecordRepository> RecordStore<R, SystemClock> {
    /// Creates an unloaded store using the system clock and default TTL.
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, SystemClock)
    }
}

impl<R: RecordRepository, C: Clock> RecordStore<R, C> {
    pub fn with_clock(repo: R, clock: C) -> Self {
        Self {
            repo,
            clock,
            ttl: DEFAULT_CACHE_TTL,
            cache: None,
        }
    }

    /// Overrides the cache lifetime. A zero TTL disables read caching.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Current calendar date according to the store clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Returns the dataset, from cache when fresh, otherwise from the backend.
    pub fn load(&mut self) -> LoadOutcome {
        if self.is_fresh() {
            info!(
                "event=store_load module=store status=ok source=cache backend={}",
                self.repo.kind().as_str()
            );
            return LoadOutcome {
                records: self.records().to_vec(),
                source: LoadSource::Cache,
                failure: None,
            };
        }

        match self.fetch() {
            Ok(()) => LoadOutcome {
                records: self.records().to_vec(),
                source: LoadSource::Backend,
                failure: None,
            },
            Err(err) => LoadOutcome {
                records: Vec::new(),
                source: LoadSource::Unavailable,
                failure: Some(err),
            },
        }
    }

    /// Drops the cache and reads the backend.
    pub fn refresh(&mut self) -> LoadOutcome {
        self.invalidate();
        self.load()
    }

    /// Drops the cached dataset; lookups see no data until the next load.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Current dataset without any backend call; empty when unloaded.
    pub fn records(&self) -> &[Record] {
        match &self.cache {
            Some(cache) => &cache.records,
            None => &[],
        }
    }

    /// Exact-match lookup over the current dataset.
    ///
    /// Does not contact the backend; call `load` first.
    pub fn find_by_group_name(&self, group_name: &str) -> StoreResult<&Record> {
        self.records()
            .iter()
            .find(|record| record.group_name == group_name)
            .ok_or_else(|| StoreError::NotFound(group_name.to_string()))
    }

    /// Distinct group names in lexicographic order, from the current dataset.
    pub fn list_group_names(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|record| record.group_name.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Applies `changes` to one record and writes the dataset through.
    ///
    /// Returns the updated dataset on success. An empty change set is a
    /// successful no-op and does not touch the backend or the update stamp.
    pub fn update_record(
        &mut self,
        group_name: &str,
        changes: &FieldChanges,
    ) -> StoreResult<Vec<Record>> {
        self.ensure_loaded()?;
        let index = self
            .records()
            .iter()
            .position(|record| record.group_name == group_name)
            .ok_or_else(|| StoreError::NotFound(group_name.to_string()))?;

        if changes.is_empty() {
            return Ok(self.records().to_vec());
        }

        let today = self.clock.today();
        let mut updated = self.records()[index].apply_changes(changes, today.year())?;
        updated.last_updated = Some(today);

        let mut next = self.records().to_vec();
        next[index] = updated;
        let mut fields: Vec<Field> = changes.fields().collect();
        fields.push(Field::LastUpdated);

        let op = WriteOp::Update {
            record: &next[index],
            fields: &fields,
        };
        if let Err(source) = self.repo.persist(&next, &op) {
            self.invalidate();
            error!(
                "event=store_update module=store status=error backend={} group={group_name} error={source}",
                self.repo.kind().as_str()
            );
            return Err(StoreError::UpdateFailed {
                group_name: group_name.to_string(),
                source,
            });
        }

        info!(
            "event=store_update module=store status=ok backend={} group={group_name} fields={}",
            self.repo.kind().as_str(),
            changes.len()
        );
        self.publish(next.clone());
        Ok(next)
    }

    /// Appends a new record and writes the dataset through.
    ///
    /// Text fields are trimmed like update values are; any caller-supplied id
    /// or update stamp is replaced. Returns the updated dataset on success.
    pub fn insert_record(&mut self, mut record: Record) -> StoreResult<Vec<Record>> {
        record.trim_text();
        record.surrogate_id = None;

        let today = self.clock.today();
        record.validate(today.year())?;
        self.ensure_loaded()?;

        if self
            .records()
            .iter()
            .any(|existing| existing.group_name == record.group_name)
        {
            warn!(
                "event=store_insert module=store status=rejected reason=duplicate group={}",
                record.group_name
            );
            return Err(StoreError::DuplicateGroup(record.group_name));
        }

        record.last_updated = Some(today);
        let mut next = self.records().to_vec();
        next.push(record);
        let last = next.len() - 1;

        let op = WriteOp::Insert { record: &next[last] };
        let receipt = match self.repo.persist(&next, &op) {
            Ok(receipt) => receipt,
            Err(source) => {
                self.invalidate();
                let group_name = next[last].group_name.clone();
                error!(
                    "event=store_insert module=store status=error backend={} group={group_name} error={source}",
                    self.repo.kind().as_str()
                );
                return Err(StoreError::InsertFailed { group_name, source });
            }
        };

        if let Some(id) = receipt.inserted_id {
            next[last].surrogate_id = Some(id);
        }
        info!(
            "event=store_insert module=store status=ok backend={} group={}",
            self.repo.kind().as_str(),
            next[last].group_name
        );
        self.publish(next.clone());
        Ok(next)
    }

    fn is_fresh(&self) -> bool {
        self.cache.as_ref().is_some_and(|cache| {
            !cache.stale && self.clock.now().saturating_duration_since(cache.fetched_at) < self.ttl
        })
    }

    fn ensure_loaded(&mut self) -> StoreResult<()> {
        if self.is_fresh() {
            return Ok(());
        }
        self.fetch()
    }

    fn fetch(&mut self) -> StoreResult<()> {
        let started_at = Instant::now();
        match self.repo.fetch_all() {
            Ok(records) => {
                info!(
                    "event=store_load module=store status=ok source=backend backend={} rows={} duration_ms={}",
                    self.repo.kind().as_str(),
                    records.len(),
                    started_at.elapsed().as_millis()
                );
                self.cache = Some(CachedDataset {
                    records,
                    fetched_at: self.clock.now(),
                    stale: false,
                });
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=store_load module=store status=error source=backend backend={} duration_ms={} error={err}",
                    self.repo.kind().as_str(),
                    started_at.elapsed().as_millis()
                );
                self.cache = None;
                Err(StoreError::BackendUnavailable(err))
            }
        }
    }

    fn publish(&mut self, records: Vec<Record>) {
        self.cache = Some(CachedDataset {
            records,
            fetched_at: self.clock.now(),
            stale: true,
        });
    }
}
