//! Relational variant: one SQLite table keyed by a surrogate id.
//!
//! # Responsibility
//! - Read the whole group table in insertion order.
//! - Apply updates as one `UPDATE` per changed column and inserts as one
//!   `INSERT`, inside a single transaction.
//!
//! # Invariants
//! - Column identifiers in statements come only from `Field::column()`.
//! - Values are always bound as parameters, never spliced into SQL.
//! - A failed statement rolls back the whole write.

use crate::model::record::{Field, Record, SurrogateId};
use crate::repo::normalize::{finalize_dataset, record_from_columns};
use crate::repo::{BackendKind, RecordRepository, RepoError, RepoResult, WriteOp, WriteReceipt};
use log::{debug, error};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::time::Instant;

/// Table holding one row per group.
pub const RECORD_TABLE: &str = "dbORGACO";
const ID_COLUMN: &str = "id";

/// SQLite-backed group repository.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// Fails with `InvalidData` when the group table is missing, which means
    /// the connection was not opened through `db::open_db`.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
            );",
            [RECORD_TABLE],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepoError::InvalidData(format!(
                "table `{RECORD_TABLE}` is missing; open the database with `open_db` first"
            )));
        }
        Ok(Self { conn })
    }

    fn update_columns(&self, record: &Record, fields: &[Field]) -> RepoResult<()> {
        let id = record.surrogate_id.ok_or_else(|| {
            RepoError::InvalidData(format!(
                "record `{}` has no surrogate id",
                record.group_name
            ))
        })?;
        if let Some(field) = fields.iter().find(|field| **field == Field::GroupName) {
            return Err(RepoError::InvalidData(format!(
                "column `{field}` is a business key and cannot be updated"
            )));
        }

        let tx = self.conn.unchecked_transaction()?;
        for field in fields {
            let sql = format!(
                "UPDATE \"{RECORD_TABLE}\" SET \"{}\" = ?1 WHERE \"{ID_COLUMN}\" = ?2;",
                field.column()
            );
            let changed = tx.execute(&sql, params![column_value(record, *field), id])?;
            if changed == 0 {
                return Err(RepoError::MissingRow(id));
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_row(&self, record: &Record) -> RepoResult<SurrogateId> {
        let placeholders = (1..=Field::ALL.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO \"{RECORD_TABLE}\" ({}) VALUES ({placeholders});",
            quoted_columns()
        );

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &sql,
            params_from_iter(Field::ALL.iter().map(|field| column_value(record, *field))),
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn fetch_all(&self) -> RepoResult<Vec<Record>> {
        let started_at = Instant::now();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT \"{ID_COLUMN}\", {} FROM \"{RECORD_TABLE}\" ORDER BY \"{ID_COLUMN}\" ASC;",
            quoted_columns()
        ))?;

        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }

        debug!(
            "event=repo_fetch module=repo status=ok backend=sqlite rows={} duration_ms={}",
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(finalize_dataset(records, BackendKind::Sqlite))
    }

    fn persist(&self, _dataset: &[Record], op: &WriteOp<'_>) -> RepoResult<WriteReceipt> {
        let started_at = Instant::now();
        let result = match op {
            WriteOp::Update { record, fields } => self
                .update_columns(record, fields)
                .map(|()| WriteReceipt::default()),
            WriteOp::Insert { record } => self.insert_row(record).map(|id| WriteReceipt {
                inserted_id: Some(id),
            }),
        };

        match &result {
            Ok(_) => debug!(
                "event=repo_persist module=repo status=ok backend=sqlite duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=repo_persist module=repo status=error backend=sqlite duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            ),
        }
        result
    }
}

fn quoted_columns() -> String {
    Field::ALL
        .iter()
        .map(|field| format!("\"{}\"", field.column()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_value(record: &Record, field: Field) -> Value {
    match field {
        Field::LastFeePaidYear => Value::Integer(i64::from(record.last_fee_paid_year)),
        Field::LastUpdated => match record.last_updated {
            Some(_) => Value::Text(record.field_text(field)),
            None => Value::Null,
        },
        _ => Value::Text(record.field_text(field)),
    }
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<Record> {
    let id: SurrogateId = row.get(0)?;
    let mut texts = Vec::with_capacity(Field::ALL.len());
    for index in 0..Field::ALL.len() {
        texts.push(value_text(row.get::<_, Value>(index + 1)?));
    }

    Ok(record_from_columns(Some(id), |field| {
        Field::ALL
            .iter()
            .position(|candidate| *candidate == field)
            .and_then(|index| texts[index].clone())
    }))
}

fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null | Value::Blob(_) => None,
        Value::Integer(number) => Some(number.to_string()),
        Value::Real(number) => Some(number.to_string()),
        Value::Text(text) => Some(text),
    }
}
