//! Spreadsheet variant: one worksheet with a fixed header row.
//!
//! # Responsibility
//! - Map the header row to known columns and normalize every data row.
//! - Persist by overwriting the whole worksheet (header + all rows).
//!
//! # Invariants
//! - Every sheet call runs under a deadline; expiry is `RepoError::Timeout`.
//! - A write that misses its deadline is abandoned and never published.
//! - Written worksheets start with the canonical header in `Field::ALL` order.
//! - Extra columns and rows without a group name, as seen on the last read,
//!   are written back unchanged.

use crate::model::record::{Field, Record};
use crate::repo::normalize::{finalize_dataset, record_from_columns};
use crate::repo::{BackendKind, RecordRepository, RepoError, RepoResult, WriteOp, WriteReceipt};
use crate::sheet::{CellValue, SheetClient, SheetResult, WriteGate};
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Worksheet used when none is configured.
pub const DEFAULT_WORKSHEET: &str = "Sheet1";

/// Spreadsheet-backed group repository.
pub struct SheetRecordRepository<C> {
    client: C,
    worksheet: String,
    deadline: Duration,
    layout: RefCell<SheetLayout>,
}

/// Worksheet content outside the dataset, kept so writes do not erase it.
#[derive(Debug, Clone, Default, PartialEq)]
struct SheetLayout {
    /// Header cells of columns that map to no field.
    extra_columns: Vec<CellValue>,
    rows: Vec<LayoutRow>,
}

#[derive(Debug, Clone, PartialEq)]
enum LayoutRow {
    /// A record row and its cells under `extra_columns`.
    Record {
        group_name: String,
        extra_cells: Vec<CellValue>,
    },
    /// A row with data but no group name, in written column order.
    Unnamed(Vec<CellValue>),
}

impl SheetLayout {
    fn unnamed_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| matches!(row, LayoutRow::Unnamed(_)))
            .count()
    }
}

impl<C> SheetRecordRepository<C>
where
    C: SheetClient + Clone + Send + 'static,
{
    pub fn new(client: C, worksheet: impl Into<String>, deadline: Duration) -> Self {
        Self {
            client,
            worksheet: worksheet.into(),
            deadline,
            layout: RefCell::new(SheetLayout::default()),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn worksheet(&self) -> &str {
        &self.worksheet
    }
}

impl<C> RecordRepository for SheetRecordRepository<C>
where
    C: SheetClient + Clone + Send + 'static,
{
    fn kind(&self) -> BackendKind {
        BackendKind::Sheet
    }

    fn fetch_all(&self) -> RepoResult<Vec<Record>> {
        let started_at = Instant::now();
        let client = self.client.clone();
        let worksheet = self.worksheet.clone();
        let grid = run_with_deadline("sheet_read", self.deadline, move || {
            client.read_values(&worksheet)
        })?;

        let (records, layout) = parse_grid(&grid);
        let unnamed = layout.unnamed_rows();
        if unnamed > 0 {
            info!(
                "event=repo_fetch module=repo status=retained backend=sheet unnamed_rows={unnamed}"
            );
        }
        debug!(
            "event=repo_fetch module=repo status=ok backend=sheet rows={} extra_columns={} duration_ms={}",
            records.len(),
            layout.extra_columns.len(),
            started_at.elapsed().as_millis()
        );
        *self.layout.borrow_mut() = layout;
        Ok(finalize_dataset(records, BackendKind::Sheet))
    }

    fn persist(&self, dataset: &[Record], _op: &WriteOp<'_>) -> RepoResult<WriteReceipt> {
        let started_at = Instant::now();
        let client = self.client.clone();
        let worksheet = self.worksheet.clone();
        let grid = render_grid(dataset, &self.layout.borrow());
        let (_, written_layout) = parse_grid(&grid);

        let gate = WriteGate::new();
        let worker_gate = gate.clone();
        let result = match run_with_deadline("sheet_write", self.deadline, move || {
            client.write_values_gated(&worksheet, grid, &worker_gate)
        }) {
            Err(RepoError::Timeout { operation, after }) => {
                if gate.abandon() {
                    warn!(
                        "event=repo_persist module=repo status=late backend=sheet duration_ms={}",
                        started_at.elapsed().as_millis()
                    );
                    Ok(())
                } else {
                    Err(RepoError::Timeout { operation, after })
                }
            }
            other => other,
        };

        match &result {
            Ok(()) => {
                *self.layout.borrow_mut() = written_layout;
                debug!(
                    "event=repo_persist module=repo status=ok backend=sheet rows={} duration_ms={}",
                    dataset.len(),
                    started_at.elapsed().as_millis()
                );
            }
            Err(err) => error!(
                "event=repo_persist module=repo status=error backend=sheet duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            ),
        }
        result.map(|()| WriteReceipt::default())
    }
}

/// Canonical header row.
pub fn header_row() -> Vec<CellValue> {
    Field::ALL
        .iter()
        .map(|field| CellValue::from(field.column()))
        .collect()
}

fn is_blank(cell: &CellValue) -> bool {
    cell.to_text().trim().is_empty()
}

fn cell_at(row: &[CellValue], index: usize) -> CellValue {
    row.get(index).cloned().unwrap_or(CellValue::Empty)
}

fn parse_grid(grid: &[Vec<CellValue>]) -> (Vec<Record>, SheetLayout) {
    let mut layout = SheetLayout::default();
    let Some((header, rows)) = grid.split_first() else {
        return (Vec::new(), layout);
    };

    let mut positions = BTreeMap::new();
    let mut extra_positions = Vec::new();
    for (index, cell) in header.iter().enumerate() {
        if let Some(field) = Field::from_column(cell.to_text().trim()) {
            if !positions.contains_key(&field) {
                positions.insert(field, index);
                continue;
            }
        }
        // Unlabelled columns only matter when some row uses them.
        if is_blank(cell) && rows.iter().all(|row| is_blank(&cell_at(row, index))) {
            continue;
        }
        extra_positions.push(index);
        layout.extra_columns.push(cell.clone());
    }

    let mut records = Vec::new();
    for row in rows.iter().filter(|row| !row.iter().all(is_blank)) {
        let record = record_from_columns(None, |field| {
            positions
                .get(&field)
                .and_then(|index| row.get(*index))
                .map(CellValue::to_text)
        });
        let extra_cells: Vec<CellValue> = extra_positions
            .iter()
            .map(|index| cell_at(row, *index))
            .collect();

        if record.group_name.is_empty() {
            let mut cells: Vec<CellValue> = Field::ALL
                .iter()
                .map(|field| {
                    positions
                        .get(field)
                        .map_or(CellValue::Empty, |index| cell_at(row, *index))
                })
                .collect();
            cells.extend(extra_cells);
            layout.rows.push(LayoutRow::Unnamed(cells));
        } else {
            layout.rows.push(LayoutRow::Record {
                group_name: record.group_name.clone(),
                extra_cells,
            });
            records.push(record);
        }
    }
    (records, layout)
}

/// Lays `dataset` out over the remembered sheet shape.
///
/// Records are matched to their remembered rows in order; records the sheet
/// has not seen yet go after the last row.
fn render_grid(dataset: &[Record], layout: &SheetLayout) -> Vec<Vec<CellValue>> {
    let width = layout.extra_columns.len();
    let mut header = header_row();
    header.extend(layout.extra_columns.iter().cloned());

    let mut grid = Vec::with_capacity(dataset.len() + layout.rows.len() + 1);
    grid.push(header);

    let mut pending = dataset.iter().peekable();
    for row in &layout.rows {
        match row {
            LayoutRow::Unnamed(cells) => grid.push(cells.clone()),
            LayoutRow::Record {
                group_name,
                extra_cells,
            } => {
                if let Some(record) = pending.next_if(|record| &record.group_name == group_name) {
                    grid.push(record_row(record, extra_cells, width));
                }
            }
        }
    }
    grid.extend(pending.map(|record| record_row(record, &[], width)));
    grid
}

fn record_row(record: &Record, extra_cells: &[CellValue], width: usize) -> Vec<CellValue> {
    let mut row: Vec<CellValue> = Field::ALL
        .iter()
        .map(|field| match field {
            Field::LastFeePaidYear => CellValue::Integer(i64::from(record.last_fee_paid_year)),
            Field::LastUpdated if record.last_updated.is_none() => CellValue::Empty,
            _ => CellValue::Text(record.field_text(*field)),
        })
        .collect();
    row.extend((0..width).map(|index| cell_at(extra_cells, index)));
    row
}

/// Runs a blocking sheet call on a worker thread and waits at most `deadline`.
///
/// A call that outlives its deadline keeps running detached and its result is
/// discarded. Writes pass a `WriteGate` so the caller can stop them from
/// publishing.
fn run_with_deadline<T, F>(operation: &'static str, deadline: Duration, job: F) -> RepoResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SheetResult<T> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name(format!("orgaco-{operation}"))
        .spawn(move || {
            let _ = sender.send(job());
        })
        .map_err(|err| RepoError::Sheet(err.into()))?;

    match receiver.recv_timeout(deadline) {
        Ok(result) => result.map_err(RepoError::from),
        Err(RecvTimeoutError::Timeout) => Err(RepoError::Timeout {
            operation,
            after: deadline,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(RepoError::InvalidData(format!(
            "{operation} worker stopped without a result"
        ))),
    }
}
