//! Spreadsheet document access.
//!
//! # Responsibility
//! - Define the cell-grid contract a spreadsheet backend must satisfy.
//! - Keep document format and transport details out of the repository layer.
//!
//! # Invariants
//! - `write_values` replaces the whole worksheet; there are no cell patches.
//! - A write publishes its contents only through its `WriteGate`; an abandoned
//!   write never becomes visible.
//! - A worksheet is read as rows of cells, first row being the header.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

mod workbook;

pub use workbook::WorkbookFile;

pub type SheetResult<T> = Result<T, SheetError>;

/// One spreadsheet cell as exchanged with a sheet client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Renders the cell the way a spreadsheet displays it.
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Access to worksheets of one spreadsheet document.
pub trait SheetClient {
    /// Reads every populated row of `worksheet`.
    fn read_values(&self, worksheet: &str) -> SheetResult<Vec<Vec<CellValue>>>;

    /// Overwrites `worksheet` with `values`, starting at the top-left cell.
    ///
    /// Implementations stage the new contents first and make them visible
    /// only inside `gate.commit`.
    fn write_values_gated(
        &self,
        worksheet: &str,
        values: Vec<Vec<CellValue>>,
        gate: &WriteGate,
    ) -> SheetResult<()>;

    /// Overwrites `worksheet` with nobody able to abandon the write.
    fn write_values(&self, worksheet: &str, values: Vec<Vec<CellValue>>) -> SheetResult<()> {
        self.write_values_gated(worksheet, values, &WriteGate::new())
    }
}

/// Commit point shared by a sheet write and the caller waiting on it.
///
/// Once [`WriteGate::abandon`] has run, `commit` refuses to publish. A commit
/// already in progress holds the gate, so `abandon` waits for it and then
/// reports that the write landed.
#[derive(Debug, Clone, Default)]
pub struct WriteGate {
    state: Arc<Mutex<GateState>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum GateState {
    #[default]
    Open,
    Committed,
    Abandoned,
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `publish` unless the write has been abandoned.
    pub fn commit<T>(&self, publish: impl FnOnce() -> SheetResult<T>) -> SheetResult<T> {
        let mut state = self.lock();
        if *state == GateState::Abandoned {
            return Err(SheetError::Abandoned);
        }
        let value = publish()?;
        *state = GateState::Committed;
        Ok(value)
    }

    /// Blocks any later commit. Returns `true` when the write already landed.
    pub fn abandon(&self) -> bool {
        let mut state = self.lock();
        if *state == GateState::Committed {
            return true;
        }
        *state = GateState::Abandoned;
        false
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub enum SheetError {
    Io(std::io::Error),
    Format(serde_json::Error),
    UnknownWorksheet(String),
    /// The caller gave up on this write before it was published.
    Abandoned,
}

impl Display for SheetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "spreadsheet i/o failed: {err}"),
            Self::Format(err) => write!(f, "spreadsheet document is malformed: {err}"),
            Self::UnknownWorksheet(name) => write!(f, "worksheet `{name}` does not exist"),
            Self::Abandoned => write!(f, "write was abandoned before it was published"),
        }
    }
}

impl Error for SheetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Format(err) => Some(err),
            Self::UnknownWorksheet(_) | Self::Abandoned => None,
        }
    }
}

impl From<std::io::Error> for SheetError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for SheetError {
    fn from(value: serde_json::Error) -> Self {
        Self::Format(value)
    }
}
