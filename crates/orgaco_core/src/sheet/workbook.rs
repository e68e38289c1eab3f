//! Local workbook document used as a spreadsheet datastore.
//!
//! The document is a JSON object mapping worksheet names to cell grids:
//! `{"worksheets": {"Sheet1": [["Group_Association", ...], [...]]}}`.
//!
//! # Invariants
//! - Writes go to a sibling temp file that is atomically renamed over the
//!   document, so readers never observe a half-written workbook.
//! - The rename happens inside the write's `WriteGate`; an abandoned write
//!   leaves only its temp file behind, which is removed on drop.
//! - Writing one worksheet preserves every other worksheet.

use super::{CellValue, SheetClient, SheetError, SheetResult, WriteGate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Default, Serialize, Deserialize)]
struct WorkbookDocument {
    #[serde(default)]
    worksheets: BTreeMap<String, Vec<Vec<CellValue>>>,
}

/// File-backed spreadsheet document.
#[derive(Debug, Clone)]
pub struct WorkbookFile {
    path: PathBuf,
}

impl WorkbookFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the document and/or `worksheet` with a header row if missing.
    ///
    /// Returns `true` when something was created.
    pub fn ensure_worksheet(&self, worksheet: &str, header: &[&str]) -> SheetResult<bool> {
        let mut document = match self.read_document() {
            Ok(document) => document,
            Err(SheetError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                WorkbookDocument::default()
            }
            Err(err) => return Err(err),
        };

        if document.worksheets.contains_key(worksheet) {
            return Ok(false);
        }

        let header_row = header.iter().map(|column| CellValue::from(*column)).collect();
        document
            .worksheets
            .insert(worksheet.to_string(), vec![header_row]);
        self.write_document(&document, &WriteGate::new())?;
        Ok(true)
    }

    fn read_document(&self) -> SheetResult<WorkbookDocument> {
        let file = File::open(&self.path)?;
        let document = serde_json::from_reader(BufReader::new(file))?;
        Ok(document)
    }

    fn write_document(&self, document: &WorkbookDocument, gate: &WriteGate) -> SheetResult<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut staged, document)?;
        staged.write_all(b"\n")?;
        staged.as_file().sync_all()?;
        gate.commit(|| {
            staged
                .persist(&self.path)
                .map(drop)
                .map_err(|err| SheetError::Io(err.error))
        })?;

        debug!(
            "event=workbook_persist module=sheet status=ok worksheets={}",
            document.worksheets.len()
        );
        Ok(())
    }
}

impl SheetClient for WorkbookFile {
    fn read_values(&self, worksheet: &str) -> SheetResult<Vec<Vec<CellValue>>> {
        let mut document = self.read_document()?;
        document
            .worksheets
            .remove(worksheet)
            .ok_or_else(|| SheetError::UnknownWorksheet(worksheet.to_string()))
    }

    fn write_values_gated(
        &self,
        worksheet: &str,
        values: Vec<Vec<CellValue>>,
        gate: &WriteGate,
    ) -> SheetResult<()> {
        let mut document = match self.read_document() {
            Ok(document) => document,
            Err(SheetError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                WorkbookDocument::default()
            }
            Err(err) => return Err(err),
        };
        document.worksheets.insert(worksheet.to_string(), values);
        self.write_document(&document, gate)
    }
}
