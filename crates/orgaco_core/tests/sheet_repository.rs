use chrono::NaiveDate;
use orgaco_core::repo::sheet_repo::header_row;
use orgaco_core::{
    CellValue, ContactPart, Field, FieldChanges, LoadSource, ManualClock, Record, RecordRepository,
    RecordStore, RepoError, Role, SheetClient, SheetError, SheetRecordRepository, StoreError,
    WorkbookFile, WriteGate, DEFAULT_WORKSHEET,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const DEADLINE: Duration = Duration::from_secs(5);

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
}

fn text(value: &str) -> CellValue {
    CellValue::from(value)
}

fn seeded_workbook(dir: &tempfile::TempDir) -> WorkbookFile {
    let workbook = WorkbookFile::new(dir.path().join("orgaco.json"));
    let mut lions = vec![CellValue::Empty; Field::ALL.len()];
    lions[0] = text("Lions Club");
    lions[1] = text("Ana");
    lions[10] = CellValue::Number(2023.0);
    lions[11] = text("2024-11-02 09:30:00");
    workbook
        .write_values(DEFAULT_WORKSHEET, vec![header_row(), lions])
        .unwrap();
    workbook
}

/// Delegates to a workbook but can be told to fail or stall.
#[derive(Clone)]
struct FlakySheet {
    inner: WorkbookFile,
    fail_writes: Arc<AtomicBool>,
    stall: Option<Duration>,
    stall_writes: Option<Duration>,
}

impl FlakySheet {
    fn new(inner: WorkbookFile) -> Self {
        Self {
            inner,
            fail_writes: Arc::new(AtomicBool::new(false)),
            stall: None,
            stall_writes: None,
        }
    }
}

impl SheetClient for FlakySheet {
    fn read_values(&self, worksheet: &str) -> Result<Vec<Vec<CellValue>>, SheetError> {
        if let Some(stall) = self.stall {
            thread::sleep(stall);
        }
        self.inner.read_values(worksheet)
    }

    fn write_values_gated(
        &self,
        worksheet: &str,
        values: Vec<Vec<CellValue>>,
        gate: &WriteGate,
    ) -> Result<(), SheetError> {
        if let Some(stall) = self.stall_writes {
            thread::sleep(stall);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SheetError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "sheet is read-only",
            )));
        }
        self.inner.write_values_gated(worksheet, values, gate)
    }
}

#[test]
fn fetch_all_coerces_cell_types() {
    let dir = tempfile::tempdir().unwrap();
    let repo = SheetRecordRepository::new(seeded_workbook(&dir), DEFAULT_WORKSHEET, DEADLINE);

    let records = repo.fetch_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].group_name, "Lions Club");
    assert_eq!(records[0].contacts.president.name, "Ana");
    assert_eq!(records[0].last_fee_paid_year, 2023);
    assert_eq!(records[0].last_updated, NaiveDate::from_ymd_opt(2024, 11, 2));
    assert_eq!(records[0].surrogate_id, None);
}

#[test]
fn fetch_all_fills_columns_missing_from_the_header() {
    let dir = tempfile::tempdir().unwrap();
    let workbook = WorkbookFile::new(dir.path().join("legacy.json"));
    workbook
        .write_values(
            "Groups",
            vec![
                vec![text("Group_Association"), text("Last_Fee_Paid_Year")],
                vec![text("Rotary"), text("")],
            ],
        )
        .unwrap();

    let repo = SheetRecordRepository::new(workbook, "Groups", DEADLINE);
    let records = repo.fetch_all().unwrap();
    assert_eq!(records, vec![Record::new("Rotary", 0)]);
}

#[test]
fn unknown_worksheet_is_backend_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let repo = SheetRecordRepository::new(seeded_workbook(&dir), "Missing", DEADLINE);
    let mut store = RecordStore::with_clock(repo, ManualClock::new(today()));

    let outcome = store.load();
    assert_eq!(outcome.source, LoadSource::Unavailable);
    assert!(matches!(
        outcome.failure,
        Some(StoreError::BackendUnavailable(RepoError::Sheet(
            SheetError::UnknownWorksheet(_)
        )))
    ));
}

#[test]
fn slow_sheet_read_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = FlakySheet::new(seeded_workbook(&dir));
    client.stall = Some(Duration::from_millis(500));
    let repo = SheetRecordRepository::new(client, DEFAULT_WORKSHEET, Duration::from_millis(20));

    assert!(matches!(
        repo.fetch_all(),
        Err(RepoError::Timeout {
            operation: "sheet_read",
            ..
        })
    ));
}

#[test]
fn store_writes_whole_sheet_and_rereads_it() {
    let dir = tempfile::tempdir().unwrap();
    let workbook = seeded_workbook(&dir);
    let repo = SheetRecordRepository::new(workbook.clone(), DEFAULT_WORKSHEET, DEADLINE);
    let mut store = RecordStore::with_clock(repo, ManualClock::new(today()));
    store.load();

    store
        .update_record(
            "Lions Club",
            &FieldChanges::new().with(Field::LastFeePaidYear, "2024"),
        )
        .unwrap();
    store.insert_record(Record::new("Rotary", 2025)).unwrap();

    let grid = workbook.read_values(DEFAULT_WORKSHEET).unwrap();
    assert_eq!(grid.len(), 3);
    assert_eq!(grid[0], header_row());
    assert_eq!(grid[1][10], CellValue::Integer(2024));
    assert_eq!(grid[1][11], text("2025-06-15"));
    assert_eq!(grid[2][0], text("Rotary"));

    let reloaded = store.load();
    assert_eq!(reloaded.source, LoadSource::Backend);
    assert_eq!(
        store.list_group_names(),
        vec!["Lions Club".to_string(), "Rotary".to_string()]
    );
    let mut expected = Record::new("Rotary", 2025);
    expected.last_updated = Some(today());
    assert_eq!(store.find_by_group_name("Rotary").unwrap(), &expected);
}

#[test]
fn failed_sheet_write_keeps_previous_document() {
    let dir = tempfile::tempdir().unwrap();
    let workbook = seeded_workbook(&dir);
    let client = FlakySheet::new(workbook.clone());
    let fail_writes = Arc::clone(&client.fail_writes);
    let repo = SheetRecordRepository::new(client, DEFAULT_WORKSHEET, DEADLINE);
    let mut store = RecordStore::with_clock(repo, ManualClock::new(today()));
    let before = store.load().records;

    fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(
        store.insert_record(Record::new("Rotary", 2024)),
        Err(StoreError::InsertFailed { .. })
    ));
    assert!(matches!(
        store.update_record(
            "Lions Club",
            &FieldChanges::new().with(Field::LastFeePaidYear, "2024"),
        ),
        Err(StoreError::UpdateFailed { .. })
    ));

    let reloaded = store.refresh();
    assert_eq!(reloaded.records, before);
    assert_eq!(workbook.read_values(DEFAULT_WORKSHEET).unwrap().len(), 2);
}

#[test]
fn rows_without_group_name_survive_unrelated_writes() {
    let dir = tempfile::tempdir().unwrap();
    let workbook = seeded_workbook(&dir);
    let mut grid = workbook.read_values(DEFAULT_WORKSHEET).unwrap();
    let mut draft = vec![CellValue::Empty; Field::ALL.len()];
    draft[1] = text("Pending President");
    draft[2] = text("pending@lions.example");
    grid.insert(1, draft.clone());
    workbook.write_values(DEFAULT_WORKSHEET, grid).unwrap();

    let repo = SheetRecordRepository::new(workbook.clone(), DEFAULT_WORKSHEET, DEADLINE);
    let mut store = RecordStore::with_clock(repo, ManualClock::new(today()));
    let loaded = store.load();
    assert_eq!(loaded.records.len(), 1);
    assert_eq!(store.list_group_names(), vec!["Lions Club".to_string()]);

    store.insert_record(Record::new("Rotary", 2024)).unwrap();
    store
        .update_record("Lions Club", &FieldChanges::new().with(Field::LastFeePaidYear, "2024"))
        .unwrap();

    let written = workbook.read_values(DEFAULT_WORKSHEET).unwrap();
    assert_eq!(written.len(), 4);
    assert_eq!(written[1], draft);
    assert_eq!(written[2][0], text("Lions Club"));
    assert_eq!(written[2][10], CellValue::Integer(2024));
    assert_eq!(written[3][0], text("Rotary"));
}

#[test]
fn extra_header_columns_are_written_back() {
    let dir = tempfile::tempdir().unwrap();
    let workbook = WorkbookFile::new(dir.path().join("orgaco.json"));
    let mut header = header_row();
    header.insert(1, text("Region"));
    let mut lions = vec![CellValue::Empty; header.len()];
    lions[0] = text("Lions Club");
    lions[1] = text("North");
    lions[11] = CellValue::Integer(2023);
    workbook
        .write_values(DEFAULT_WORKSHEET, vec![header, lions])
        .unwrap();

    let repo = SheetRecordRepository::new(workbook.clone(), DEFAULT_WORKSHEET, DEADLINE);
    let mut store = RecordStore::with_clock(repo, ManualClock::new(today()));
    assert_eq!(store.load().records[0].last_fee_paid_year, 2023);

    store
        .update_record(
            "Lions Club",
            &FieldChanges::new().with(Field::Contact(Role::Treasurer, ContactPart::Name), "Bo"),
        )
        .unwrap();
    store.insert_record(Record::new("Rotary", 2024)).unwrap();

    let written = workbook.read_values(DEFAULT_WORKSHEET).unwrap();
    assert_eq!(written[0][..Field::ALL.len()], header_row()[..]);
    assert_eq!(written[0][Field::ALL.len()], text("Region"));
    assert_eq!(written[1][7], text("Bo"));
    assert_eq!(written[1][Field::ALL.len()], text("North"));
    assert_eq!(written[2][0], text("Rotary"));
    assert_eq!(written[2][Field::ALL.len()], CellValue::Empty);
}

#[test]
fn write_past_its_deadline_never_lands() {
    let dir = tempfile::tempdir().unwrap();
    let workbook = seeded_workbook(&dir);
    let mut client = FlakySheet::new(workbook.clone());
    client.stall_writes = Some(Duration::from_millis(300));
    let repo = SheetRecordRepository::new(client, DEFAULT_WORKSHEET, Duration::from_millis(50));
    let mut store = RecordStore::with_clock(repo, ManualClock::new(today()));
    let before = store.load().records;

    let result = store.update_record(
        "Lions Club",
        &FieldChanges::new().with(Field::LastFeePaidYear, "2024"),
    );
    assert!(matches!(
        result,
        Err(StoreError::UpdateFailed {
            source: RepoError::Timeout {
                operation: "sheet_write",
                ..
            },
            ..
        })
    ));

    thread::sleep(Duration::from_millis(500));
    let reloaded = store.refresh();
    assert_eq!(reloaded.records, before);
    assert_eq!(
        store.find_by_group_name("Lions Club").unwrap().last_fee_paid_year,
        2023
    );
}
