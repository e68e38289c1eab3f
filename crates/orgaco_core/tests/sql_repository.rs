use chrono::NaiveDate;
use orgaco_core::db::open_db_in_memory;
use orgaco_core::{
    Contact, ContactPart, Field, FieldChanges, ManualClock, Record, RecordRepository,
    RecordStore, RepoError, Role, SqliteRecordRepository, StoreError, WriteOp,
};
use rusqlite::{params, Connection};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
}

fn raw_column(conn: &Connection, group: &str, column: &str) -> Option<String> {
    conn.query_row(
        &format!("SELECT CAST(\"{column}\" AS TEXT) FROM \"dbORGACO\" WHERE \"Group_Association\" = ?1;"),
        [group],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    assert!(matches!(
        SqliteRecordRepository::try_new(&conn),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn fetch_all_normalizes_sparse_rows_in_insertion_order() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO \"dbORGACO\" (\"Group_Association\") VALUES (?1);",
        ["Rotary"],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO \"dbORGACO\" (\"Group_Association\", \"Last_Fee_Paid_Year\", \"Web_Data_Updated\", \"President_Email\")
         VALUES (?1, ?2, ?3, ?4);",
        params!["Lions Club", "2023.0", "2024/01/31", "ana@lions.example"],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO \"dbORGACO\" (\"Group_Association\", \"Last_Fee_Paid_Year\", \"Web_Data_Updated\")
         VALUES (?1, ?2, ?3);",
        params!["Book Club", "unknown", "not a date"],
    )
    .unwrap();

    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let records = repo.fetch_all().unwrap();

    let names: Vec<&str> = records.iter().map(|r| r.group_name.as_str()).collect();
    assert_eq!(names, vec!["Rotary", "Lions Club", "Book Club"]);

    assert_eq!(records[0].surrogate_id, Some(1));
    assert_eq!(records[0].last_fee_paid_year, 0);
    assert_eq!(records[0].contacts.president, Contact::default());

    assert_eq!(records[1].last_fee_paid_year, 2023);
    assert_eq!(records[1].last_updated, NaiveDate::from_ymd_opt(2024, 1, 31));
    assert_eq!(records[1].contacts.president.email, "ana@lions.example");

    assert_eq!(records[2].last_fee_paid_year, 0);
    assert_eq!(records[2].last_updated, None);
}

#[test]
fn update_only_touches_listed_columns() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let mut record = Record::new("Lions Club", 2023);
    record.contacts.treasurer.name = "Old".to_string();
    let receipt = repo
        .persist(&[], &WriteOp::Insert { record: &record })
        .unwrap();
    record.surrogate_id = receipt.inserted_id;

    // Simulate another writer touching a column this update does not own.
    conn.execute(
        "UPDATE \"dbORGACO\" SET \"Treasurer_Name\" = 'Concurrent' WHERE \"id\" = ?1;",
        [record.surrogate_id.unwrap()],
    )
    .unwrap();

    record.last_fee_paid_year = 2024;
    let fields = [Field::LastFeePaidYear];
    repo.persist(
        &[],
        &WriteOp::Update {
            record: &record,
            fields: &fields,
        },
    )
    .unwrap();

    assert_eq!(
        raw_column(&conn, "Lions Club", "Last_Fee_Paid_Year").as_deref(),
        Some("2024")
    );
    assert_eq!(
        raw_column(&conn, "Lions Club", "Treasurer_Name").as_deref(),
        Some("Concurrent")
    );
}

#[test]
fn update_refuses_business_key_column_and_missing_ids() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let record = Record::new("Lions Club", 2023);
    let fields = [Field::LastFeePaidYear];
    assert!(matches!(
        repo.persist(&[], &WriteOp::Update { record: &record, fields: &fields }),
        Err(RepoError::InvalidData(_))
    ));

    let mut with_id = record.clone();
    with_id.surrogate_id = Some(1);
    let key_fields = [Field::GroupName];
    assert!(matches!(
        repo.persist(&[], &WriteOp::Update { record: &with_id, fields: &key_fields }),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn store_round_trip_over_sqlite_assigns_surrogate_ids() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let mut store = RecordStore::with_clock(repo, ManualClock::new(today()));

    let lions = Record::new("Lions Club", 2023).with_contact(
        Role::President,
        Contact {
            name: "Ana".to_string(),
            email: "ana@lions.example".to_string(),
            phone: "600 000 000".to_string(),
        },
    );
    let snapshot = store.insert_record(lions.clone()).unwrap();
    let id = snapshot[0].surrogate_id.expect("insert assigns an id");

    let changes = FieldChanges::new()
        .with(Field::LastFeePaidYear, "2024")
        .with(Field::Contact(Role::Secretary, ContactPart::Name), "Luis");
    store.update_record("Lions Club", &changes).unwrap();

    let reloaded = store.refresh();
    assert!(reloaded.is_ok());
    let stored = &reloaded.records[0];
    assert_eq!(stored.surrogate_id, Some(id));
    assert_eq!(stored.contacts.president, lions.contacts.president);
    assert_eq!(stored.contacts.secretary.name, "Luis");
    assert_eq!(stored.last_fee_paid_year, 2024);
    assert_eq!(stored.last_updated, Some(today()));
    assert_eq!(
        raw_column(&conn, "Lions Club", "Web_Data_Updated").as_deref(),
        Some("2025-06-15")
    );
}

#[test]
fn store_update_of_row_deleted_behind_its_back_fails_and_rolls_back() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let mut store = RecordStore::with_clock(repo, ManualClock::new(today()));
    store.insert_record(Record::new("Lions Club", 2023)).unwrap();
    store.load();

    conn.execute("DELETE FROM \"dbORGACO\";", []).unwrap();

    let err = store
        .update_record(
            "Lions Club",
            &FieldChanges::new().with(Field::LastFeePaidYear, "2024"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::UpdateFailed {
            source: RepoError::MissingRow(_),
            ..
        }
    ));
    assert!(store.refresh().records.is_empty());
}

#[test]
fn store_insert_hitting_unique_constraint_reports_insert_failed() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let mut store = RecordStore::with_clock(repo, ManualClock::new(today()));
    store.load();

    // Another process adds the same group after our cached read.
    conn.execute(
        "INSERT INTO \"dbORGACO\" (\"Group_Association\") VALUES (?1);",
        ["Rotary"],
    )
    .unwrap();

    assert!(matches!(
        store.insert_record(Record::new("Rotary", 2024)),
        Err(StoreError::InsertFailed {
            source: RepoError::Db(_),
            ..
        })
    ));
    let reloaded = store.load();
    assert_eq!(reloaded.records.len(), 1);
    assert_eq!(reloaded.records[0].last_fee_paid_year, 0);
}
