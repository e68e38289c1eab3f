//! Command-line shell over the group record store.
//!
//! # Responsibility
//! - Stand in for the search/edit and add-group forms.
//! - Keep all record rules inside `orgaco_core`; this binary only parses
//!   arguments and prints outcomes.

use clap::{Args, Parser, Subcommand};
use orgaco_core::db::open_db;
use orgaco_core::{
    default_log_level, init_logging, AppConfig, BackendConfig, Contact, Field, FieldChanges,
    Record, RecordRepository, RecordStore, Role, SheetRecordRepository, SqliteRecordRepository,
    StoreError, WorkbookFile,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "orgaco", version, about = "Search, edit and add group association records")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "orgaco.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the group table or worksheet if it does not exist yet.
    Init,
    /// List all group names.
    List,
    /// Show the details of one group.
    Show {
        group: String,
        /// Print the record as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Change fields of an existing group.
    Update {
        group: String,
        /// Column assignment such as `Last_Fee_Paid_Year=2024`.
        #[arg(long = "set", value_name = "COLUMN=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Add a new group.
    Add(AddArgs),
}

#[derive(Debug, Args)]
struct AddArgs {
    group: String,
    #[arg(long)]
    fee_year: i32,
    #[arg(long, default_value = "")]
    president_name: String,
    #[arg(long, default_value = "")]
    president_email: String,
    #[arg(long, default_value = "")]
    president_contact: String,
    #[arg(long, default_value = "")]
    secretary_name: String,
    #[arg(long, default_value = "")]
    secretary_email: String,
    #[arg(long, default_value = "")]
    secretary_contact: String,
    #[arg(long, default_value = "")]
    treasurer_name: String,
    #[arg(long, default_value = "")]
    treasurer_email: String,
    #[arg(long, default_value = "")]
    treasurer_contact: String,
}

impl AddArgs {
    fn into_record(self) -> Record {
        Record::new(self.group, self.fee_year)
            .with_contact(
                Role::President,
                Contact {
                    name: self.president_name,
                    email: self.president_email,
                    phone: self.president_contact,
                },
            )
            .with_contact(
                Role::Secretary,
                Contact {
                    name: self.secretary_name,
                    email: self.secretary_email,
                    phone: self.secretary_contact,
                },
            )
            .with_contact(
                Role::Treasurer,
                Contact {
                    name: self.treasurer_name,
                    email: self.treasurer_email,
                    phone: self.treasurer_contact,
                },
            )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load(&cli.config)?;
    if let Some(dir) = config.logging.dir.as_deref() {
        let level = config
            .logging
            .level
            .as_deref()
            .unwrap_or(default_log_level());
        init_logging(level, dir)?;
    }

    let ttl = config.store.cache_ttl();
    let io_timeout = config.store.io_timeout();
    match &config.backend {
        BackendConfig::Sqlite { path } => {
            let conn = open_db(path, io_timeout)?;
            if matches!(cli.command, Command::Init) {
                println!("Database ready at {}", path.display());
                return Ok(());
            }
            let repo = SqliteRecordRepository::try_new(&conn)?;
            execute(RecordStore::new(repo).with_ttl(ttl), cli.command)
        }
        BackendConfig::Sheet { path, worksheet } => {
            let workbook = WorkbookFile::new(path);
            if matches!(cli.command, Command::Init) {
                let header: Vec<&str> = Field::ALL.iter().map(|field| field.column()).collect();
                if workbook.ensure_worksheet(worksheet, &header)? {
                    println!("Created worksheet `{worksheet}` in {}", path.display());
                } else {
                    println!("Worksheet `{worksheet}` already exists in {}", path.display());
                }
                return Ok(());
            }
            let repo = SheetRecordRepository::new(workbook, worksheet.clone(), io_timeout);
            execute(RecordStore::new(repo).with_ttl(ttl), cli.command)
        }
    }
}

fn execute<R: RecordRepository>(
    mut store: RecordStore<R>,
    command: Command,
) -> Result<(), Box<dyn Error>> {
    if let Some(failure) = store.load().failure {
        return Err(failure.into());
    }

    match command {
        Command::Init => Ok(()),
        Command::List => {
            let names = store.list_group_names();
            if names.is_empty() {
                println!("No groups found.");
            }
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        Command::Show { group, json } => match store.find_by_group_name(&group) {
            Ok(record) if json => {
                println!("{}", serde_json::to_string_pretty(record)?);
                Ok(())
            }
            Ok(record) => {
                print_record(record);
                Ok(())
            }
            Err(StoreError::NotFound(name)) => {
                println!("No data found for group: {name}");
                Ok(())
            }
            Err(err) => Err(err.into()),
        },
        Command::Update { group, set } => {
            let pairs = set
                .iter()
                .map(|entry| {
                    entry
                        .split_once('=')
                        .ok_or_else(|| format!("expected COLUMN=VALUE, got `{entry}`"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let changes = FieldChanges::parse(pairs)?;
            store.update_record(&group, &changes)?;
            let updated = store.find_by_group_name(&group)?;
            println!(
                "Updated {} field(s) for {group}. Last updated: {}",
                changes.len(),
                updated.field_text(Field::LastUpdated)
            );
            Ok(())
        }
        Command::Add(args) => {
            let snapshot = store.insert_record(args.into_record())?;
            if let Some(added) = snapshot.last() {
                println!(
                    "Added group {}. Total records: {}",
                    added.group_name,
                    snapshot.len()
                );
            }
            Ok(())
        }
    }
}

fn print_record(record: &Record) {
    println!("Group: {}", record.group_name);
    if let Some(id) = record.surrogate_id {
        println!("Record ID: {id}");
    }
    for role in Role::ALL {
        let contact = record.contacts.get(role);
        println!(
            "{role}: {} | {} | {}",
            contact.name, contact.email, contact.phone
        );
    }
    println!("Last fee paid year: {}", record.last_fee_paid_year);
    println!(
        "Last updated: {}",
        record.field_text(Field::LastUpdated)
    );
}
