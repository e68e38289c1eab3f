//! Group record domain model.
//!
//! # Responsibility
//! - Define the fixed record shape shared by every storage variant.
//! - Own the column allow-list (`Field`) used by sheet headers and SQL writes.
//! - Validate field values before any persistence is attempted.
//!
//! # Invariants
//! - `group_name` is the business key and is never changed through updates.
//! - `last_updated` is system-managed and never set from caller input.
//! - `last_fee_paid_year` written by this crate stays within
//!   `[MIN_FEE_YEAR, current_year + 1]`.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;

/// Oldest fee year accepted on writes.
pub const MIN_FEE_YEAR: i32 = 1900;
/// Maximum group name length, in characters.
pub const MAX_GROUP_NAME_CHARS: usize = 100;
/// Maximum contact phone length, in characters.
pub const MAX_PHONE_CHARS: usize = 20;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9+()\-. ]*$").expect("valid phone regex"));

/// Primary key assigned by the relational variant.
pub type SurrogateId = i64;

/// Office holder slot on a group record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    President,
    Secretary,
    Treasurer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::President, Role::Secretary, Role::Treasurer];

    pub fn label(self) -> &'static str {
        match self {
            Self::President => "President",
            Self::Secretary => "Secretary",
            Self::Treasurer => "Treasurer",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One attribute of a contact slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContactPart {
    Name,
    Email,
    Phone,
}

/// Contact details for one role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl Contact {
    pub(crate) fn part(&self, part: ContactPart) -> &str {
        match part {
            ContactPart::Name => &self.name,
            ContactPart::Email => &self.email,
            ContactPart::Phone => &self.phone,
        }
    }

    pub(crate) fn part_mut(&mut self, part: ContactPart) -> &mut String {
        match part {
            ContactPart::Name => &mut self.name,
            ContactPart::Email => &mut self.email,
            ContactPart::Phone => &mut self.phone,
        }
    }
}

/// The three office holder slots of a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contacts {
    pub president: Contact,
    pub secretary: Contact,
    pub treasurer: Contact,
}

impl Contacts {
    pub fn get(&self, role: Role) -> &Contact {
        match role {
            Role::President => &self.president,
            Role::Secretary => &self.secretary,
            Role::Treasurer => &self.treasurer,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut Contact {
        match role {
            Role::President => &mut self.president,
            Role::Secretary => &mut self.secretary,
            Role::Treasurer => &mut self.treasurer,
        }
    }
}

/// Named column of the group dataset.
///
/// This enum is the only source of column identifiers used in sheet headers
/// and dynamically built SQL statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    GroupName,
    Contact(Role, ContactPart),
    LastFeePaidYear,
    LastUpdated,
}

impl Field {
    /// All columns in canonical header order.
    pub const ALL: [Field; 12] = [
        Field::GroupName,
        Field::Contact(Role::President, ContactPart::Name),
        Field::Contact(Role::President, ContactPart::Email),
        Field::Contact(Role::President, ContactPart::Phone),
        Field::Contact(Role::Secretary, ContactPart::Name),
        Field::Contact(Role::Secretary, ContactPart::Email),
        Field::Contact(Role::Secretary, ContactPart::Phone),
        Field::Contact(Role::Treasurer, ContactPart::Name),
        Field::Contact(Role::Treasurer, ContactPart::Email),
        Field::Contact(Role::Treasurer, ContactPart::Phone),
        Field::LastFeePaidYear,
        Field::LastUpdated,
    ];

    /// Column identifier as stored in the sheet header and SQL table.
    pub fn column(self) -> &'static str {
        match self {
            Self::GroupName => "Group_Association",
            Self::Contact(Role::President, ContactPart::Name) => "President_Name",
            Self::Contact(Role::President, ContactPart::Email) => "President_Email",
            Self::Contact(Role::President, ContactPart::Phone) => "President_Contact",
            Self::Contact(Role::Secretary, ContactPart::Name) => "Secretary_Name",
            Self::Contact(Role::Secretary, ContactPart::Email) => "Secretary_Email",
            Self::Contact(Role::Secretary, ContactPart::Phone) => "Secretary_Contact",
            Self::Contact(Role::Treasurer, ContactPart::Name) => "Treasurer_Name",
            Self::Contact(Role::Treasurer, ContactPart::Email) => "Treasurer_Email",
            Self::Contact(Role::Treasurer, ContactPart::Phone) => "Treasurer_Contact",
            Self::LastFeePaidYear => "Last_Fee_Paid_Year",
            Self::LastUpdated => "Web_Data_Updated",
        }
    }

    /// Resolves an exact column identifier.
    pub fn from_column(name: &str) -> Option<Field> {
        Self::ALL.into_iter().find(|field| field.column() == name)
    }

    /// Whether callers may change this field through an update.
    pub fn is_editable(self) -> bool {
        !matches!(self, Self::GroupName | Self::LastUpdated)
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// One group/association entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key; only populated by the relational variant.
    pub surrogate_id: Option<SurrogateId>,
    /// Business key, unique across the dataset.
    pub group_name: String,
    pub contacts: Contacts,
    /// Zero when the stored value was missing or unreadable.
    pub last_fee_paid_year: i32,
    /// Stamped by the store on every successful write.
    pub last_updated: Option<NaiveDate>,
}

impl Record {
    /// Creates a record with empty contacts and no update stamp.
    pub fn new(group_name: impl Into<String>, last_fee_paid_year: i32) -> Self {
        Self {
            surrogate_id: None,
            group_name: group_name.into(),
            contacts: Contacts::default(),
            last_fee_paid_year,
            last_updated: None,
        }
    }

    /// Builder-style contact assignment.
    pub fn with_contact(mut self, role: Role, contact: Contact) -> Self {
        *self.contacts.get_mut(role) = contact;
        self
    }

    /// Renders one field as text, the way it appears in a sheet cell.
    pub fn field_text(&self, field: Field) -> String {
        match field {
            Field::GroupName => self.group_name.clone(),
            Field::Contact(role, part) => self.contacts.get(role).part(part).to_string(),
            Field::LastFeePaidYear => self.last_fee_paid_year.to_string(),
            Field::LastUpdated => self
                .last_updated
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        }
    }

    /// Trims the group name and every contact value, as form input is.
    pub fn trim_text(&mut self) {
        self.group_name = self.group_name.trim().to_string();
        for role in Role::ALL {
            let contact = self.contacts.get_mut(role);
            for value in [&mut contact.name, &mut contact.email, &mut contact.phone] {
                *value = value.trim().to_string();
            }
        }
    }

    /// Validates every field, as required before inserting a new record.
    pub fn validate(&self, current_year: i32) -> Result<(), RecordValidationError> {
        validate_group_name(&self.group_name)?;
        for role in Role::ALL {
            let contact = self.contacts.get(role);
            validate_email(role, &contact.email)?;
            validate_phone(role, &contact.phone)?;
        }
        validate_fee_year(self.last_fee_paid_year, current_year)
    }

    /// Returns a copy with `changes` applied, or the first validation error.
    ///
    /// Nothing is applied when any change fails, so callers observe either
    /// the full change set or none of it.
    pub fn apply_changes(
        &self,
        changes: &FieldChanges,
        current_year: i32,
    ) -> Result<Record, RecordValidationError> {
        let mut next = self.clone();
        for (field, value) in changes.iter() {
            next.set_field(field, value, current_year)?;
        }
        Ok(next)
    }

    fn set_field(
        &mut self,
        field: Field,
        value: &str,
        current_year: i32,
    ) -> Result<(), RecordValidationError> {
        let value = value.trim();
        match field {
            Field::GroupName | Field::LastUpdated => {
                return Err(RecordValidationError::ImmutableField(field));
            }
            Field::Contact(role, part) => {
                match part {
                    ContactPart::Name => {}
                    ContactPart::Email => validate_email(role, value)?,
                    ContactPart::Phone => validate_phone(role, value)?,
                }
                *self.contacts.get_mut(role).part_mut(part) = value.to_string();
            }
            Field::LastFeePaidYear => {
                let year = value
                    .parse::<i32>()
                    .map_err(|_| RecordValidationError::InvalidYear(value.to_string()))?;
                validate_fee_year(year, current_year)?;
                self.last_fee_paid_year = year;
            }
        }
        Ok(())
    }
}

/// Pending field edits keyed by column.
///
/// Values are text, as entered in a form cell; they are parsed and validated
/// against each field's type when applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldChanges {
    values: BTreeMap<Field, String>,
}

impl FieldChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces one change.
    pub fn set(&mut self, field: Field, value: impl Into<String>) -> &mut Self {
        self.values.insert(field, value.into());
        self
    }

    /// Builder-style variant of [`FieldChanges::set`].
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Builds changes from `(column, value)` pairs, rejecting unknown columns.
    pub fn parse<I, K, V>(pairs: I) -> Result<Self, RecordValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut changes = Self::new();
        for (column, value) in pairs {
            let column = column.as_ref().trim();
            let field = Field::from_column(column)
                .ok_or_else(|| RecordValidationError::UnknownField(column.to_string()))?;
            changes.set(field, value);
        }
        Ok(changes)
    }

    /// Collects editable fields whose text differs between `before` and `after`.
    pub fn diff(before: &Record, after: &Record) -> Self {
        let mut changes = Self::new();
        for field in Field::ALL.into_iter().filter(|field| field.is_editable()) {
            let next = after.field_text(field);
            if before.field_text(field) != next {
                changes.set(field, next);
            }
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.values
            .iter()
            .map(|(field, value)| (*field, value.as_str()))
    }
}

/// Accepted fee year range for a given current year.
pub fn fee_year_bounds(current_year: i32) -> RangeInclusive<i32> {
    MIN_FEE_YEAR..=current_year + 1
}

fn validate_group_name(name: &str) -> Result<(), RecordValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RecordValidationError::EmptyGroupName);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_GROUP_NAME_CHARS {
        return Err(RecordValidationError::GroupNameTooLong {
            chars,
            max: MAX_GROUP_NAME_CHARS,
        });
    }
    Ok(())
}

fn validate_email(role: Role, email: &str) -> Result<(), RecordValidationError> {
    if email.is_empty() || EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(RecordValidationError::InvalidEmail(role))
    }
}

fn validate_phone(role: Role, phone: &str) -> Result<(), RecordValidationError> {
    let chars = phone.chars().count();
    if chars > MAX_PHONE_CHARS {
        return Err(RecordValidationError::PhoneTooLong {
            role,
            chars,
            max: MAX_PHONE_CHARS,
        });
    }
    if !PHONE_RE.is_match(phone) {
        return Err(RecordValidationError::InvalidPhone(role));
    }
    Ok(())
}

fn validate_fee_year(year: i32, current_year: i32) -> Result<(), RecordValidationError> {
    let bounds = fee_year_bounds(current_year);
    if bounds.contains(&year) {
        Ok(())
    } else {
        Err(RecordValidationError::FeeYearOutOfRange {
            year,
            min: *bounds.start(),
            max: *bounds.end(),
        })
    }
}

/// Field-level validation failures.
///
/// Contact values are deliberately absent from messages; only the role is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    EmptyGroupName,
    GroupNameTooLong { chars: usize, max: usize },
    FeeYearOutOfRange { year: i32, min: i32, max: i32 },
    InvalidYear(String),
    InvalidEmail(Role),
    InvalidPhone(Role),
    PhoneTooLong { role: Role, chars: usize, max: usize },
    ImmutableField(Field),
    UnknownField(String),
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyGroupName => write!(f, "group name cannot be empty"),
            Self::GroupNameTooLong { chars, max } => {
                write!(f, "group name has {chars} characters; at most {max} allowed")
            }
            Self::FeeYearOutOfRange { year, min, max } => {
                write!(f, "last fee paid year {year} is outside {min}..={max}")
            }
            Self::InvalidYear(value) => write!(f, "`{value}` is not a valid year"),
            Self::InvalidEmail(role) => write!(f, "{role} email is not a valid address"),
            Self::InvalidPhone(role) => write!(
                f,
                "{role} contact may only contain digits, spaces and + - ( ) ."
            ),
            Self::PhoneTooLong { role, chars, max } => write!(
                f,
                "{role} contact has {chars} characters; at most {max} allowed"
            ),
            Self::ImmutableField(field) => write!(f, "field `{field}` cannot be edited"),
            Self::UnknownField(name) => write!(f, "unknown field `{name}`"),
        }
    }
}

impl Error for RecordValidationError {}
