use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};
use uuid::Uuid;

/// A single tracked perishable.
///
/// Serialised with camelCase keys so the persisted array keeps the layout
/// `{id, name, category, purchaseDate, expiryDate, note?, createdAt, updatedAt}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(with = "calendar_date")]
    pub purchase_date: Date,
    #[serde(with = "calendar_date")]
    pub expiry_date: Date,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_note"
    )]
    pub note: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "timestamp")]
    pub updated_at: OffsetDateTime,
}

impl Item {
    /// Builds a fresh record with a generated id and `created_at == updated_at == now`.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        purchase_date: Date,
        expiry_date: Date,
        note: Option<String>,
        now: OffsetDateTime,
    ) -> Self {
        let name: String = name.into();
        let category: String = category.into();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_owned(),
            category: category.trim().to_owned(),
            purchase_date,
            expiry_date,
            note: normalize_note(note),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.category.trim().is_empty() {
            return Err(ValidationError::EmptyCategory);
        }
        if self.expiry_date < self.purchase_date {
            return Err(ValidationError::ExpiryBeforePurchase {
                purchase: self.purchase_date,
                expiry: self.expiry_date,
            });
        }
        if self.updated_at < self.created_at {
            return Err(ValidationError::UpdatedBeforeCreated);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("item id cannot be empty")]
    EmptyId,
    #[error("item name cannot be empty")]
    EmptyName,
    #[error("item category cannot be empty")]
    EmptyCategory,
    #[error("expiry date {expiry} is before purchase date {purchase}")]
    ExpiryBeforePurchase { purchase: Date, expiry: Date },
    #[error("updated timestamp precedes creation timestamp")]
    UpdatedBeforeCreated,
    #[error("an item with id '{0}' already exists")]
    DuplicateId(String),
    #[error("shelf life cannot be negative (got {0} days)")]
    NegativeShelfLife(i64),
    #[error("date falls outside the supported calendar range")]
    DateOutOfRange,
    #[error("'{0}' is not a valid date (expected YYYY-MM-DD)")]
    InvalidDate(String),
}

/// Blank notes are stored as absent.
pub fn normalize_note(note: Option<String>) -> Option<String> {
    note.filter(|text| !text.trim().is_empty())
}

/// Offset of the machine's wall clock, or UTC when it cannot be determined.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Parses `YYYY-MM-DD`, or an RFC 3339 timestamp read as a calendar day in the local offset.
pub fn parse_date(input: &str) -> Result<Date, ValidationError> {
    parse_date_in(input, local_offset())
}

/// Like [`parse_date`], with timestamps placed on the calendar of `offset`.
pub fn parse_date_in(input: &str, offset: UtcOffset) -> Result<Date, ValidationError> {
    let trimmed = input.trim();
    if let Ok(date) = Date::parse(trimmed, format_description!("[year]-[month]-[day]")) {
        return Ok(date);
    }
    OffsetDateTime::parse(trimmed, &Rfc3339)
        .map(|instant| instant.to_offset(offset).date())
        .map_err(|_| ValidationError::InvalidDate(trimmed.to_owned()))
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

pub(crate) fn parse_timestamp(input: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(input, &Rfc3339)
}

pub(crate) fn format_timestamp(instant: OffsetDateTime) -> Result<String, time::error::Format> {
    instant.format(&Rfc3339)
}

fn deserialize_note<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(normalize_note(raw))
}

mod calendar_date {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(D::Error::custom)
    }
}

mod timestamp {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(
        instant: &OffsetDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let formatted = super::format_timestamp(*instant).map_err(S::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(D::Error::custom)
    }
}
