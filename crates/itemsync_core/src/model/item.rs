//! Item domain model.
//!
//! # Responsibility
//! - Define the record shared by the remote store and the local cache.
//! - Validate user input and persisted identity before it reaches storage.
//!
//! # Invariants
//! - `id` is assigned by the remote store and never reused for another item.
//! - `timestamp` is epoch milliseconds and is refreshed on every write.
//! - `timestamp` is a sync cursor, not a unique key.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Server-assigned document identifier.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type ItemId = String;

const MAX_ID_BYTES: usize = 1500;

/// Canonical item record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// `None` until the remote store has persisted the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    /// User-visible label.
    pub name: String,
    /// Unix epoch milliseconds of the last write.
    pub timestamp: i64,
}

/// Document fields written to the remote store and mirrored into the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFields {
    pub name: String,
    pub timestamp: i64,
}

/// Validation failures for item input and persisted item state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValidationError {
    /// Name is empty after trimming whitespace.
    BlankName,
    /// Timestamp is before the unix epoch.
    NegativeTimestamp(i64),
    /// A persisted item is missing its server-assigned id.
    MissingId,
    /// The id cannot address a document.
    InvalidId(String),
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "Please enter a valid name"),
            Self::NegativeTimestamp(value) => {
                write!(f, "timestamp must not be negative, got {value}")
            }
            Self::MissingId => write!(f, "item has no id"),
            Self::InvalidId(value) => write!(f, "invalid item id `{value}`"),
        }
    }
}

impl Error for ItemValidationError {}

impl Item {
    /// Creates an item that has not been persisted yet.
    pub fn new(name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: None,
            name: name.into(),
            timestamp,
        }
    }

    /// Creates an item with an id that already exists remotely.
    pub fn with_id(id: impl Into<ItemId>, name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            timestamp,
        }
    }

    /// Builds a persisted item from its id and document fields.
    pub fn from_fields(id: impl Into<ItemId>, fields: ItemFields) -> Self {
        Self {
            id: Some(id.into()),
            name: fields.name,
            timestamp: fields.timestamp,
        }
    }

    /// Returns the document fields of this item.
    pub fn fields(&self) -> ItemFields {
        ItemFields {
            name: self.name.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Returns the id, or `MissingId` when the item is not persisted.
    pub fn require_id(&self) -> Result<&str, ItemValidationError> {
        self.id.as_deref().ok_or(ItemValidationError::MissingId)
    }

    /// Validates an item about to be stored in the local cache.
    ///
    /// # Errors
    /// - `MissingId` / `InvalidId` when identity is absent or malformed.
    /// - `NegativeTimestamp` when the timestamp predates the epoch.
    ///
    /// Names are not re-checked here: remote documents written by other
    /// clients are mirrored as-is.
    pub fn validate_persisted(&self) -> Result<(), ItemValidationError> {
        validate_id(self.require_id()?)?;
        validate_timestamp(self.timestamp)
    }
}

impl ItemFields {
    /// Validates a write payload coming from user input.
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        validate_name(&self.name)?;
        validate_timestamp(self.timestamp)
    }
}

/// Rejects names that are blank after trimming.
pub fn validate_name(name: &str) -> Result<(), ItemValidationError> {
    if name.trim().is_empty() {
        return Err(ItemValidationError::BlankName);
    }
    Ok(())
}

/// Rejects ids that cannot address a Firestore document.
pub fn validate_id(id: &str) -> Result<(), ItemValidationError> {
    let invalid = id.is_empty()
        || id.contains('/')
        || id == "."
        || id == ".."
        || id.len() > MAX_ID_BYTES;
    if invalid {
        return Err(ItemValidationError::InvalidId(id.to_string()));
    }
    Ok(())
}

fn validate_timestamp(timestamp: i64) -> Result<(), ItemValidationError> {
    if timestamp < 0 {
        return Err(ItemValidationError::NegativeTimestamp(timestamp));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_id, validate_name, Item, ItemFields, ItemValidationError};

    #[test]
    fn blank_names_are_rejected() {
        assert_eq!(validate_name("   "), Err(ItemValidationError::BlankName));
        assert_eq!(validate_name("\t\n"), Err(ItemValidationError::BlankName));
        assert!(validate_name(" A ").is_ok());
    }

    #[test]
    fn ids_follow_document_id_rules() {
        assert!(validate_id("abc123").is_ok());
        for bad in ["", ".", "..", "a/b"] {
            assert!(
                matches!(validate_id(bad), Err(ItemValidationError::InvalidId(_))),
                "`{bad}` should be rejected"
            );
        }
        assert!(validate_id(&"x".repeat(1501)).is_err());
    }

    #[test]
    fn persisted_item_requires_id() {
        let unsaved = Item::new("A", 1);
        assert_eq!(
            unsaved.validate_persisted(),
            Err(ItemValidationError::MissingId)
        );

        let saved = Item::with_id("abc123", "A", 1);
        assert!(saved.validate_persisted().is_ok());
    }

    #[test]
    fn fields_roundtrip_through_item() {
        let fields = ItemFields {
            name: "A".to_string(),
            timestamp: 42,
        };
        let item = Item::from_fields("abc123", fields.clone());
        assert_eq!(item.id.as_deref(), Some("abc123"));
        assert_eq!(item.fields(), fields);
    }

    #[test]
    fn negative_timestamp_is_rejected() {
        let fields = ItemFields {
            name: "A".to_string(),
            timestamp: -1,
        };
        assert_eq!(
            fields.validate(),
            Err(ItemValidationError::NegativeTimestamp(-1))
        );
    }

    #[test]
    fn unsaved_item_serializes_without_id() {
        let json = serde_json::to_value(Item::new("A", 7)).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["timestamp"], 7);
    }
}
