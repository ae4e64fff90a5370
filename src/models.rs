//! Core data models.
//!
//! [`File`] and [`Tag`] are what every store operation returns; the request
//! types ([`NewFile`], [`FileUpdate`], [`Identity`]) are what callers pass
//! in. Tags are always loaded alongside their file and never addressed on
//! their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::codec::{self, TagValue};

/// Tag key → arbitrary value, as supplied by callers.
pub type TagMap = BTreeMap<String, Value>;

/// One typed key/value attribute attached to a file.
#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    pub key: String,
    /// Stored text form of the value.
    pub value: String,
    /// Stored type discriminator (`integer`, `float`, `boolean`, `string`, `null`).
    pub value_type: String,
    /// The value decoded through its discriminator.
    pub typed_value: TagValue,
}

impl Tag {
    pub fn from_stored(id: i64, key: String, value: String, value_type: String) -> Self {
        let typed_value = codec::decode(&value, &value_type);
        Self {
            id,
            key,
            value,
            value_type,
            typed_value,
        }
    }
}

/// Metadata record for one tracked path.
#[derive(Debug, Clone, Serialize)]
pub struct File {
    pub id: i64,
    pub filename: String,
    pub filepath: String,
    pub owner: Option<i64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub inferred_tags: serde_json::Map<String, Value>,
    pub tags: Vec<Tag>,
}

impl File {
    pub fn tag(&self, key: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.key == key)
    }
}

/// An account that can own files.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub credential_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a file record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFile {
    pub filepath: String,
    #[serde(default)]
    pub custom_tags: TagMap,
}

impl NewFile {
    pub fn new(filepath: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            custom_tags: TagMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_tags.insert(key.into(), value.into());
        self
    }
}

/// Input for updating a file record.
///
/// Tag changes apply in a fixed order: with `overwrite_existing` every tag
/// is removed first and `tags_to_remove` is ignored; otherwise only the
/// listed keys are removed. `tags_to_add_modify` is applied last.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileUpdate {
    #[serde(default)]
    pub tags_to_add_modify: Option<TagMap>,
    #[serde(default)]
    pub tags_to_remove: Option<Vec<String>>,
    #[serde(default)]
    pub new_filepath: Option<String>,
    #[serde(default)]
    pub overwrite_existing: bool,
}

/// Who is asking. Both fields are optional; an anonymous create records
/// the configured default `created_by` and no owner.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub owner_id: Option<i64>,
    pub created_by: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn owner(owner_id: i64) -> Self {
        Self {
            owner_id: Some(owner_id),
            created_by: None,
        }
    }
}

/// Input for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub credential_hash: String,
    #[serde(default)]
    pub role: Option<String>,
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
