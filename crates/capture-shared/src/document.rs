//! Client-side mirror of the structured documents held by the remote store.
//!
//! The remote document store stays the system of record for
//! `content.<fieldType>[index].imageUrl`; this view only lets the UI show a
//! freshly synced photo without reloading every document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SharedError;
use crate::types::FieldType;

/// One entry of an indexed document field (a sanitation step, an
/// inspection point, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Any other keys the remote document carries for this entry.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    #[serde(default)]
    pub captured_images: u32,
}

/// `content` of a document.
///
/// Keys naming a [`FieldType`] are parsed into typed entries; any other key
/// (`areaName`, free-text notes, ...) is kept as raw JSON so the document
/// survives a round trip unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct DocumentContent {
    fields: BTreeMap<FieldType, Vec<FieldEntry>>,
    other: Map<String, Value>,
}

impl DocumentContent {
    pub fn field(&self, field_type: FieldType) -> Option<&[FieldEntry]> {
        self.fields.get(&field_type).map(Vec::as_slice)
    }

    pub fn field_mut(&mut self, field_type: FieldType) -> Option<&mut Vec<FieldEntry>> {
        self.fields.get_mut(&field_type)
    }

    /// Non-photo keys of the content object.
    pub fn other(&self) -> &Map<String, Value> {
        &self.other
    }
}

impl TryFrom<Map<String, Value>> for DocumentContent {
    type Error = serde_json::Error;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut content = Self::default();
        for (key, value) in map {
            match key.parse::<FieldType>() {
                Ok(field_type) => {
                    content
                        .fields
                        .insert(field_type, serde_json::from_value(value)?);
                }
                Err(_) => {
                    content.other.insert(key, value);
                }
            }
        }
        Ok(content)
    }
}

impl From<DocumentContent> for Map<String, Value> {
    fn from(content: DocumentContent) -> Self {
        let mut map = content.other;
        for (field_type, entries) in content.fields {
            if let Ok(value) = serde_json::to_value(entries) {
                map.insert(field_type.to_string(), value);
            }
        }
        map
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub document_number: String,
    #[serde(default)]
    pub content: DocumentContent,
    #[serde(default)]
    pub stats: DocumentStats,
    /// Top-level keys this crate does not interpret (`title`, audit fields, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, document_number: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document_number: document_number.into(),
            ..Default::default()
        }
    }

    /// Append an entry to a field, returning its index.
    pub fn push_entry(&mut self, field_type: FieldType, entry: FieldEntry) -> usize {
        let entries = self.content.fields.entry(field_type).or_default();
        entries.push(entry);
        entries.len() - 1
    }

    pub fn image_url(&self, field_type: FieldType, index: usize) -> Option<&str> {
        self.content
            .field(field_type)
            .and_then(|entries| entries.get(index))
            .and_then(|entry| entry.image_url.as_deref())
    }

    /// Point an existing field entry at an uploaded image and count the capture.
    ///
    /// Leaves the document untouched when the entry does not exist.
    pub fn attach_image(
        &mut self,
        field_type: FieldType,
        index: usize,
        url: &str,
    ) -> Result<(), SharedError> {
        let out_of_range = |len| SharedError::FieldIndexOutOfRange {
            field_type: field_type.to_string(),
            index,
            len,
        };
        let entries = self
            .content
            .field_mut(field_type)
            .ok_or_else(|| out_of_range(0))?;
        let len = entries.len();
        let entry = entries.get_mut(index).ok_or_else(|| out_of_range(len))?;
        entry.image_url = Some(url.to_string());
        self.stats.captured_images += 1;
        Ok(())
    }
}
