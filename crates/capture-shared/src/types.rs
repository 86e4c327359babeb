use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SharedError;

// ---------------------------------------------------------------------------
// Field kinds
// ---------------------------------------------------------------------------

/// The kinds of document fields that can carry an illustrative photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    SanitationSteps,
    PreOperationalChecks,
    InspectionPoints,
    ChemicalsUsed,
    EquipmentParts,
    SafetyPrecautions,
}

impl FieldType {
    pub const ALL: [FieldType; 6] = [
        FieldType::SanitationSteps,
        FieldType::PreOperationalChecks,
        FieldType::InspectionPoints,
        FieldType::ChemicalsUsed,
        FieldType::EquipmentParts,
        FieldType::SafetyPrecautions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::SanitationSteps => "sanitationSteps",
            FieldType::PreOperationalChecks => "preOperationalChecks",
            FieldType::InspectionPoints => "inspectionPoints",
            FieldType::ChemicalsUsed => "chemicalsUsed",
            FieldType::EquipmentParts => "equipmentParts",
            FieldType::SafetyPrecautions => "safetyPrecautions",
        }
    }

    pub fn category(&self) -> ImageCategory {
        match self {
            FieldType::SanitationSteps | FieldType::ChemicalsUsed | FieldType::EquipmentParts => {
                ImageCategory::Cleaning
            }
            FieldType::PreOperationalChecks | FieldType::InspectionPoints => {
                ImageCategory::Inspection
            }
            FieldType::SafetyPrecautions => ImageCategory::Other,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|ft| ft.as_str() == s)
            .ok_or_else(|| SharedError::UnknownFieldType(s.to_string()))
    }
}

/// Informational grouping of captures, derived from the field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    Cleaning,
    Inspection,
    Other,
}

// ---------------------------------------------------------------------------
// Sync status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Uploading,
    Synced,
    Failed,
    /// Retry cap reached or the remote rejected the item for good. Drains
    /// skip it until the user retries it by hand.
    NeedsAttention,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Uploading => "uploading",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
            SyncStatus::NeedsAttention => "needs_attention",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Field key
// ---------------------------------------------------------------------------

/// Address of one indexed slot inside a structured document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub document_id: String,
    pub field_type: FieldType,
    pub field_index: usize,
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}[{}]", self.document_id, self.field_type, self.field_index)
    }
}

// ---------------------------------------------------------------------------
// LocalImage
// ---------------------------------------------------------------------------

/// A captured photo waiting to be uploaded and attached to its document field.
///
/// Serialized with camelCase keys, one record per entry of the persisted
/// queue array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalImage {
    pub id: String,
    pub document_id: String,
    pub document_number: String,
    pub field_type: FieldType,
    pub field_index: usize,
    pub field_name: String,
    pub local_uri: String,
    pub sync_status: SyncStatus,
    pub captured_at: DateTime<Utc>,
    pub retry_count: u32,
    pub category: ImageCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl LocalImage {
    /// Build a fresh `pending` capture with a zero retry count.
    pub fn new(
        document_id: impl Into<String>,
        document_number: impl Into<String>,
        field_type: FieldType,
        field_index: usize,
        field_name: impl Into<String>,
        local_uri: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let document_id = document_id.into();
        let id = Self::make_id(&document_id, field_type, field_index, captured_at);
        Self {
            id,
            document_id,
            document_number: document_number.into(),
            field_type,
            field_index,
            field_name: field_name.into(),
            local_uri: local_uri.into(),
            sync_status: SyncStatus::Pending,
            captured_at,
            retry_count: 0,
            category: field_type.category(),
            last_error: None,
        }
    }

    pub fn make_id(
        document_id: &str,
        field_type: FieldType,
        field_index: usize,
        captured_at: DateTime<Utc>,
    ) -> String {
        format!(
            "{}_{}_{}_{}",
            document_id,
            field_type,
            field_index,
            captured_at.timestamp_millis()
        )
    }

    pub fn key(&self) -> FieldKey {
        FieldKey {
            document_id: self.document_id.clone(),
            field_type: self.field_type,
            field_index: self.field_index,
        }
    }

    pub fn is_same_field(&self, other: &LocalImage) -> bool {
        self.document_id == other.document_id
            && self.field_type == other.field_type
            && self.field_index == other.field_index
    }

    /// Whether a drain should pick this item up.
    pub fn is_retryable(&self) -> bool {
        self.sync_status != SyncStatus::NeedsAttention
    }

    /// Record one failed attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.sync_status = SyncStatus::Failed;
        self.last_error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> LocalImage {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        LocalImage::new(
            "doc1",
            "SCI-001",
            FieldType::SanitationSteps,
            0,
            "Rinse conveyor",
            "/data/captures/doc1.jpg",
            at,
        )
    }

    #[test]
    fn test_new_image_is_pending_with_derived_fields() {
        let img = sample();
        assert_eq!(img.sync_status, SyncStatus::Pending);
        assert_eq!(img.retry_count, 0);
        assert_eq!(img.category, ImageCategory::Cleaning);
        assert_eq!(img.id, "doc1_sanitationSteps_0_1709281800000");
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["documentId"], "doc1");
        assert_eq!(json["fieldType"], "sanitationSteps");
        assert_eq!(json["syncStatus"], "pending");
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["category"], "cleaning");
        assert!(json.get("lastError").is_none());
    }

    #[test]
    fn test_record_failure_bumps_retry_count() {
        let mut img = sample();
        img.record_failure("timeout");
        img.record_failure("timeout");
        assert_eq!(img.retry_count, 2);
        assert_eq!(img.sync_status, SyncStatus::Failed);
        assert_eq!(img.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_field_type_parsing() {
        assert_eq!(
            "inspectionPoints".parse::<FieldType>().unwrap(),
            FieldType::InspectionPoints
        );
        assert_eq!(
            "nope".parse::<FieldType>(),
            Err(SharedError::UnknownFieldType("nope".into()))
        );
        assert_eq!(FieldType::SafetyPrecautions.category(), ImageCategory::Other);
        assert_eq!(
            FieldType::PreOperationalChecks.category(),
            ImageCategory::Inspection
        );
    }

    #[test]
    fn test_same_field_ignores_capture_time() {
        let a = sample();
        let mut b = sample();
        b.captured_at = b.captured_at + chrono::Duration::seconds(5);
        b.id = LocalImage::make_id("doc1", FieldType::SanitationSteps, 0, b.captured_at);
        assert!(a.is_same_field(&b));
        assert_ne!(a.id, b.id);
    }
}
