//! Attachment metadata records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ids::{RecordId, UserId};

/// Metadata stored alongside an uploaded file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    /// File name under the uploads directory.
    pub filename: String,
    /// Declared MIME type.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Free-text context supplied with the upload.
    #[serde(default)]
    pub context: Option<String>,
    /// Size reported at upload time.
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl AttachmentMetadata {
    /// Metadata with only a filename.
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            context: None,
            size_bytes: None,
        }
    }

    /// Set the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Set the upload context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Read metadata from a loosely shaped JSON object.
    ///
    /// `filename` is required. Optional fields with the wrong type or blank
    /// strings fall back to `None`. Both `mimeType` and `mime_type` spellings
    /// are accepted.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let filename = non_blank(value.get("filename"))?;

        let mime_type = non_blank(value.get("mimeType").or_else(|| value.get("mime_type")));
        let context = non_blank(value.get("context"));
        let size_bytes = value
            .get("size")
            .or_else(|| value.get("size_bytes"))
            .and_then(Value::as_u64);

        Some(Self {
            filename,
            mime_type,
            context,
            size_bytes,
        })
    }

    /// Serialize back to the stored JSON shape.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "filename": self.filename,
            "mimeType": self.mime_type,
            "context": self.context,
            "size": self.size_bytes,
        })
    }
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// An attachment as enumerated by the retention sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Owner.
    pub user_id: UserId,
    /// File metadata.
    pub metadata: AttachmentMetadata,
    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_defaults_bad_fields() {
        let parsed = AttachmentMetadata::from_json(&json!({
            "filename": "labs.pdf",
            "mimeType": 42,
            "context": "   ",
            "size": "big"
        }))
        .unwrap();

        assert_eq!(parsed, AttachmentMetadata::new("labs.pdf"));
    }

    #[test]
    fn test_from_json_requires_filename() {
        assert!(AttachmentMetadata::from_json(&json!({"mimeType": "image/png"})).is_none());
        assert!(AttachmentMetadata::from_json(&json!({"filename": ""})).is_none());
        assert!(AttachmentMetadata::from_json(&json!("labs.pdf")).is_none());
    }

    #[test]
    fn test_json_shape_is_stable() {
        let metadata = AttachmentMetadata::new("run.gpx")
            .with_mime_type("application/gpx+xml")
            .with_context("morning run");
        let restored = AttachmentMetadata::from_json(&metadata.to_json()).unwrap();
        assert_eq!(restored, metadata);
    }
}
