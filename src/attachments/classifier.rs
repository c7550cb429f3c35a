//! Attachment classification into retention tiers.
//!
//! Classification is a pure function of filename, MIME type, and upload
//! context. Medical, fitness, and financial keywords are checked in that
//! order against the filename and context; the MIME type only separates
//! photos from generic files.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attachments::metadata::AttachmentMetadata;
use crate::core::patterns::{KeywordTable, split_separators};

/// Retention days meaning "never delete".
pub const KEEP_FOREVER: i64 = -1;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic", "heif", "bmp", "tif", "tiff"];

/// Retention tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentTier {
    /// Kept longest.
    High,
    /// Kept for a bounded period.
    Medium,
    /// Kept briefly.
    Low,
}

impl AttachmentTier {
    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for AttachmentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggested folder for the attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomySuggestion {
    /// Taxonomy identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Result of classifying one attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentClassification {
    /// Retention tier.
    pub tier: AttachmentTier,
    /// Days to keep the file, or [`KEEP_FOREVER`].
    pub retention_days: i64,
    /// Human-readable explanation.
    pub reason: String,
    /// Suggested taxonomy, when the content kind is recognized.
    pub suggested_taxonomy: Option<TaxonomySuggestion>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DocumentKind {
    Medical,
    Fitness,
    Financial,
}

impl DocumentKind {
    fn classification(self) -> AttachmentClassification {
        let (tier, retention_days, reason, taxonomy_id, taxonomy_name) = match self {
            Self::Medical => (
                AttachmentTier::High,
                KEEP_FOREVER,
                "Medical document, kept indefinitely",
                "medical_records",
                "Medical Records",
            ),
            Self::Fitness => (
                AttachmentTier::Medium,
                365,
                "Fitness or nutrition record, kept for one year",
                "fitness_tracking",
                "Fitness Tracking",
            ),
            Self::Financial => (
                AttachmentTier::Medium,
                730,
                "Financial document, kept for two years",
                "billing",
                "Billing & Insurance",
            ),
        };

        AttachmentClassification {
            tier,
            retention_days,
            reason: reason.to_string(),
            suggested_taxonomy: Some(TaxonomySuggestion {
                id: taxonomy_id.to_string(),
                name: taxonomy_name.to_string(),
            }),
        }
    }
}

const DOCUMENT_PATTERNS: &[(DocumentKind, &[&str])] = &[
    (
        DocumentKind::Medical,
        &[
            "blood", "bloodwork", "lab", "labs", "medical", "doctor", "physician", "clinic",
            "hospital", "prescription", "rx", "diagnosis", "mri", "xray", "radiology", "ecg",
            "ekg", "vaccine", "vaccination", "allergy", "cholesterol", "glucose", "a1c",
            "biopsy", "pathology",
        ],
    ),
    (
        DocumentKind::Fitness,
        &[
            "workout", "fitness", "training", "exercise", "gym", "run", "running", "steps",
            "strava", "garmin", "fitbit", "nutrition", "meal", "diet", "food", "calories",
            "macros",
        ],
    ),
    (
        DocumentKind::Financial,
        &[
            "invoice", "receipt", "bill", "billing", "insurance", "claim", "payment",
            "statement", "copay", "eob", "tax",
        ],
    ),
];

/// Keyword classifier for attachments.
#[derive(Clone, Debug)]
pub struct AttachmentClassifier {
    table: KeywordTable<DocumentKind>,
}

impl AttachmentClassifier {
    /// Compile the keyword tables.
    ///
    /// # Errors
    /// Returns an error if a keyword pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            table: KeywordTable::new(DOCUMENT_PATTERNS)?,
        })
    }

    /// Classify a file by name, MIME type, and context.
    #[must_use]
    pub fn classify(
        &self,
        filename: &str,
        mime_type: Option<&str>,
        context: Option<&str>,
    ) -> AttachmentClassification {
        let haystack = format!("{} {}", split_separators(filename), context.unwrap_or_default());

        if let Some(found) = self.table.first_match(&haystack) {
            return found.category.classification();
        }

        if is_image(filename, mime_type) {
            return AttachmentClassification {
                tier: AttachmentTier::Low,
                retention_days: 90,
                reason: "Photo, kept for 90 days".to_string(),
                suggested_taxonomy: None,
            };
        }

        AttachmentClassification {
            tier: AttachmentTier::Low,
            retention_days: 30,
            reason: "General attachment, kept for 30 days".to_string(),
            suggested_taxonomy: None,
        }
    }

    /// Classify from stored metadata.
    #[must_use]
    pub fn classify_metadata(&self, metadata: &AttachmentMetadata) -> AttachmentClassification {
        self.classify(
            &metadata.filename,
            metadata.mime_type.as_deref(),
            metadata.context.as_deref(),
        )
    }
}

fn is_image(filename: &str, mime_type: Option<&str>) -> bool {
    if mime_type.is_some_and(|mime| mime.trim().to_ascii_lowercase().starts_with("image/")) {
        return true;
    }

    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
