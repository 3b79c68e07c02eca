//! Raw analysis results and their normalization into catalog fields.

mod normalizer;

pub use normalizer::{normalize, NormalizedRecord};

use serde::{Deserialize, Serialize};

/// Raw output of one succeeded (or partially succeeded) analysis job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawExtractionResult {
    /// One entry per expense document the service found in the source file.
    #[serde(default)]
    pub expense_documents: Vec<ExpenseDocument>,
}

impl RawExtractionResult {
    /// Create a result holding a single expense document.
    pub fn single(detections: Vec<FieldDetection>) -> Self {
        Self {
            expense_documents: vec![ExpenseDocument::new(detections)],
        }
    }

    /// Iterate over the detections of every expense document, in order.
    pub fn detections(&self) -> impl Iterator<Item = &FieldDetection> {
        self.expense_documents
            .iter()
            .flat_map(|doc| doc.summary_fields.iter())
    }
}

/// One expense document inside a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpenseDocument {
    /// Position of this document within the source file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expense_index: Option<u32>,

    /// Typed key-value detections.
    #[serde(default)]
    pub summary_fields: Vec<FieldDetection>,
}

impl ExpenseDocument {
    pub fn new(summary_fields: Vec<FieldDetection>) -> Self {
        Self {
            expense_index: None,
            summary_fields,
        }
    }
}

/// A single typed field detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FieldDetection {
    /// Field-type label assigned by the service.
    #[serde(rename = "Type")]
    pub field_type: Detection,

    /// Detected value, if the service read one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_detection: Option<Detection>,
}

impl FieldDetection {
    /// Create a detection with a label and a value.
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_type: Detection::new(label),
            value_detection: Some(Detection::new(value)),
        }
    }

    /// Field-type label.
    pub fn label(&self) -> &str {
        &self.field_type.text
    }

    /// Detected text value.
    pub fn value(&self) -> Option<&str> {
        self.value_detection.as_ref().map(|d| d.text.as_str())
    }
}

/// Text read by the service with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Detection {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }
}
