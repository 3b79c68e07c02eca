//! Filtering of raw detections down to catalog fields.

use std::collections::BTreeMap;

use tracing::debug;

use crate::catalog::CanonicalField;

use super::RawExtractionResult;

/// Detected text per canonical field, only for fields actually found.
///
/// Iteration follows catalog order.
pub type NormalizedRecord = BTreeMap<CanonicalField, String>;

/// Normalize one raw result.
///
/// Detections of every expense document are pooled in order. When a field is
/// detected more than once the last value wins. Labels outside the catalog and
/// detections without a value are dropped.
pub fn normalize(result: &RawExtractionResult) -> NormalizedRecord {
    let mut record = NormalizedRecord::new();

    for detection in result.detections() {
        let label = detection.label();
        let Some(field) = CanonicalField::from_label(label) else {
            debug!("Skipping non-catalog field {}", label);
            continue;
        };
        let Some(value) = detection.value() else {
            debug!("Skipping {} without a detected value", label);
            continue;
        };

        debug!("Found {}: {}", field, value);
        record.insert(field, value.to_string());
    }

    record
}
