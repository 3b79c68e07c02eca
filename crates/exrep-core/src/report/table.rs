//! Fixed-schema report table built from normalized records.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::catalog::{canonical_fields, CanonicalField};
use crate::extraction::NormalizedRecord;

/// One report row. `None` cells are the absent-value marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    /// Storage key of the document the row was extracted from.
    source: Option<String>,
    cells: Vec<Option<String>>,
}

impl ReportRow {
    /// Storage key of the originating document, when known.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Cells aligned with the table columns.
    pub fn cells(&self) -> &[Option<String>] {
        &self.cells
    }
}

/// Ordered rows over a shared column set.
///
/// Every row holds exactly one cell per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTable {
    columns: Vec<CanonicalField>,
    rows: Vec<ReportRow>,
}

impl ReportTable {
    /// Column fields in output order.
    pub fn columns(&self) -> &[CanonicalField] {
        &self.columns
    }

    /// Column headers in output order.
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.as_str()).collect()
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `field` in row `row`; `None` for absent values and unknown columns.
    pub fn get(&self, row: usize, field: CanonicalField) -> Option<&str> {
        let column = self.columns.iter().position(|c| *c == field)?;
        self.rows.get(row)?.cells[column].as_deref()
    }

    /// Drop every column whose value is absent in all rows.
    ///
    /// Columns with at least one value are kept, in their original order.
    pub fn prettify(&self) -> ReportTable {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| self.rows.iter().any(|row| row.cells[i].is_some()))
            .collect();

        debug!(
            "Dropping {} of {} columns with no values",
            self.columns.len() - keep.len(),
            self.columns.len()
        );

        ReportTable {
            columns: keep.iter().map(|&i| self.columns[i]).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| ReportRow {
                    source: row.source.clone(),
                    cells: keep.iter().map(|&i| row.cells[i].clone()).collect(),
                })
                .collect(),
        }
    }

    /// Row-oriented views that serialize as `{column: value | null}` objects.
    pub fn records(&self) -> impl Iterator<Item = RowRecord<'_>> {
        self.rows.iter().map(move |row| RowRecord {
            columns: &self.columns,
            row,
        })
    }
}

/// Serializable view of one row keyed by column name.
pub struct RowRecord<'a> {
    columns: &'a [CanonicalField],
    row: &'a ReportRow,
}

impl Serialize for RowRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cell) in self.columns.iter().zip(&self.row.cells) {
            map.serialize_entry(column.as_str(), cell)?;
        }
        map.end()
    }
}

/// Append-only row collection over the full catalog.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    rows: Vec<ReportRow>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row for `record`.
    pub fn push(&mut self, record: &NormalizedRecord) {
        self.rows.push(Self::row(None, record));
    }

    /// Append a row for `record`, remembering the document it came from.
    pub fn push_sourced(&mut self, source: impl Into<String>, record: &NormalizedRecord) {
        self.rows.push(Self::row(Some(source.into()), record));
    }

    fn row(source: Option<String>, record: &NormalizedRecord) -> ReportRow {
        ReportRow {
            source,
            cells: canonical_fields()
                .iter()
                .map(|field| record.get(field).cloned())
                .collect(),
        }
    }

    /// Materialize the table with every catalog column.
    pub fn build(self) -> ReportTable {
        ReportTable {
            columns: canonical_fields().to_vec(),
            rows: self.rows,
        }
    }
}

/// Compile records into a table, one row per record in input order.
pub fn compile<I>(records: I) -> ReportTable
where
    I: IntoIterator<Item = NormalizedRecord>,
{
    let mut builder = ReportBuilder::new();
    for record in records {
        builder.push(&record);
    }
    let table = builder.build();
    info!("Compiled report with {} rows", table.len());
    table
}
