//! Report compilation and persistence.

mod table;
mod writer;

pub use table::{compile, ReportBuilder, ReportRow, ReportTable, RowRecord};
pub use writer::{ReportFormat, ReportSink, ReportWriter, RunSummary};
