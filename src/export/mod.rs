//! Export of the cache log as a CSV table or a JSON listing.

pub mod engine;
pub mod options;
pub mod writer;

pub use engine::{format_utc, format_value, run_export, ExportEngine, ExportSummary};
pub use options::{ExportConfig, ExportFormat, Separator};
pub use writer::{CsvWriter, JsonListingWriter, StreamingWriter};
