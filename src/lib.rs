//! Declaration sampling: rule-based selection of customs declarations for
//! manual audit, with Excel reporting.
//!
//! The engine takes a line-item table (one row per declaration item, columns
//! discovered by name), applies an ordered registry of selection rules that
//! each justify their picks, tops the sample up to a target size with uniform
//! random draws, and exports the annotated result as a multi-sheet workbook.

use std::time::Duration;

pub mod columns;
pub mod config;
pub mod engine;
pub mod export;
pub mod rules;
pub mod selection;
pub mod table;
pub mod worker;

pub use config::SamplingParams;
pub use engine::{SampleReport, SamplingEngine, SamplingStats};
pub use export::{ExportOptions, ExportPhase};
pub use selection::Selection;
pub use table::{load_table, DeclarationTable, Record};
pub use worker::{spawn_export, ExportHandle};

#[derive(thiserror::Error, Debug)]
pub enum SamplingError {
    /// No table loaded, or the table is unusable for sampling.
    #[error("no data: {0}")]
    NoData(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Export requested before any sampling run.
    #[error("nothing sampled yet; run the sampler before exporting")]
    EmptySelection,
    /// Destination rejected before any workbook work started.
    #[error("output path not writable: {0}")]
    ExportPrecondition(String),
    #[error("failed to write workbook: {0}")]
    ExportWrite(String),
    #[error("export cancelled")]
    Cancelled,
    /// The background export exceeded its wall-clock allowance; the output is
    /// likely too large.
    #[error("export timed out after {0:?}; the output is likely too large")]
    Timeout(Duration),
}
