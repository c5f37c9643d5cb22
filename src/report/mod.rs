//! Report consolidation and rendering.

pub mod consolidator;
pub mod generator;

pub use consolidator::ReportConsolidator;
pub use generator::{generate_json_report, generate_markdown_report, write_report};
