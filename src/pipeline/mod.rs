//! Ingestion pipeline.
//!
//! One run:
//! 1. Load the merged inbox and the current prompts
//! 2. Categorize every email without a category (plus action items for
//!    actionable ones), pacing after each
//! 3. Clear stale action items on already-categorized, non-actionable emails
//! 4. Write the full annotation set back in one pass

pub mod ingest;

pub use ingest::{IngestReport, IngestionPipeline, PipelineConfig};
