//! `ledgermatch-recon`: adaptive ledger extraction and category reconciliation.
//!
//! Turns two loosely structured spreadsheets into typed entries (header
//! location, column role resolution, entry extraction), ingests an AI
//! classification of those entries into categories, and reconciles the
//! per-category totals. The [`workflow`] module sequences the stages.
//!
//! AI assistance is optional everywhere except classification and the
//! final summary; every other stage has a local fallback.

pub mod amount;
pub mod assist;
pub mod attempt;
pub mod columns;
pub mod error;
pub mod extract;
pub mod header;
pub mod ingest;
pub mod messages;
pub mod model;
pub mod pipeline;
pub mod remote;
pub mod report;
pub mod summarize;
pub mod totals;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use amount::parse_amount;
pub use assist::AiAccess;
pub use error::{ErrorKind, ReconError};
pub use ingest::{ingest_classification, Classification};
pub use messages::Locale;
pub use model::{
    Amount, Category, CategoryMap, CategoryStatus, ColumnRoles, Entry, HeaderDecision,
    ParsedData, ParsedFile, Source, UNCLASSIFIED,
};
pub use pipeline::{parse_file, parse_files, parse_grid};
pub use report::ReconReport;
pub use totals::calculate;
pub use workflow::{Event, Stage, Workflow, WorkflowContext};
