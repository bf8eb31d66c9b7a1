// Serializable end-of-run report.

use serde::Serialize;

use crate::messages::Locale;
use crate::model::{Amount, Category, CategoryStatus, ParsedFile, SkippedRow};
use crate::workflow::{Stage, WorkflowContext};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub matched: usize,
    pub mismatched: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub standard: Amount,
    pub check: Amount,
    pub difference: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub entries: usize,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconReport {
    pub generated_at: String,
    pub locale: Locale,
    pub stage: Stage,
    pub standard: Option<FileSummary>,
    pub check: Option<FileSummary>,
    pub categories: Vec<Category>,
    pub status_counts: StatusCounts,
    pub totals: Totals,
    pub summary: String,
}

impl ReconReport {
    pub fn from_context(ctx: &WorkflowContext) -> Self {
        let categories: Vec<Category> = ctx.categories.values().cloned().collect();

        let mut status_counts = StatusCounts::default();
        for c in &categories {
            match c.status {
                CategoryStatus::Match => status_counts.matched += 1,
                CategoryStatus::Mismatch => status_counts.mismatched += 1,
                CategoryStatus::Missing => status_counts.missing += 1,
            }
        }

        let standard: Amount = categories.iter().map(|c| c.total_standard).sum();
        let check: Amount = categories.iter().map(|c| c.total_check).sum();

        let file_summary = |file: &ParsedFile| FileSummary {
            entries: file.entries.len(),
            skipped: file.skipped.clone(),
        };

        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            locale: ctx.locale,
            stage: ctx.stage,
            standard: ctx.parsed.as_ref().map(|p| file_summary(&p.standard)),
            check: ctx.parsed.as_ref().map(|p| file_summary(&p.check)),
            categories,
            status_counts,
            totals: Totals {
                standard,
                check,
                difference: (standard - check).abs(),
            },
            summary: ctx.summary.clone(),
        }
    }

    /// Every category reconciled
    pub fn is_clean(&self) -> bool {
        self.status_counts.mismatched == 0 && self.status_counts.missing == 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
