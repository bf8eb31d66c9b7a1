use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// A monetary amount in minor units (cents). Never float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_cents(cents: i64) -> Self {
        Amount(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn abs(self) -> Self {
        Amount(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Amount {
        iter.copied().sum()
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Which input file an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Standard,
    Check,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Check => "check",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed line item extracted from a ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    /// `<source>_<spreadsheet row number>`, unique within one file
    pub id: String,
    /// Display name (row summary, context text, or combined name)
    pub name: String,
    /// Name as resolved from the name column(s)
    pub original_name: String,
    pub amount: Amount,
    pub source: Source,
    pub context_text: String,
    /// 0-based grid row
    pub original_index: usize,
    pub category: Option<String>,
}

// ---------------------------------------------------------------------------
// Structure decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderSource {
    Heuristic,
    Ai,
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderDecision {
    /// Grid row of the header, -1 when synthesized
    pub row_index: i64,
    pub confidence: f64,
    pub source: HeaderSource,
}

impl HeaderDecision {
    pub fn synthesized() -> Self {
        Self {
            row_index: -1,
            confidence: 0.0,
            source: HeaderSource::Synthesized,
        }
    }

    /// First grid row holding data
    pub fn data_start(&self) -> usize {
        if self.row_index < 0 {
            0
        } else {
            self.row_index as usize + 1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    Keyword,
    Ai,
    Heuristic,
    Composite,
}

impl fmt::Display for RoleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword => write!(f, "keyword"),
            Self::Ai => write!(f, "ai"),
            Self::Heuristic => write!(f, "heuristic"),
            Self::Composite => write!(f, "composite"),
        }
    }
}

/// Which columns supply the name and the amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnRoles {
    pub name_columns: Vec<usize>,
    pub amount_column: usize,
    /// Placeholder template over `name_columns` positions, e.g. `{0}-{1}`
    pub combination_rule: String,
    /// Name and amount share `amount_column`, split per row
    pub composite_mode: bool,
    /// How the name column(s) were found
    pub source: RoleSource,
    pub amount_source: RoleSource,
}

// ---------------------------------------------------------------------------
// Parse results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SkipReason {
    EmptyName,
    BadAmount(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "empty name"),
            Self::BadAmount(raw) => write!(f, "unparseable amount '{raw}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    /// 1-based spreadsheet row
    pub row: usize,
    pub reason: SkipReason,
}

/// Everything the parse stage learned about one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedFile {
    pub source: Source,
    pub headers: Vec<String>,
    pub header: HeaderDecision,
    pub roles: ColumnRoles,
    pub entries: Vec<Entry>,
    pub skipped: Vec<SkippedRow>,
    /// Strategy labels attempted, in order
    pub strategies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedData {
    pub standard: ParsedFile,
    pub check: ParsedFile,
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Name of the bucket holding entries no category claimed.
pub const UNCLASSIFIED: &str = "Unclassified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Match,
    Mismatch,
    Missing,
}

impl fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::Mismatch => write!(f, "mismatch"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub name: String,
    pub standard: Vec<Entry>,
    pub check: Vec<Entry>,
    pub total_standard: Amount,
    pub total_check: Amount,
    /// `|total_standard - total_check|`
    pub difference: Amount,
    pub status: CategoryStatus,
}

impl Category {
    /// An empty category with zeroed totals
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            standard: Vec::new(),
            check: Vec::new(),
            total_standard: Amount::ZERO,
            total_check: Amount::ZERO,
            difference: Amount::ZERO,
            status: CategoryStatus::Missing,
        }
    }

    pub fn entries(&self, source: Source) -> &[Entry] {
        match source {
            Source::Standard => &self.standard,
            Source::Check => &self.check,
        }
    }

    pub fn entries_mut(&mut self, source: Source) -> &mut Vec<Entry> {
        match source {
            Source::Standard => &mut self.standard,
            Source::Check => &mut self.check,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.standard.is_empty() && self.check.is_empty()
    }
}

/// Categories keyed by name, in deterministic order.
pub type CategoryMap = BTreeMap<String, Category>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_display() {
        assert_eq!(Amount::from_cents(120050).to_string(), "1200.50");
        assert_eq!(Amount::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
    }

    #[test]
    fn amount_serializes_as_decimal() {
        assert_eq!(serde_json::to_string(&Amount::from_cents(500000)).unwrap(), "5000.0");
        assert_eq!(serde_json::to_string(&Amount::from_cents(1)).unwrap(), "0.01");
    }

    #[test]
    fn amount_sum() {
        let total: Amount = [Amount::from_cents(100), Amount::from_cents(-30)].iter().sum();
        assert_eq!(total, Amount::from_cents(70));
        assert_eq!((Amount::from_cents(10) - Amount::from_cents(25)).abs(), Amount::from_cents(15));
    }

    #[test]
    fn data_start() {
        assert_eq!(HeaderDecision::synthesized().data_start(), 0);
        let decision = HeaderDecision {
            row_index: 2,
            confidence: 0.7,
            source: HeaderSource::Heuristic,
        };
        assert_eq!(decision.data_start(), 3);
    }
}
