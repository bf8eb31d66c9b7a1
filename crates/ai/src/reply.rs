// Typed reply shapes
//
// Every prompt asks for one specific JSON shape. Each shape has its own
// strict serde type; the only leniency is a single level of wrapping
// ({"result": {...}}) and numbers sent as strings.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::json::extract_json;

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyError {
    /// No JSON object or array in the text
    NoJson,
    /// JSON-looking text that would not parse, even after repair
    Malformed(String),
    /// Valid JSON of the wrong shape
    Shape { expected: ReplyShape, detail: String },
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyError::NoJson => write!(f, "reply contains no JSON"),
            ReplyError::Malformed(msg) => write!(f, "reply JSON is malformed: {}", msg),
            ReplyError::Shape { expected, detail } => {
                write!(f, "reply is not a {} object: {}", expected.name(), detail)
            }
        }
    }
}

impl std::error::Error for ReplyError {}

/// The reply variants the engine asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    HeaderRow,
    ColumnNames,
    NameColumns,
    ExistingColumn,
    AmountColumn,
    RowNames,
    Categories,
}

impl ReplyShape {
    pub fn name(&self) -> &'static str {
        match self {
            ReplyShape::HeaderRow => "header-row",
            ReplyShape::ColumnNames => "column-names",
            ReplyShape::NameColumns => "name-columns",
            ReplyShape::ExistingColumn => "existing-column",
            ReplyShape::AmountColumn => "amount-column",
            ReplyShape::RowNames => "row-names",
            ReplyShape::Categories => "categories",
        }
    }

    /// Field whose presence identifies this shape
    pub fn key(&self) -> &'static str {
        match self {
            ReplyShape::HeaderRow => "headerRowIndex",
            ReplyShape::ColumnNames => "columnNames",
            ReplyShape::NameColumns => "columnIndices",
            ReplyShape::ExistingColumn => "bestColumnIndex",
            ReplyShape::AmountColumn => "amountColumnIndex",
            ReplyShape::RowNames => "names",
            ReplyShape::Categories => "categories",
        }
    }
}

/// A typed reply with a strict parser
pub trait Reply: DeserializeOwned + Sized {
    const SHAPE: ReplyShape;

    /// Interpret an object that lacks the identifying key. Most shapes have
    /// no such reading.
    fn from_bare(_object: &Map<String, Value>) -> Option<Self> {
        None
    }
}

/// Extract JSON from model output and parse it as `T`.
pub fn parse_reply<T: Reply>(text: &str) -> Result<T, ReplyError> {
    let value = extract_json(text)?;
    from_value(value)
}

/// Parse an already-extracted value as `T`
pub fn from_value<T: Reply>(value: Value) -> Result<T, ReplyError> {
    let shape = T::SHAPE;
    let key = shape.key();

    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(ReplyError::Shape {
                expected: shape,
                detail: format!("top level is {}", type_name(&other)),
            })
        }
    };

    let payload = if object.contains_key(key) {
        Some(Value::Object(object.clone()))
    } else {
        // One level of wrapping: {"data": {"headerRowIndex": ...}}
        object
            .values()
            .find(|v| v.as_object().is_some_and(|inner| inner.contains_key(key)))
            .cloned()
    };

    match payload {
        Some(payload) => serde_json::from_value(payload).map_err(|e| ReplyError::Shape {
            expected: shape,
            detail: e.to_string(),
        }),
        None => T::from_bare(&object).ok_or_else(|| ReplyError::Shape {
            expected: shape,
            detail: format!("missing \"{}\"", key),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Lenient scalars
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

fn de_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match NumberOrText::deserialize(d)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Confidence clamped to `[0, 1]`; NaN reads as no confidence.
fn de_confidence<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let n = de_f64(d)?;
    Ok(if n.is_nan() { 0.0 } else { n.clamp(0.0, 1.0) })
}

fn de_index<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let n = de_f64(d)?;
    if n.fract() != 0.0 || !n.is_finite() {
        return Err(serde::de::Error::custom(format!("{} is not an index", n)));
    }
    Ok(n as i64)
}

fn de_indices<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<i64>, D::Error> {
    #[derive(Deserialize)]
    struct Index(#[serde(deserialize_with = "de_index")] i64);
    let items: Vec<Index> = Vec::deserialize(d)?;
    Ok(items.into_iter().map(|i| i.0).collect())
}

// ============================================================================
// Reply types
// ============================================================================

/// `{headerRowIndex, reason, confidence, rowType}`; index -1 means "no header"
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderRowReply {
    #[serde(deserialize_with = "de_index")]
    pub header_row_index: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default, deserialize_with = "de_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub row_type: Option<String>,
}

impl Reply for HeaderRowReply {
    const SHAPE: ReplyShape = ReplyShape::HeaderRow;
}

/// `{columnNames: [..]}`, one proposed name per column
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnNamesReply {
    pub column_names: Vec<String>,
}

impl Reply for ColumnNamesReply {
    const SHAPE: ReplyShape = ReplyShape::ColumnNames;
}

/// `{columnIndices, combinationRule, reason, confidence}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameColumnsReply {
    #[serde(deserialize_with = "de_indices")]
    pub column_indices: Vec<i64>,
    #[serde(default)]
    pub combination_rule: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, deserialize_with = "de_confidence")]
    pub confidence: f64,
}

impl Reply for NameColumnsReply {
    const SHAPE: ReplyShape = ReplyShape::NameColumns;
}

/// `{bestColumnIndex, reason, confidence}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingColumnReply {
    #[serde(deserialize_with = "de_index")]
    pub best_column_index: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default, deserialize_with = "de_confidence")]
    pub confidence: f64,
}

impl Reply for ExistingColumnReply {
    const SHAPE: ReplyShape = ReplyShape::ExistingColumn;
}

/// `{amountColumnIndex, reason, confidence}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountColumnReply {
    #[serde(deserialize_with = "de_index")]
    pub amount_column_index: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default, deserialize_with = "de_confidence")]
    pub confidence: f64,
}

impl Reply for AmountColumnReply {
    const SHAPE: ReplyShape = ReplyShape::AmountColumn;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowName {
    pub input: String,
    pub name: String,
}

/// `{names: [{input, name}, ..]}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowNamesReply {
    pub names: Vec<RowName>,
}

impl Reply for RowNamesReply {
    const SHAPE: ReplyShape = ReplyShape::RowNames;
}

/// `{categories: {<name>: {standard: [..], check: [..], subcategories: {..}}}}`
///
/// The category tree stays as raw JSON; the ingestor walks it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoriesReply {
    pub categories: Map<String, Value>,
}

impl Reply for CategoriesReply {
    const SHAPE: ReplyShape = ReplyShape::Categories;

    /// A bare category map, recognized when every value is a category node
    fn from_bare(object: &Map<String, Value>) -> Option<Self> {
        let is_node = |v: &Value| {
            v.as_object().is_some_and(|node| {
                ["standard", "check", "subcategories"]
                    .iter()
                    .any(|k| node.contains_key(*k))
            })
        };
        (!object.is_empty() && object.values().all(is_node)).then(|| Self {
            categories: object.clone(),
        })
    }
}
