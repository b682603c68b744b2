//! Query-related data models.
//!
//! This module defines parameter values, column mappings, and result sets
//! exchanged with [`QueryFacade`](crate::db::QueryFacade).

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A result row: column name to value, in column order.
pub type Row = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Timestamp without time zone
    DateTime(NaiveDateTime),
    /// Calendar date
    Date(NaiveDate),
    /// Binary data
    Bytes(Vec<u8>),
    /// JSON document
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::Date(_) => "date",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for QueryParam {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NaiveDateTime> for QueryParam {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<NaiveDate> for QueryParam {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<JsonValue> for QueryParam {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Statement parameters: positional (`?`) or named (`:name`).
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<QueryParam>),
    Named(Vec<(String, QueryParam)>),
}

impl Params {
    /// No parameters.
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    /// Positional parameters bound to `?` placeholders in order.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryParam>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Named parameters bound to `:name` placeholders. A leading `:` in a key is ignored.
    pub fn named<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        Self::Named(
            values
                .into_iter()
                .map(|(k, v)| {
                    let key: String = k.into();
                    (key.trim_start_matches(':').to_string(), v.into())
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Positional(v) => v.is_empty(),
            Self::Named(v) => v.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Positional(v) => v.len(),
            Self::Named(v) => v.len(),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Vec<QueryParam>> for Params {
    fn from(v: Vec<QueryParam>) -> Self {
        Self::Positional(v)
    }
}

/// Ordered column-to-value mapping used to build INSERT and UPDATE statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, QueryParam)>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Set a column value, replacing an existing entry in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<QueryParam>) {
        let column = column.into();
        let value = value.into();
        match self.0.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.0.push((column, value)),
        }
    }

    /// Builder form of [`Fields::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&QueryParam> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &QueryParam> {
        self.0.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryParam)> {
        self.0.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<QueryParam>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.set(k, v);
        }
        fields
    }
}

/// A single `column = value` condition for UPDATE and DELETE.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    column: String,
    value: QueryParam,
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn value(&self) -> &QueryParam {
        &self.value
    }
}

/// Type hint for literal quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamType {
    Null,
    Bool,
    Int,
    #[default]
    Str,
    /// Large binary object
    Lob,
}

/// Materialized result of an executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<JsonValue>>,
    pub(crate) rows_affected: u64,
}

impl ResultSet {
    /// Column names in result order. Empty when the statement returned no rows.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows affected by the statement.
    pub fn row_count(&self) -> u64 {
        self.rows_affected
    }

    /// Number of rows returned.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of every returned row, in column order.
    pub fn values(&self) -> &[Vec<JsonValue>] {
        &self.rows
    }

    /// Values of the first row, in column order.
    pub fn first_values(&self) -> Option<&[JsonValue]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// First row as a column-name map.
    pub fn first_row(&self) -> Option<Row> {
        self.rows.first().map(|values| self.to_row(values))
    }

    /// Every row as a column-name map.
    pub fn rows(&self) -> Vec<Row> {
        self.rows.iter().map(|values| self.to_row(values)).collect()
    }

    /// Consume the result set into column-name maps.
    pub fn into_rows(self) -> Vec<Row> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect())
            .collect()
    }

    fn to_row(&self, values: &[JsonValue]) -> Row {
        self.columns.iter().cloned().zip(values.iter().cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_option_conversion() {
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some("x")), QueryParam::String("x".to_string()));
    }

    #[test]
    fn test_named_params_strip_colon() {
        let params = Params::named([(":id", 1), ("name", 2)]);
        match params {
            Params::Named(values) => {
                assert_eq!(values[0].0, "id");
                assert_eq!(values[1].0, "name");
            }
            Params::Positional(_) => panic!("expected named params"),
        }
    }

    #[test]
    fn test_fields_keep_insertion_order_and_replace() {
        let mut fields = Fields::new().with("name", "Ana").with("email", "a@x.com");
        fields.set("name", "Bea");
        let columns: Vec<&str> = fields.columns().collect();
        assert_eq!(columns, vec!["name", "email"]);
        assert_eq!(fields.get("name"), Some(&QueryParam::String("Bea".to_string())));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_result_set_rows_preserve_column_order() {
        let result = ResultSet {
            columns: vec!["z".to_string(), "a".to_string()],
            rows: vec![vec![json!(1), json!("x")], vec![json!(2), json!("y")]],
            rows_affected: 0,
        };
        let first = result.first_row().unwrap();
        let keys: Vec<&String> = first.keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(result.first_values().unwrap(), &[json!(1), json!("x")]);
        assert_eq!(result.into_rows()[1]["a"], json!("y"));
    }

    #[test]
    fn test_empty_result_set() {
        let result = ResultSet::default();
        assert!(result.first_row().is_none());
        assert!(result.rows().is_empty());
        assert_eq!(result.row_count(), 0);
    }
}
