//! Per-type field registry.
//!
//! A [`FieldSet`] lists an entity's persistable fields with a typed getter
//! and setter for each. It drives both directions of mapping: extracting a
//! [`Fields`] for INSERT/UPDATE, and hydrating an entity from a [`Row`].

use crate::entity::Entity;
use crate::entity::naming::{to_studly_caps, to_underscored};
use crate::error::{DbalError, DbalResult};
use crate::models::{Fields, QueryParam, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Name of the identity field and column.
pub const ID_FIELD: &str = "id";

/// A Rust value that can be stored in and read back from a column.
pub trait ColumnValue: Sized + Send + Sync + 'static {
    /// Parameter to bind when writing this value.
    fn to_param(&self) -> QueryParam;

    /// Decode a column value. `None` means the value cannot represent `Self`.
    fn from_column(value: &JsonValue) -> Option<Self>;
}

impl ColumnValue for String {
    fn to_param(&self) -> QueryParam {
        QueryParam::String(self.clone())
    }

    fn from_column(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            JsonValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            _ => None,
        }
    }
}

impl ColumnValue for i64 {
    fn to_param(&self) -> QueryParam {
        QueryParam::Int(*self)
    }

    fn from_column(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            JsonValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

impl ColumnValue for i32 {
    fn to_param(&self) -> QueryParam {
        QueryParam::Int(i64::from(*self))
    }

    fn from_column(value: &JsonValue) -> Option<Self> {
        i64::from_column(value).and_then(|v| i32::try_from(v).ok())
    }
}

impl ColumnValue for f64 {
    fn to_param(&self) -> QueryParam {
        QueryParam::Float(*self)
    }

    fn from_column(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_f64(),
            // DECIMAL/NUMERIC columns arrive as strings
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl ColumnValue for bool {
    fn to_param(&self) -> QueryParam {
        QueryParam::Bool(*self)
    }

    fn from_column(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::Number(n) => n.as_i64().map(|v| v != 0),
            JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" => Some(true),
                "0" | "f" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl ColumnValue for JsonValue {
    fn to_param(&self) -> QueryParam {
        QueryParam::Json(self.clone())
    }

    fn from_column(value: &JsonValue) -> Option<Self> {
        match value {
            // JSON stored in text columns
            JsonValue::String(s) => Some(serde_json::from_str(s).unwrap_or_else(|_| value.clone())),
            other => Some(other.clone()),
        }
    }
}

impl ColumnValue for NaiveDateTime {
    fn to_param(&self) -> QueryParam {
        QueryParam::DateTime(*self)
    }

    fn from_column(value: &JsonValue) -> Option<Self> {
        let s = value.as_str()?.trim();
        ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.naive_utc())
            })
    }
}

impl ColumnValue for NaiveDate {
    fn to_param(&self) -> QueryParam {
        QueryParam::Date(*self)
    }

    fn from_column(value: &JsonValue) -> Option<Self> {
        let s = value.as_str()?.trim();
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .or_else(|| NaiveDateTime::from_column(value).map(|dt| dt.date()))
    }
}

impl<V: ColumnValue> ColumnValue for Option<V> {
    fn to_param(&self) -> QueryParam {
        match self {
            Some(v) => v.to_param(),
            None => QueryParam::Null,
        }
    }

    fn from_column(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(None),
            other => V::from_column(other).map(Some),
        }
    }
}

type Getter<T> = Box<dyn Fn(&T) -> QueryParam + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, &JsonValue) -> DbalResult<()> + Send + Sync>;

struct FieldDef<T> {
    name: String,
    column: String,
    get: Getter<T>,
    set: Setter<T>,
}

/// Ordered registry of an entity's persistable fields.
///
/// The identity field `id` is registered first automatically, through
/// [`Entity::id`] and [`Entity::set_id`].
pub struct FieldSet<T> {
    fields: Vec<FieldDef<T>>,
    /// StudlyCaps(column) → index into `fields`
    by_key: HashMap<String, usize>,
}

impl<T: Entity> FieldSet<T> {
    pub fn new() -> Self {
        let mut set = Self {
            fields: Vec::new(),
            by_key: HashMap::new(),
        };
        set.register(FieldDef {
            name: ID_FIELD.to_string(),
            column: ID_FIELD.to_string(),
            get: Box::new(|entity: &T| QueryParam::from(entity.id())),
            set: Box::new(|entity: &mut T, value: &JsonValue| {
                let id = Option::<i64>::from_column(value)
                    .ok_or_else(|| DbalError::hydration(ID_FIELD, mismatch::<Option<i64>>(value)))?;
                entity.set_id(id);
                Ok(())
            }),
        });
        set
    }

    /// Register a field by its Rust name (`userName` or `user_name`); the
    /// column is its underscored form. Registering a column twice replaces
    /// the earlier definition.
    pub fn field<V, G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        V: ColumnValue,
        G: Fn(&T) -> &V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let column = to_underscored(name);
        let setter_column = column.clone();
        self.register(FieldDef {
            name: name.to_string(),
            column,
            get: Box::new(move |entity: &T| get(entity).to_param()),
            set: Box::new(move |entity: &mut T, value: &JsonValue| {
                let decoded = V::from_column(value)
                    .ok_or_else(|| DbalError::hydration(setter_column.as_str(), mismatch::<V>(value)))?;
                set(entity, decoded);
                Ok(())
            }),
        });
        self
    }

    fn register(&mut self, def: FieldDef<T>) {
        let key = to_studly_caps(&def.column);
        match self.by_key.get(&key) {
            Some(&idx) => self.fields[idx] = def,
            None => {
                self.by_key.insert(key, self.fields.len());
                self.fields.push(def);
            }
        }
    }

    /// Column names in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.column.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column values of `entity` in declaration order. A field is skipped when
    /// `exclude` names either its Rust name or its column.
    pub fn extract(&self, entity: &T, exclude: &[&str]) -> Fields {
        self.fields
            .iter()
            .filter(|f| !exclude.iter().any(|e| *e == f.name || *e == f.column))
            .map(|f| (f.column.clone(), (f.get)(entity)))
            .collect()
    }

    /// Build a default entity and apply every row column that matches a field.
    /// Columns without a matching field are ignored.
    pub fn hydrate(&self, row: &Row) -> DbalResult<T> {
        let mut entity = T::default();
        for (column, value) in row {
            if let Some(&idx) = self.by_key.get(&to_studly_caps(column)) {
                (self.fields[idx].set)(&mut entity, value)?;
            }
        }
        Ok(entity)
    }
}

impl<T: Entity> Default for FieldSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for FieldSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.fields.iter().map(|d| &d.column))
            .finish()
    }
}

fn mismatch<V>(value: &JsonValue) -> String {
    format!(
        "cannot convert {} to {}",
        value,
        std::any::type_name::<V>()
    )
}
