//! Cache Key Module
//!
//! Canonical key construction and key matching for bulk invalidation.
//!
//! Two logically identical requests must produce byte-identical keys, so every
//! key built here goes through [`canonical_json`], which emits objects with
//! their fields sorted and refuses NaN or infinite floats (JSON would render all
//! of them as `null`, colliding with `None`).

use std::fmt;

use regex::Regex;
use serde::ser;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CacheError, Result};

// == Canonical Serialization ==
/// Serializes `value` as compact JSON with object keys in sorted order.
///
/// Map iteration order (for example a `HashMap` argument) never leaks into the
/// output.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    value
        .serialize(FiniteCheck)
        .map_err(|e| CacheError::KeySerialization(e.to_string()))?;
    let value =
        serde_json::to_value(value).map_err(|e| CacheError::KeySerialization(e.to_string()))?;
    serde_json::to_string(&sorted(value)).map_err(|e| CacheError::KeySerialization(e.to_string()))
}

/// Rebuilds every object with its fields inserted in key order.
///
/// Holds even when `serde_json/preserve_order` is enabled somewhere in the
/// dependency graph.
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, sorted(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

// == Float Check ==
#[derive(Debug)]
struct NonFinite(String);

impl fmt::Display for NonFinite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NonFinite {}

impl ser::Error for NonFinite {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        NonFinite(msg.to_string())
    }
}

type Checked = std::result::Result<(), NonFinite>;

fn check_finite(v: f64) -> Checked {
    if v.is_finite() {
        Ok(())
    } else {
        Err(NonFinite(format!("{} cannot be part of a cache key", v)))
    }
}

/// Serializer that only walks a value, failing on the first non-finite float.
struct FiniteCheck;

macro_rules! accept_scalars {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(fn $method(self, _: $ty) -> Checked { Ok(()) })*
    };
}

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = NonFinite;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    accept_scalars! {
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit_struct(&'static str),
    }

    fn serialize_f32(self, v: f32) -> Checked {
        check_finite(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Checked {
        check_finite(v)
    }

    fn serialize_none(self) -> Checked {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Checked {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Checked {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Checked {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }
}

macro_rules! walk_elements {
    ($($kind:ident::$method:ident),* $(,)?) => {
        $(
            impl ser::$kind for FiniteCheck {
                type Ok = ();
                type Error = NonFinite;

                fn $method<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
                    value.serialize(FiniteCheck)
                }

                fn end(self) -> Checked {
                    Ok(())
                }
            }
        )*
    };
}

walk_elements! {
    SerializeSeq::serialize_element,
    SerializeTuple::serialize_element,
    SerializeTupleStruct::serialize_field,
    SerializeTupleVariant::serialize_field,
}

macro_rules! walk_fields {
    ($($kind:ident),* $(,)?) => {
        $(
            impl ser::$kind for FiniteCheck {
                type Ok = ();
                type Error = NonFinite;

                fn serialize_field<T: ?Sized + Serialize>(
                    &mut self,
                    _: &'static str,
                    value: &T,
                ) -> Checked {
                    value.serialize(FiniteCheck)
                }

                fn end(self) -> Checked {
                    Ok(())
                }
            }
        )*
    };
}

walk_fields!(SerializeStruct, SerializeStructVariant);

impl ser::SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Checked {
        key.serialize(FiniteCheck)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

// == Memo Key ==
/// Builds `tier:function:canonical(args)`.
pub fn memo_key<A: Serialize + ?Sized>(tier: &str, function: &str, args: &A) -> Result<String> {
    Ok(format!("{}:{}:{}", tier, function, canonical_json(args)?))
}

/// Key prefix shared by every [`QueryKey`] for `table`.
pub fn table_prefix(table: &str) -> String {
    format!("table:{}:", table)
}

// == Query Key ==
/// Builder for keys identifying a backend query against one table.
///
/// Filter clauses may be added in any order; [`QueryKey::build`] sorts them so
/// equivalent queries share a key.
#[derive(Debug, Clone, Default)]
pub struct QueryKey {
    table: String,
    columns: Vec<String>,
    filters: Vec<(String, String, Value)>,
    order: Vec<(String, bool)>,
    range: Option<(u64, u64)>,
}

#[derive(Serialize)]
struct QueryShape<'a> {
    columns: &'a [String],
    filters: Vec<FilterShape<'a>>,
    order: Vec<OrderShape<'a>>,
    range: Option<(u64, u64)>,
}

#[derive(Serialize)]
struct FilterShape<'a> {
    column: &'a str,
    op: &'a str,
    value: &'a Value,
}

#[derive(Serialize)]
struct OrderShape<'a> {
    column: &'a str,
    ascending: bool,
}

impl QueryKey {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Restricts the selected columns. Column order is irrelevant to the key.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Adds a filter clause such as `("status", "eq", "active")`.
    pub fn filter(
        mut self,
        column: impl Into<String>,
        op: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push((column.into(), op.into(), value.into()));
        self
    }

    /// Shorthand for an equality filter.
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, "eq", value)
    }

    /// Adds a sort column. Sort order is significant and kept as given.
    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push((column.into(), ascending));
        self
    }

    /// Limits the result to rows `from..=to`.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    // == Build ==
    /// Produces `table:<table>:<canonical json>`.
    pub fn build(&self) -> Result<String> {
        let mut columns = self.columns.clone();
        columns.sort();
        columns.dedup();

        let mut filters: Vec<FilterShape<'_>> = self
            .filters
            .iter()
            .map(|(column, op, value)| FilterShape {
                column: column.as_str(),
                op: op.as_str(),
                value,
            })
            .collect();
        // values are compared through their JSON text, which is total and stable
        filters.sort_by(|a, b| {
            (a.column, a.op, a.value.to_string()).cmp(&(b.column, b.op, b.value.to_string()))
        });

        let shape = QueryShape {
            columns: &columns,
            filters,
            order: self
                .order
                .iter()
                .map(|(column, ascending)| OrderShape {
                    column: column.as_str(),
                    ascending: *ascending,
                })
                .collect(),
            range: self.range,
        };

        Ok(format!("{}{}", table_prefix(&self.table), canonical_json(&shape)?))
    }
}

// == Key Pattern ==
/// Selects keys for bulk invalidation.
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Key contains the text anywhere
    Substring(String),
    /// Key starts with the text
    Prefix(String),
    /// Key matches the regular expression
    Regex(Regex),
}

impl KeyPattern {
    /// Compiles `pattern` as a regular expression.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(KeyPattern::Regex)
            .map_err(|e| CacheError::InvalidPattern(e.to_string()))
    }

    pub fn substring(text: impl Into<String>) -> Self {
        KeyPattern::Substring(text.into())
    }

    pub fn prefix(text: impl Into<String>) -> Self {
        KeyPattern::Prefix(text.into())
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Substring(text) => key.contains(text.as_str()),
            KeyPattern::Prefix(text) => key.starts_with(text.as_str()),
            KeyPattern::Regex(re) => re.is_match(key),
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::Substring(text) => write!(f, "*{}*", text),
            KeyPattern::Prefix(text) => write!(f, "{}*", text),
            KeyPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}
