//! Row-set marshaling.
//!
//! Drivers hand back a [`RowSet`]; mapper functions turn it into their
//! declared return type through [`FromRows`]:
//!
//! | Return type              | Rows used                           |
//! |--------------------------|-------------------------------------|
//! | scalar, `Value`          | first column of the first row       |
//! | `Row`, record            | first row                           |
//! | `Option<T>`              | first row, `None` when there is none |
//! | `Vec<T>`                 | every row                           |
//! | `()`                     | none                                |
//!
//! Records are plain `#[derive(Deserialize)]` structs registered with
//! [`record!`](crate::record); columns are matched to fields by name, so
//! `#[serde(rename = "user_id")]` maps a column onto a differently named
//! field.

use serde::de::DeserializeOwned;

use crate::error::{MapperError, MapperResult};
use crate::value::{Context, Value};

/// One result row: column name to value, in column order.
pub type Row = Context;

/// Rows returned by a driver.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// The one-row result of a non-select statement.
    pub fn affected(rows_affected: u64) -> Self {
        let count = i64::try_from(rows_affected).unwrap_or(i64::MAX);
        Self {
            columns: vec!["rows_affected".to_string()],
            rows: vec![Context::new().with("rows_affected", count)],
        }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first row, or [`MapperError::NoRows`].
    pub fn into_first(self) -> MapperResult<Row> {
        self.rows.into_iter().next().ok_or(MapperError::NoRows)
    }
}

/// Conversion from a single row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> MapperResult<Self>;
}

/// Conversion from a whole row set.
pub trait FromRows: Sized {
    /// Set for return types that take nothing from the rows.
    const EMPTY: bool = false;

    fn from_rows(rows: RowSet) -> MapperResult<Self>;
}

/// Deserialize a row into a record, matching columns to fields by name.
pub fn deserialize_row<T: DeserializeOwned>(row: &Row) -> MapperResult<T> {
    let json = serde_json::Value::from(Value::Tree(row.clone()));
    serde_json::from_value(json).map_err(|e| {
        MapperError::Marshal(format!("cannot decode row into {}: {}", std::any::type_name::<T>(), e))
    })
}

/// Convert the first row of `rows`.
pub fn first_row<T: FromRow>(rows: RowSet) -> MapperResult<T> {
    T::from_row(&rows.into_first()?)
}

fn first_column(row: &Row) -> MapperResult<&Value> {
    row.iter()
        .next()
        .map(|(_, value)| value)
        .ok_or_else(|| MapperError::Marshal("row has no columns".to_string()))
}

fn mismatch(target: &str, value: &Value) -> MapperError {
    MapperError::Marshal(format!("cannot convert {} value '{}' into {}", value.kind(), value, target))
}

/// Conversion of a single column value.
trait FromColumn: Sized {
    fn from_column(value: &Value) -> MapperResult<Self>;
}

impl FromColumn for i64 {
    fn from_column(value: &Value) -> MapperResult<Self> {
        match value.deref_shared() {
            Value::Int(n) => Ok(*n),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Value::String(s) => s.trim().parse().map_err(|_| mismatch("i64", value)),
            _ => Err(mismatch("i64", value)),
        }
    }
}

impl FromColumn for i32 {
    fn from_column(value: &Value) -> MapperResult<Self> {
        i32::try_from(i64::from_column(value)?).map_err(|_| mismatch("i32", value))
    }
}

impl FromColumn for u64 {
    fn from_column(value: &Value) -> MapperResult<Self> {
        u64::try_from(i64::from_column(value)?).map_err(|_| mismatch("u64", value))
    }
}

impl FromColumn for f64 {
    fn from_column(value: &Value) -> MapperResult<Self> {
        match value.deref_shared() {
            Value::Float(f) => Ok(*f),
            Value::Int(n) => Ok(*n as f64),
            Value::String(s) => s.trim().parse().map_err(|_| mismatch("f64", value)),
            _ => Err(mismatch("f64", value)),
        }
    }
}

impl FromColumn for bool {
    fn from_column(value: &Value) -> MapperResult<Self> {
        match value.deref_shared() {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromColumn for String {
    fn from_column(value: &Value) -> MapperResult<Self> {
        match value.deref_shared() {
            Value::String(s) => Ok(s.clone()),
            Value::Null | Value::List(_) | Value::Tree(_) => Err(mismatch("String", value)),
            other => Ok(other.to_string()),
        }
    }
}

impl FromColumn for Value {
    fn from_column(value: &Value) -> MapperResult<Self> {
        Ok(value.clone())
    }
}

macro_rules! scalar_rows {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl FromRow for $ty {
                fn from_row(row: &Row) -> MapperResult<Self> {
                    <$ty as FromColumn>::from_column(first_column(row)?)
                }
            }

            impl FromRows for $ty {
                fn from_rows(rows: RowSet) -> MapperResult<Self> {
                    first_row(rows)
                }
            }
        )+
    };
}

scalar_rows!(i64, i32, u64, f64, bool, String, Value);

impl FromRow for Row {
    fn from_row(row: &Row) -> MapperResult<Self> {
        Ok(row.clone())
    }
}

impl FromRows for Row {
    fn from_rows(rows: RowSet) -> MapperResult<Self> {
        rows.into_first()
    }
}

impl<T: FromRow> FromRows for Option<T> {
    fn from_rows(rows: RowSet) -> MapperResult<Self> {
        rows.rows.first().map(T::from_row).transpose()
    }
}

impl<T: FromRow> FromRows for Vec<T> {
    fn from_rows(rows: RowSet) -> MapperResult<Self> {
        rows.rows.iter().map(T::from_row).collect()
    }
}

impl FromRows for () {
    const EMPTY: bool = true;

    fn from_rows(_: RowSet) -> MapperResult<Self> {
        Ok(())
    }
}

/// Register `#[derive(Deserialize)]` structs as row records.
///
/// ```rust,ignore
/// #[derive(Debug, serde::Deserialize)]
/// struct User {
///     #[serde(rename = "user_id")]
///     id: i64,
///     name: String,
/// }
///
/// sqlweave::record!(User);
/// ```
#[macro_export]
macro_rules! record {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::marshal::FromRow for $ty {
                fn from_row(row: &$crate::marshal::Row) -> $crate::error::MapperResult<Self> {
                    $crate::marshal::deserialize_row(row)
                }
            }

            impl $crate::marshal::FromRows for $ty {
                fn from_rows(rows: $crate::marshal::RowSet) -> $crate::error::MapperResult<Self> {
                    $crate::marshal::first_row(rows)
                }
            }

            impl $crate::binding::Returns for $ty {
                fn shapes() -> ::std::vec::Vec<$crate::binding::Shape> {
                    ::std::vec![$crate::binding::Shape::Data(::std::any::type_name::<$ty>())]
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct User {
        #[serde(rename = "user_id")]
        id: i64,
        name: String,
        email: Option<String>,
    }

    crate::record!(User);

    fn users() -> RowSet {
        let mut set = RowSet::new(vec!["user_id".into(), "name".into(), "email".into()]);
        set.push(Context::new().with("user_id", 1).with("name", "ann").with("email", "a@x.io"));
        set.push(Context::new().with("user_id", 2).with("name", "bob").with("email", Value::Null));
        set
    }

    #[test]
    fn test_scalar_takes_first_column() {
        assert_eq!(i64::from_rows(users()).unwrap(), 1);
        assert_eq!(String::from_rows(users()).unwrap(), "1");
        let count = RowSet {
            columns: vec!["count".into()],
            rows: vec![Context::new().with("count", "42")],
        };
        assert_eq!(u64::from_rows(count).unwrap(), 42);
    }

    #[test]
    fn test_record_by_column_name() {
        let user = User::from_rows(users()).unwrap();
        assert_eq!(
            user,
            User {
                id: 1,
                name: "ann".to_string(),
                email: Some("a@x.io".to_string()),
            }
        );
    }

    #[test]
    fn test_vec_and_option() {
        let all = Vec::<User>::from_rows(users()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].email, None);

        let none = Option::<User>::from_rows(RowSet::default()).unwrap();
        assert_eq!(none, None);
        let empty = Vec::<Row>::from_rows(RowSet::default()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_single_row_shapes_need_a_row() {
        assert!(matches!(User::from_rows(RowSet::default()), Err(MapperError::NoRows)));
        assert!(matches!(i64::from_rows(RowSet::default()), Err(MapperError::NoRows)));
        assert!(matches!(Row::from_rows(RowSet::default()), Err(MapperError::NoRows)));
        assert!(<()>::from_rows(RowSet::default()).is_ok());
    }

    #[test]
    fn test_affected_row_set() {
        let set = RowSet::affected(3);
        assert_eq!(set.columns, vec!["rows_affected".to_string()]);
        assert_eq!(u64::from_rows(set).unwrap(), 3);
    }

    #[test]
    fn test_conversion_failures_are_marshal_errors() {
        let set = RowSet {
            columns: vec!["name".into()],
            rows: vec![Context::new().with("name", "ann")],
        };
        assert!(matches!(i64::from_rows(set.clone()), Err(MapperError::Marshal(_))));
        assert!(matches!(User::from_rows(set), Err(MapperError::Marshal(_))));
    }
}
