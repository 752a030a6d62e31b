//! Dynamic values and context trees.
//!
//! Every call normalizes its input into a [`Context`]: a string-keyed tree of
//! [`Value`]s. Templates, iteration elements and conditions all read from it
//! through the [`Lookup`] trait.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{MapperError, MapperResult};

/// Dynamic value carried by a context or a result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value (nil / SQL NULL).
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Tree(Context),
    /// Reference to a pre-normalized value shared between calls.
    Shared(Arc<Value>),
}

impl Value {
    /// Follow `Shared` references down to the pointee.
    pub fn deref_shared(&self) -> &Value {
        match self {
            Value::Shared(inner) => inner.deref_shared(),
            other => other,
        }
    }

    /// Short name of the runtime kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "sequence",
            Value::Tree(_) => "map",
            Value::Shared(_) => "reference",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.deref_shared(), Value::Null)
    }

    pub fn as_tree(&self) -> Option<&Context> {
        match self.deref_shared() {
            Value::Tree(ctx) => Some(ctx),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Tree(ctx) => {
                write!(f, "{{")?;
                for (i, (key, value)) in ctx.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Shared(inner) => write!(f, "{}", inner),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Tree(ctx) => ctx.serialize(serializer),
            Value::Shared(inner) => inner.serialize(serializer),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::Number(n.into()),
            Value::Float(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => serde_json::Value::Array(items.into_iter().map(Into::into).collect()),
            Value::Tree(ctx) => serde_json::Value::Object(
                ctx.entries.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
            Value::Shared(inner) => Value::clone(&inner).into(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Context> for Value {
    fn from(v: Context) -> Self {
        Value::Tree(v)
    }
}

impl From<Arc<Value>> for Value {
    fn from(v: Arc<Value>) -> Self {
        Value::Shared(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// String-keyed lookup tree built from one call's input.
///
/// Keys keep insertion order so that records iterate in field declaration
/// order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Context {
    entries: IndexMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Resolve a dotted path such as `user.address.city`.
    pub fn resolve(&self, path: &str) -> MapperResult<&Value> {
        Path::parse(path)?.resolve(self)
    }
}

impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Read access to the top level of a rendering scope.
pub trait Lookup {
    fn get(&self, key: &str) -> Option<&Value>;
}

impl Lookup for Context {
    fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }
}

/// A child scope layering local bindings over a parent lookup.
///
/// Iteration binds each element this way without copying the call context.
pub struct Scope<'a> {
    parent: &'a dyn Lookup,
    locals: Context,
}

impl<'a> Scope<'a> {
    pub fn new(parent: &'a dyn Lookup) -> Self {
        Self {
            parent,
            locals: Context::new(),
        }
    }

    pub fn bind(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.locals.insert(key, value);
    }
}

impl Lookup for Scope<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.locals.get(key).or_else(|| self.parent.get(key))
    }
}

/// A dot-separated path into a context tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    raw: String,
    segments: Vec<String>,
}

impl Path {
    /// Parse `a.b.c`. Surrounding braces (`{a.b}`) and whitespace are accepted.
    pub fn parse(raw: &str) -> MapperResult<Self> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed)
            .trim();
        let segments: Vec<String> = inner.split('.').map(|s| s.trim().to_string()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(MapperError::Config(format!("invalid path '{}'", raw)));
        }
        Ok(Self {
            raw: inner.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk the path through nested trees.
    ///
    /// A missing key is a lookup error; a non-final segment that is not a
    /// tree is a type error.
    pub fn resolve<'a>(&self, scope: &'a dyn Lookup) -> MapperResult<&'a Value> {
        let (first, rest) = self
            .segments
            .split_first()
            .ok_or_else(|| MapperError::Config("empty path".to_string()))?;
        let mut current = scope
            .get(first)
            .ok_or_else(|| MapperError::Lookup(format!("'{}' not found: key '{}' missing", self.raw, first)))?;
        let mut parent = first;
        for segment in rest {
            let tree = current.as_tree().ok_or_else(|| {
                MapperError::Type(format!(
                    "'{}' is not a map or record (found {}) in path '{}'",
                    parent,
                    current.deref_shared().kind(),
                    self.raw
                ))
            })?;
            current = tree.get(segment).ok_or_else(|| {
                MapperError::Lookup(format!("'{}' not found: key '{}' missing", self.raw, segment))
            })?;
            parent = segment;
        }
        Ok(current)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
