//! Error types for sqlweave.

use std::fmt::Display;

use thiserror::Error;

/// The main error type for sqlweave operations.
#[derive(Debug, Error)]
pub enum MapperError {
    /// A statement definition source is not well-formed.
    #[error("Parse error in {source_name} at line {line}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },

    /// Missing or invalid attribute on a definition element.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A placeholder or `slice` path does not resolve in the context.
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// A resolved value has an unexpected kind.
    #[error("Type error: {0}")]
    Type(String),

    /// The expression engine failed to compile or run a condition.
    #[error("Expression error: {0}")]
    Expression(String),

    /// A mapper function violates the one-input / failure-output contract.
    #[error("Binding error: {0}")]
    Binding(String),

    /// Unknown namespace or statement identifier.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure reported by the database driver.
    #[error("Database error: {0}")]
    Database(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A row set could not be converted into the declared return type.
    #[error("Marshal error: {0}")]
    Marshal(String),

    /// A single-row return type received an empty row set.
    #[error("Query returned no rows")]
    NoRows,

    /// Failure inside a nested definition element.
    #[error("<{tag}> {source}")]
    Element {
        tag: &'static str,
        #[source]
        source: Box<MapperError>,
    },

    /// Failure while resolving or executing a statement.
    #[error("{tag} '{id}': {source}")]
    Statement {
        tag: &'static str,
        id: String,
        #[source]
        source: Box<MapperError>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MapperError {
    /// Create a parse error at the given line of a named source.
    pub fn parse(source_name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }

    /// Wrap an error raised inside the element `tag`.
    pub fn element(tag: &'static str, source: MapperError) -> Self {
        Self::Element {
            tag,
            source: Box::new(source),
        }
    }

    /// Wrap an error with the statement tag and qualified identifier.
    pub fn statement(tag: &'static str, id: impl Into<String>, source: MapperError) -> Self {
        Self::Statement {
            tag,
            id: id.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through element and statement wrappers.
    pub fn root(&self) -> &MapperError {
        match self {
            Self::Element { source, .. } | Self::Statement { source, .. } => source.root(),
            other => other,
        }
    }
}

impl serde::ser::Error for MapperError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Type(msg.to_string())
    }
}

impl From<sqlx::Error> for MapperError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Result type alias for sqlweave operations.
pub type MapperResult<T> = Result<T, MapperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MapperError::parse("users.xml", 3, "unexpected end of input");
        assert_eq!(
            err.to_string(),
            "Parse error in users.xml at line 3: unexpected end of input"
        );
    }

    #[test]
    fn test_wrapped_display_and_root() {
        let inner = MapperError::Lookup("'name' not found".to_string());
        let err = MapperError::statement("select", "UserMapper.find", MapperError::element("if", inner));
        assert_eq!(
            err.to_string(),
            "select 'UserMapper.find': <if> Lookup error: 'name' not found"
        );
        assert!(matches!(err.root(), MapperError::Lookup(_)));
    }
}
