//! # sqlweave
//!
//! Dynamic SQL mapping: statements live in XML definition files, grouped by
//! namespace, with `{placeholders}`, `<if>` conditions and `<for>` lists.
//! Rendering produces both literal SQL and parameterized SQL with its bind
//! values; mapper structs bind typed functions to statements.
//!
//! ## Quick Example
//!
//! ```xml
//! <mapper namespace="UserMapper">
//!     <select id="find">
//!         SELECT * FROM users WHERE 1 = 1
//!         <if expr="{name} != nil">AND name = {name}</if>
//!         <if expr="{ids} != nil"><for slice="{ids}" column="AND id">?</for></if>
//!     </select>
//! </mapper>
//! ```
//!
//! ```rust,ignore
//! use sqlweave::prelude::*;
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct User { id: i64, name: String }
//! sqlweave::record!(User);
//!
//! sqlweave::mapper! {
//!     pub struct UserMapper {
//!         pub find: fn(Context) -> Result<Vec<User>, MapperError>,
//!     }
//! }
//!
//! let weave = Config::load()?.open().await?;
//! let mut users = UserMapper::default();
//! weave.bind(&mut users)?;
//!
//! let found = users.find.call(Context::new().with("ids", vec![1, 2, 3])).await?;
//! // SELECT * FROM users WHERE 1 = 1 AND id IN (?,?,?)
//! ```

pub mod ast;
pub mod binding;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod iteration;
pub mod marshal;
pub mod parser;
pub mod registry;
pub mod template;
pub mod value;

pub mod prelude {
    pub use crate::ast::StatementKind;
    pub use crate::binding::{Mapper, MapperFn};
    pub use crate::config::Config;
    pub use crate::context::normalize;
    pub use crate::engine::{Driver, DriverFuture, Prepared, SqlWeave, SqlxDriver};
    pub use crate::error::*;
    pub use crate::expr::{BuiltinEngine, ExpressionEngine};
    pub use crate::marshal::{FromRow, FromRows, Row, RowSet};
    pub use crate::registry::{DuplicatePolicy, Registry, Source};
    pub use crate::template::{PlaceholderStyle, Render};
    pub use crate::value::{Context, Value};
}

/// Resolve `{path}` placeholders in `template` against `ctx`.
///
/// # Example
///
/// ```
/// use sqlweave::value::Context;
///
/// let ctx = Context::new().with("id", 7).with("name", "ann");
/// let out = sqlweave::resolve("SELECT * FROM t WHERE id = {id} AND name = {name}", &ctx).unwrap();
/// assert_eq!(out.literal(), "SELECT * FROM t WHERE id = 7 AND name = 'ann'");
/// assert_eq!(out.sql(), "SELECT * FROM t WHERE id = ? AND name = ?");
/// ```
pub fn resolve(template: &str, ctx: &value::Context) -> error::MapperResult<template::Render> {
    template::resolve(template, ctx)
}
