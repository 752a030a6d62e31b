//! Iteration strategies for `<for>` elements.
//!
//! A `<for>` expands a collection from the context into a delimited list,
//! typically for `IN (...)` clauses:
//!
//! ```text
//! <for slice="{ids}" column="id">?</for>      ids = [1, 2, 3]
//!   literal: id IN (1,2,3)
//!   sql:     id IN (?,?,?)
//! ```
//!
//! The strategy is picked from the runtime kind of the collection: sequences
//! iterate their elements, records (trees) iterate their field values in
//! declaration order, shared references are dereferenced first.

use crate::ast::ForClause;
use crate::error::{MapperError, MapperResult};
use crate::template::{PlaceholderStyle, Render, Template};
use crate::value::{Context, Lookup, Path, Scope, Value};

/// Per-element rendering instructions.
pub struct ElementTemplate<'a> {
    pub template: &'a Template,
    pub separator: &'a str,
    /// Binding name for the current element.
    pub item: &'a str,
    /// Binding name for the current index or field name.
    pub index: &'a str,
}

impl ElementTemplate<'_> {
    fn render(
        &self,
        position: usize,
        index: Value,
        element: &Value,
        scope: &dyn Lookup,
        out: &mut Render,
    ) -> MapperResult<()> {
        if position > 0 {
            out.push_text(self.separator);
        }
        let mut local = Scope::new(scope);
        local.bind(self.item, element.clone());
        local.bind(self.index, index);
        self.template.write(&local, Some(element), out)
    }
}

/// A strategy that writes every element of a collection.
pub trait IterationPolicy: Sync {
    fn name(&self) -> &'static str;

    fn expand(
        &self,
        collection: &Value,
        element: &ElementTemplate<'_>,
        scope: &dyn Lookup,
        out: &mut Render,
    ) -> MapperResult<()>;
}

/// Iterates a sequence in order.
pub struct SequencePolicy;

impl IterationPolicy for SequencePolicy {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn expand(
        &self,
        collection: &Value,
        element: &ElementTemplate<'_>,
        scope: &dyn Lookup,
        out: &mut Render,
    ) -> MapperResult<()> {
        let Value::List(items) = collection else {
            return Err(mismatch(self, collection));
        };
        for (i, item) in items.iter().enumerate() {
            element.render(i, Value::Int(i as i64), item, scope, out)?;
        }
        Ok(())
    }
}

/// Iterates a record's field values in declaration order.
pub struct RecordPolicy;

impl IterationPolicy for RecordPolicy {
    fn name(&self) -> &'static str {
        "record"
    }

    fn expand(
        &self,
        collection: &Value,
        element: &ElementTemplate<'_>,
        scope: &dyn Lookup,
        out: &mut Render,
    ) -> MapperResult<()> {
        let Value::Tree(fields) = collection else {
            return Err(mismatch(self, collection));
        };
        for (i, (name, field)) in fields.iter().enumerate() {
            element.render(i, Value::String(name.clone()), field, scope, out)?;
        }
        Ok(())
    }
}

/// Dereferences a shared value and delegates to the pointee's strategy.
pub struct ReferencePolicy;

impl IterationPolicy for ReferencePolicy {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn expand(
        &self,
        collection: &Value,
        element: &ElementTemplate<'_>,
        scope: &dyn Lookup,
        out: &mut Render,
    ) -> MapperResult<()> {
        let Value::Shared(target) = collection else {
            return Err(mismatch(self, collection));
        };
        policy_for(target)?.expand(target, element, scope, out)
    }
}

fn mismatch(policy: &dyn IterationPolicy, value: &Value) -> MapperError {
    MapperError::Type(format!(
        "{} strategy cannot iterate a {}",
        policy.name(),
        value.kind()
    ))
}

/// Pick the strategy for a collection's runtime kind.
pub fn policy_for(collection: &Value) -> MapperResult<&'static dyn IterationPolicy> {
    match collection {
        Value::List(_) => Ok(&SequencePolicy),
        Value::Tree(_) => Ok(&RecordPolicy),
        Value::Shared(_) => Ok(&ReferencePolicy),
        other => Err(MapperError::Type(format!(
            "cannot iterate a {}; expected a sequence or record",
            other.kind()
        ))),
    }
}

/// Expand `collection` with an iteration template, joined by `separator`.
pub fn expand(collection: &Value, template: &str, separator: &str) -> MapperResult<Render> {
    let template = Template::parse_iteration(template)?;
    let element = ElementTemplate {
        template: &template,
        separator,
        item: "item",
        index: "index",
    };
    let mut out = Render::new(PlaceholderStyle::Question);
    policy_for(collection)?.expand(collection, &element, &Context::new(), &mut out)?;
    Ok(out)
}

/// Render a `<for>` element as one fragment of `out`.
pub fn expand_clause(
    clause: &ForClause,
    template: &Template,
    scope: &dyn Lookup,
    out: &mut Render,
) -> MapperResult<()> {
    let slice = clause
        .slice
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| MapperError::Lookup("attribute 'slice' is required".to_string()))?;
    let path = Path::parse(slice)
        .map_err(|_| MapperError::Lookup(format!("invalid slice path '{}'", slice)))?;
    let collection = path.resolve(scope)?;
    let policy = policy_for(collection).map_err(|_| {
        MapperError::Type(format!(
            "slice '{}' is not a sequence or record (found {})",
            path,
            collection.kind()
        ))
    })?;

    out.separate();
    if let Some(column) = &clause.column {
        out.push_text(column);
        out.push_text(" IN ");
    }
    out.push_text(&clause.open);
    let element = ElementTemplate {
        template,
        separator: &clause.separator,
        item: &clause.item,
        index: &clause.index,
    };
    policy.expand(collection, &element, scope, out)?;
    out.push_text(&clause.close);
    Ok(())
}
