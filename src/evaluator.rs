//! Control-element evaluator.
//!
//! Walks a statement tree and writes every node into one [`Render`]:
//!
//! - statements render their leading text, then their children;
//! - `<if>` renders its text and children only when `expr` is true;
//! - `<for>` expands a collection through the iteration strategies; it has
//!   no element children, which is checked at load time;
//! - the `<mapper>` root renders nothing.
//!
//! A child's trailing text belongs to the parent and is rendered in the
//! parent's scope right after the child, whether or not the child rendered
//! anything.

use crate::ast::{NodeKind, StatementNode};
use crate::error::{MapperError, MapperResult};
use crate::expr::Condition;
use crate::iteration;
use crate::template::{PlaceholderStyle, Render};
use crate::value::{Context, Lookup, Value};

pub struct Evaluator<'a> {
    engine: &'a dyn Condition,
    style: PlaceholderStyle,
}

impl<'a> Evaluator<'a> {
    pub fn new(engine: &'a dyn Condition, style: PlaceholderStyle) -> Self {
        Self { engine, style }
    }

    /// Render a top-level statement. Any failure is wrapped with the
    /// statement's tag and `id`; no partial output is returned.
    pub fn render(&self, node: &StatementNode, ctx: &Context, id: &str) -> MapperResult<Render> {
        let mut out = Render::new(self.style);
        self.eval(node, ctx, &mut out)
            .map_err(|e| MapperError::statement(node.tag(), id, e))?;
        Ok(out)
    }

    fn eval(&self, node: &StatementNode, scope: &dyn Lookup, out: &mut Render) -> MapperResult<()> {
        let descend = match node.kind() {
            NodeKind::Root => false,
            NodeKind::Statement(_) => {
                node.text().render(scope, out)?;
                true
            }
            NodeKind::If { expr } => {
                let holds = self.condition(expr.as_deref(), scope)?;
                if holds {
                    node.text().render(scope, out)?;
                }
                holds
            }
            NodeKind::For(clause) => {
                iteration::expand_clause(clause, node.text(), scope, out)?;
                false
            }
        };
        if !descend {
            return Ok(());
        }

        for child in node.children() {
            self.eval(child, scope, out)
                .map_err(|e| MapperError::element(child.tag(), e))?;
            child.tail().render(scope, out)?;
        }
        Ok(())
    }

    fn condition(&self, expr: Option<&str>, scope: &dyn Lookup) -> MapperResult<bool> {
        let source = expr.ok_or_else(|| MapperError::Config("attribute 'expr' not found".to_string()))?;
        if source.trim().is_empty() {
            return Err(MapperError::Config("attribute 'expr' value is empty".to_string()));
        }
        match self.engine.evaluate(source, scope)? {
            Value::Bool(b) => Ok(b),
            other => Err(MapperError::Type(format!(
                "expr '{}' result is not bool (found {})",
                source,
                other.kind()
            ))),
        }
    }
}
