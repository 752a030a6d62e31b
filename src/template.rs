//! Placeholder templates.
//!
//! A template is SQL text with `{dotted.path}` placeholders. Rendering writes
//! two channels at once: a literal one where values are inlined, and a
//! parameterized one where every value becomes a positional marker and moves
//! to the parameter list.
//!
//! ```text
//! SELECT * FROM t WHERE id = {id} AND name = {name}
//!   literal: SELECT * FROM t WHERE id = 7 AND name = 'ann'
//!   sql:     SELECT * FROM t WHERE id = ? AND name = ?
//!   params:  [7, "ann"]
//! ```

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{map, map_res},
    multi::many0,
    sequence::delimited,
    IResult,
};
use crate::error::{MapperError, MapperResult};
use crate::value::{Context, Lookup, Path, Value};

/// How positional markers are spelled in the parameterized channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `?` (MySQL, SQLite)
    #[default]
    Question,
    /// `$1`, `$2`, ... (PostgreSQL)
    Dollar,
}

/// Output of rendering: literal SQL, parameterized SQL and parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Render {
    literal: String,
    sql: String,
    params: Vec<Value>,
    style: PlaceholderStyle,
}

impl Render {
    pub fn new(style: PlaceholderStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    /// SQL with values inlined.
    pub fn literal(&self) -> &str {
        &self.literal
    }

    /// SQL with positional markers.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn style(&self) -> PlaceholderStyle {
        self.style
    }

    pub fn is_empty(&self) -> bool {
        self.literal.is_empty() && self.sql.is_empty()
    }

    pub fn into_parts(self) -> (String, String, Vec<Value>) {
        (self.literal, self.sql, self.params)
    }

    /// Append text to both channels.
    pub fn push_text(&mut self, text: &str) {
        self.literal.push_str(text);
        self.sql.push_str(text);
    }

    /// Start a new fragment, separated from the previous one by a space.
    pub fn separate(&mut self) {
        if self.literal.chars().last().is_some_and(|c| !c.is_whitespace()) {
            self.push_text(" ");
        }
    }

    /// Append a value: inlined in the literal channel, a marker plus a
    /// parameter in the parameterized channel.
    pub fn push_value(&mut self, value: &Value) -> MapperResult<()> {
        let value = value.deref_shared();
        match value {
            Value::String(s) => {
                self.literal.push('\'');
                self.literal.push_str(&s.replace('\'', "''"));
                self.literal.push('\'');
            }
            Value::Int(n) => self.literal.push_str(&n.to_string()),
            Value::Float(n) => self.literal.push_str(&n.to_string()),
            Value::Bool(true) => self.literal.push_str("TRUE"),
            Value::Bool(false) => self.literal.push_str("FALSE"),
            Value::Null => self.literal.push_str("NULL"),
            other => {
                return Err(MapperError::Type(format!(
                    "unsupported placeholder value of kind {}",
                    other.kind()
                )));
            }
        }
        self.params.push(value.clone());
        match self.style {
            PlaceholderStyle::Question => self.sql.push('?'),
            PlaceholderStyle::Dollar => {
                self.sql.push('$');
                self.sql.push_str(&self.params.len().to_string());
            }
        }
        Ok(())
    }
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Placeholder(Path),
    /// `?` inside an iteration template: the current element.
    Slot,
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a statement template. The text is trimmed first.
    pub fn parse(source: &str) -> MapperResult<Self> {
        Self::parse_with(source, false)
    }

    /// Parse an iteration template, where a bare `?` is the element slot.
    /// An empty template is a lone slot.
    pub fn parse_iteration(source: &str) -> MapperResult<Self> {
        let mut template = Self::parse_with(source, true)?;
        if template.segments.is_empty() {
            template.segments.push(Segment::Slot);
        }
        Ok(template)
    }

    fn parse_with(source: &str, slots: bool) -> MapperResult<Self> {
        let source = source.trim();
        let parsed = if slots {
            many0(alt((placeholder, slot, text_until_slot)))(source)
        } else {
            many0(alt((placeholder, text)))(source)
        };
        match parsed {
            Ok(("", segments)) => Ok(Self {
                source: source.to_string(),
                segments,
            }),
            Ok((rest, _)) | Err(nom::Err::Error(nom::error::Error { input: rest, .. })) => {
                Err(MapperError::Config(format!(
                    "malformed placeholder at byte {} in template '{}'",
                    source.len() - rest.len(),
                    source
                )))
            }
            Err(e) => Err(MapperError::Config(format!(
                "malformed template '{}': {:?}",
                source, e
            ))),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Render as a new space-separated fragment of `out`.
    pub fn render(&self, scope: &dyn Lookup, out: &mut Render) -> MapperResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        out.separate();
        self.write(scope, None, out)
    }

    /// Render without fragment separation, filling slots with `element`.
    pub fn write(&self, scope: &dyn Lookup, element: Option<&Value>, out: &mut Render) -> MapperResult<()> {
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_text(text),
                Segment::Placeholder(path) => {
                    let value = path.resolve(scope)?;
                    out.push_value(value).map_err(|e| match e {
                        MapperError::Type(msg) => MapperError::Type(format!("'{}': {}", path, msg)),
                        other => other,
                    })?;
                }
                Segment::Slot => match element {
                    Some(value) => out.push_value(value)?,
                    None => out.push_text("?"),
                },
            }
        }
        Ok(())
    }
}

/// Resolve `template` against `ctx` with `?` markers.
pub fn resolve(template: &str, ctx: &Context) -> MapperResult<Render> {
    let mut out = Render::new(PlaceholderStyle::Question);
    Template::parse(template)?.render(ctx, &mut out)?;
    Ok(out)
}

/// Parse `{path}`.
fn placeholder(input: &str) -> IResult<&str, Segment> {
    map_res(
        delimited(char('{'), take_while1(|c| c != '}' && c != '{'), char('}')),
        |inner: &str| Path::parse(inner).map(Segment::Placeholder),
    )(input)
}

/// Parse a run of plain text.
fn text(input: &str) -> IResult<&str, Segment> {
    map(take_while1(|c| c != '{'), |s: &str| Segment::Text(s.to_string()))(input)
}

fn slot(input: &str) -> IResult<&str, Segment> {
    map(char('?'), |_| Segment::Slot)(input)
}

fn text_until_slot(input: &str) -> IResult<&str, Segment> {
    map(take_while1(|c| c != '{' && c != '?'), |s: &str| {
        Segment::Text(s.to_string())
    })(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> Context {
        Context::new().with("id", 7).with("name", "ann")
    }

    #[test]
    fn test_scenario_select() {
        let out = resolve("SELECT * FROM t WHERE id = {id} AND name = {name}", &ctx()).unwrap();
        assert_eq!(out.literal(), "SELECT * FROM t WHERE id = 7 AND name = 'ann'");
        assert_eq!(out.sql(), "SELECT * FROM t WHERE id = ? AND name = ?");
        assert_eq!(out.params(), &[Value::Int(7), Value::from("ann")]);
    }

    #[test]
    fn test_marker_count_matches_params() {
        let ctx = ctx().with("score", 2.5).with("active", true);
        let out = resolve("{id},{name},{score},{active},{id}", &ctx).unwrap();
        assert_eq!(out.sql().matches('?').count(), out.params().len());
        assert_eq!(out.literal(), "7,'ann',2.5,TRUE,7");
    }

    #[test]
    fn test_dollar_markers_are_numbered() {
        let mut out = Render::new(PlaceholderStyle::Dollar);
        Template::parse("a = {id} AND b = {name}")
            .unwrap()
            .render(&ctx(), &mut out)
            .unwrap();
        assert_eq!(out.sql(), "a = $1 AND b = $2");
    }

    #[test]
    fn test_quotes_are_escaped() {
        let ctx = Context::new().with("name", "o'brien");
        let out = resolve("name = {name}", &ctx).unwrap();
        assert_eq!(out.literal(), "name = 'o''brien'");
        assert_eq!(out.params(), &[Value::from("o'brien")]);
    }

    #[test]
    fn test_missing_placeholder_is_lookup_error() {
        let err = resolve("id = {user.id}", &ctx()).unwrap_err();
        assert!(matches!(err, MapperError::Lookup(_)));
    }

    #[test]
    fn test_complex_value_is_type_error() {
        let ctx = Context::new().with("ids", vec![1, 2]);
        let err = resolve("id = {ids}", &ctx).unwrap_err();
        assert!(matches!(err, MapperError::Type(_)));
    }

    #[test]
    fn test_malformed_templates() {
        assert!(matches!(Template::parse("id = {id"), Err(MapperError::Config(_))));
        assert!(matches!(Template::parse("id = {}"), Err(MapperError::Config(_))));
        assert!(matches!(Template::parse("id = {a{b}}"), Err(MapperError::Config(_))));
    }

    #[test]
    fn test_iteration_slot() {
        let template = Template::parse_iteration("?").unwrap();
        assert_eq!(template.segments(), &[Segment::Slot]);
        let empty = Template::parse_iteration("  ").unwrap();
        assert_eq!(empty.segments(), &[Segment::Slot]);
        let plain = Template::parse("a ? b").unwrap();
        assert_eq!(plain.segments(), &[Segment::Text("a ? b".to_string())]);
    }

    #[test]
    fn test_fragments_are_space_separated() {
        let mut out = Render::new(PlaceholderStyle::Question);
        Template::parse("SELECT *").unwrap().render(&ctx(), &mut out).unwrap();
        Template::parse("").unwrap().render(&ctx(), &mut out).unwrap();
        Template::parse("WHERE id = {id}").unwrap().render(&ctx(), &mut out).unwrap();
        assert_eq!(out.literal(), "SELECT * WHERE id = 7");
    }
}
