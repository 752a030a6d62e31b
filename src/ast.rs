//! Statement AST.
//!
//! Built once from a parsed definition [`Element`] when a source is loaded.
//! Templates are parsed up front so malformed placeholders are reported at
//! load time, not on the first call.

use std::fmt;

use crate::error::{MapperError, MapperResult};
use crate::parser::Element;
use crate::template::Template;

pub const MAPPER: &str = "mapper";
pub const SELECT: &str = "select";
pub const INSERT: &str = "insert";
pub const UPDATE: &str = "update";
pub const DELETE: &str = "delete";
pub const IF: &str = "if";
pub const FOR: &str = "for";

/// The SQL verb of a top-level statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            SELECT => Some(Self::Select),
            INSERT => Some(Self::Insert),
            UPDATE => Some(Self::Update),
            DELETE => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Select => SELECT,
            Self::Insert => INSERT,
            Self::Update => UPDATE,
            Self::Delete => DELETE,
        }
    }

    /// Whether the statement returns rows rather than an affected count.
    pub fn returns_rows(&self) -> bool {
        matches!(self, Self::Select)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Attributes of a `<for>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct ForClause {
    /// Emits `column IN ` before the opening delimiter.
    pub column: Option<String>,
    /// Path to the collection; checked when the node is evaluated.
    pub slice: Option<String>,
    pub open: String,
    pub close: String,
    pub separator: String,
    /// Name the current element is bound to.
    pub item: String,
    /// Name the current index (or field name) is bound to.
    pub index: String,
}

impl ForClause {
    fn from_element(element: &Element) -> Self {
        let attr = |name: &str, default: &str| element.attr(name).unwrap_or(default).to_string();
        Self {
            column: element.attr("column").filter(|c| !c.trim().is_empty()).map(str::to_string),
            slice: element.attr("slice").map(str::to_string),
            open: attr("open", "("),
            close: attr("close", ")"),
            separator: attr("separator", ","),
            item: attr("item", "item"),
            index: attr("index", "index"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// `<mapper>`: the namespace root.
    Root,
    Statement(StatementKind),
    /// `<if expr="...">`; the attribute is checked when evaluated.
    If { expr: Option<String> },
    For(ForClause),
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Root => MAPPER,
            Self::Statement(kind) => kind.tag(),
            Self::If { .. } => IF,
            Self::For(_) => FOR,
        }
    }
}

/// A node of a statement tree.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementNode {
    kind: NodeKind,
    attributes: Vec<(String, String)>,
    text: Template,
    tail: Template,
    children: Vec<StatementNode>,
}

impl StatementNode {
    /// Convert a parsed element and its descendants.
    pub fn from_element(element: &Element) -> MapperResult<Self> {
        let kind = match element.tag.as_str() {
            MAPPER => NodeKind::Root,
            IF => NodeKind::If {
                expr: element.attr("expr").map(str::to_string),
            },
            FOR => NodeKind::For(ForClause::from_element(element)),
            other => match StatementKind::from_tag(other) {
                Some(kind) => NodeKind::Statement(kind),
                None => {
                    return Err(MapperError::Config(format!("unknown element <{}>", other)));
                }
            },
        };

        // `<for>` renders only its own template per element.
        if let (NodeKind::For(_), Some(child)) = (&kind, element.children.first()) {
            return Err(MapperError::element(
                kind.tag(),
                MapperError::Config(format!("<{}> cannot be nested in <for>", child.tag)),
            ));
        }

        let text = match kind {
            NodeKind::For(_) => Template::parse_iteration(&element.text),
            _ => Template::parse(&element.text),
        }
        .map_err(|e| MapperError::element(kind.tag(), e))?;
        let tail = Template::parse(&element.tail).map_err(|e| MapperError::element(kind.tag(), e))?;

        let children = element
            .children
            .iter()
            .map(StatementNode::from_element)
            .collect::<MapperResult<Vec<_>>>()
            .map_err(|e| MapperError::element(kind.tag(), e))?;

        Ok(Self {
            kind,
            attributes: element.attributes.clone(),
            text,
            tail,
            children,
        })
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// The SQL verb, for top-level statements.
    pub fn statement_kind(&self) -> Option<StatementKind> {
        match self.kind {
            NodeKind::Statement(kind) => Some(kind),
            _ => None,
        }
    }

    /// Leading text, before the first child.
    pub fn text(&self) -> &Template {
        &self.text
    }

    /// Trailing text, rendered in the parent's scope.
    pub fn tail(&self) -> &Template {
        &self.tail
    }

    pub fn children(&self) -> &[StatementNode] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_document;

    fn node(doc: &str) -> MapperResult<StatementNode> {
        let root = parse_document("test.xml", doc)?;
        StatementNode::from_element(&root)
    }

    #[test]
    fn test_build_tree() {
        let root = node(
            r#"<mapper namespace="n"><select id="find">SELECT * FROM t WHERE <for slice="{ids}" column="id"/></select></mapper>"#,
        )
        .unwrap();
        assert_eq!(root.kind(), &NodeKind::Root);
        assert_eq!(root.attr("namespace"), Some("n"));
        let select = &root.children()[0];
        assert_eq!(select.statement_kind(), Some(StatementKind::Select));
        assert_eq!(select.id(), Some("find"));
        match select.children()[0].kind() {
            NodeKind::For(clause) => {
                assert_eq!(clause.column.as_deref(), Some("id"));
                assert_eq!(clause.slice.as_deref(), Some("{ids}"));
                assert_eq!(clause.open, "(");
                assert_eq!(clause.close, ")");
                assert_eq!(clause.separator, ",");
                assert_eq!(clause.item, "item");
            }
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_element() {
        let err = node(r#"<mapper namespace="n"><merge id="m"/></mapper>"#).unwrap_err();
        assert!(matches!(err.root(), MapperError::Config(_)));
    }

    #[test]
    fn test_for_rejects_nested_elements() {
        let err = node(
            r#"<mapper namespace="n"><select id="a">SELECT 1 <for slice="ids" column="id">?<if expr="{item} > 1">x</if></for></select></mapper>"#,
        )
        .unwrap_err();
        assert!(matches!(err.root(), MapperError::Config(_)));
        assert_eq!(
            err.to_string(),
            "<mapper> <select> <for> Configuration error: <if> cannot be nested in <for>"
        );
    }

    #[test]
    fn test_malformed_template_fails_at_load() {
        let err = node(r#"<mapper namespace="n"><select id="a">SELECT {id</select></mapper>"#).unwrap_err();
        assert!(matches!(err.root(), MapperError::Config(_)));
        assert!(err.to_string().starts_with("<mapper> <select>"));
    }
}
