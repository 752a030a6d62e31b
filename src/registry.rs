//! Namespace registry.
//!
//! Holds every loaded statement tree, keyed by namespace and statement id.
//! Built once during start-up, then shared read-only by all calls.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::ast::StatementNode;
use crate::error::{MapperError, MapperResult};
use crate::parser::parse_document;

/// What to do when a source declares a namespace that is already loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// The later source replaces the earlier namespace wholesale.
    #[default]
    Override,
    /// Loading fails with a configuration error.
    Reject,
}

/// A statement definition source.
#[derive(Debug, Clone)]
pub struct Source {
    /// Used in diagnostics, usually the file path.
    pub name: String,
    pub text: String,
}

impl Source {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn from_file(path: &Path) -> MapperResult<Self> {
        Ok(Self::new(path.display().to_string(), fs::read_to_string(path)?))
    }
}

/// Statements of one namespace, keyed by id in document order.
#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    origin: String,
    statements: IndexMap<String, StatementNode>,
}

impl Namespace {
    /// Build a namespace from one source.
    pub fn from_source(source: &Source) -> MapperResult<Self> {
        let root = parse_document(&source.name, &source.text)?;
        let name = root
            .attr("namespace")
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| {
                MapperError::Config(format!("{}: root element has no 'namespace' attribute", source.name))
            })?
            .to_string();

        let root = StatementNode::from_element(&root)
            .map_err(|e| MapperError::Config(format!("{}: {}", source.name, e)))?;

        let mut statements = IndexMap::new();
        for node in root.children() {
            if node.statement_kind().is_none() {
                return Err(MapperError::Config(format!(
                    "{}: <{}> is not allowed at the top level of namespace '{}'",
                    source.name,
                    node.tag(),
                    name
                )));
            }
            let id = node.id().map(str::trim).filter(|id| !id.is_empty()).ok_or_else(|| {
                MapperError::Config(format!(
                    "{}: <{}> in namespace '{}' has no 'id' attribute",
                    source.name,
                    node.tag(),
                    name
                ))
            })?;
            if statements.insert(id.to_string(), node.clone()).is_some() {
                return Err(MapperError::Config(format!(
                    "{}: duplicate statement id '{}' in namespace '{}'",
                    source.name, id, name
                )));
            }
        }

        Ok(Self {
            name,
            origin: source.name.clone(),
            statements,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the source the namespace was loaded from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn get(&self, id: &str) -> Option<&StatementNode> {
        self.statements.get(id)
    }

    pub fn statements(&self) -> impl Iterator<Item = (&str, &StatementNode)> {
        self.statements.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// All loaded namespaces.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    namespaces: HashMap<String, Namespace>,
}

impl Registry {
    /// Load every source in order.
    pub fn load<I>(sources: I, duplicates: DuplicatePolicy) -> MapperResult<Self>
    where
        I: IntoIterator<Item = Source>,
    {
        let mut registry = Self::default();
        for source in sources {
            registry.add(Namespace::from_source(&source)?, duplicates)?;
        }
        Ok(registry)
    }

    /// Load every file under `dir` (recursively) whose extension matches.
    /// Files are visited in sorted path order, so overrides are deterministic.
    pub fn load_dir(dir: &Path, extension: &str, duplicates: DuplicatePolicy) -> MapperResult<Self> {
        let mut files = Vec::new();
        collect_files(dir, extension, &mut files)?;
        files.sort();

        let mut registry = Self::default();
        for path in files {
            let namespace = Namespace::from_source(&Source::from_file(&path)?)?;
            info!(
                path = %path.display(),
                namespace = namespace.name(),
                statements = namespace.len(),
                "loaded mapper file"
            );
            registry.add(namespace, duplicates)?;
        }
        Ok(registry)
    }

    fn add(&mut self, namespace: Namespace, duplicates: DuplicatePolicy) -> MapperResult<()> {
        if let Some(existing) = self.namespaces.get(namespace.name()) {
            match duplicates {
                DuplicatePolicy::Reject => {
                    return Err(MapperError::Config(format!(
                        "namespace '{}' from {} is already defined in {}",
                        namespace.name(),
                        namespace.origin(),
                        existing.origin()
                    )));
                }
                DuplicatePolicy::Override => warn!(
                    namespace = namespace.name(),
                    previous = existing.origin(),
                    replacement = namespace.origin(),
                    "namespace overridden"
                ),
            }
        }
        self.namespaces.insert(namespace.name().to_string(), namespace);
        Ok(())
    }

    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.get(name)
    }

    /// Namespaces sorted by name.
    pub fn namespaces(&self) -> Vec<&Namespace> {
        let mut all: Vec<&Namespace> = self.namespaces.values().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn lookup(&self, namespace: &str, id: &str) -> MapperResult<&StatementNode> {
        self.namespaces
            .get(namespace)
            .ok_or_else(|| MapperError::NotFound(format!("namespace '{}'", namespace)))?
            .get(id)
            .ok_or_else(|| MapperError::NotFound(format!("statement '{}.{}'", namespace, id)))
    }

    /// Look up `Namespace.id`. The namespace part may itself contain dots.
    pub fn lookup_qualified(&self, qualified: &str) -> MapperResult<&StatementNode> {
        let (namespace, id) = split_qualified(qualified)?;
        self.lookup(namespace, id)
    }
}

/// Split `Namespace.id` at the last dot.
pub fn split_qualified(qualified: &str) -> MapperResult<(&str, &str)> {
    qualified
        .rsplit_once('.')
        .filter(|(ns, id)| !ns.is_empty() && !id.is_empty())
        .ok_or_else(|| {
            MapperError::NotFound(format!(
                "statement id '{}' is not of the form Namespace.id",
                qualified
            ))
        })
}

fn collect_files(dir: &Path, extension: &str, files: &mut Vec<PathBuf>) -> MapperResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, extension, files)?;
        } else if path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: &str = r#"<mapper namespace="UserMapper">
        <select id="find">SELECT * FROM users WHERE id = {id}</select>
        <delete id="remove">DELETE FROM users WHERE id = {id}</delete>
    </mapper>"#;

    const USERS_V2: &str = r#"<mapper namespace="UserMapper">
        <select id="count">SELECT COUNT(*) FROM users</select>
    </mapper>"#;

    #[test]
    fn test_load_and_lookup() {
        let registry = Registry::load([Source::new("users.xml", USERS)], DuplicatePolicy::Override).unwrap();
        let node = registry.lookup("UserMapper", "find").unwrap();
        assert_eq!(node.tag(), "select");
        assert_eq!(registry.lookup_qualified("UserMapper.remove").unwrap().tag(), "delete");
        let ns = registry.namespace("UserMapper").unwrap();
        let ids: Vec<&str> = ns.statements().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["find", "remove"]);
    }

    #[test]
    fn test_not_found() {
        let registry = Registry::load([Source::new("users.xml", USERS)], DuplicatePolicy::Override).unwrap();
        assert!(matches!(registry.lookup("Nope", "find"), Err(MapperError::NotFound(_))));
        assert!(matches!(registry.lookup("UserMapper", "nope"), Err(MapperError::NotFound(_))));
        assert!(matches!(registry.lookup_qualified("find"), Err(MapperError::NotFound(_))));
    }

    #[test]
    fn test_missing_namespace_attribute() {
        let err = Registry::load(
            [Source::new("bad.xml", "<mapper><select id=\"a\">SELECT 1</select></mapper>")],
            DuplicatePolicy::Override,
        )
        .unwrap_err();
        assert!(matches!(err, MapperError::Config(_)));
    }

    #[test]
    fn test_missing_and_duplicate_ids() {
        let missing = "<mapper namespace=\"n\"><select>SELECT 1</select></mapper>";
        let err = Registry::load([Source::new("a.xml", missing)], DuplicatePolicy::Override).unwrap_err();
        assert!(matches!(err, MapperError::Config(_)));

        let dup = "<mapper namespace=\"n\"><select id=\"a\">SELECT 1</select><select id=\"a\">SELECT 2</select></mapper>";
        let err = Registry::load([Source::new("b.xml", dup)], DuplicatePolicy::Override).unwrap_err();
        assert!(err.to_string().contains("duplicate statement id 'a'"));
    }

    #[test]
    fn test_duplicate_namespace_override() {
        let registry = Registry::load(
            [Source::new("v1.xml", USERS), Source::new("v2.xml", USERS_V2)],
            DuplicatePolicy::Override,
        )
        .unwrap();
        assert!(registry.lookup("UserMapper", "count").is_ok());
        assert!(registry.lookup("UserMapper", "find").is_err());
        assert_eq!(registry.namespace("UserMapper").unwrap().origin(), "v2.xml");
    }

    #[test]
    fn test_duplicate_namespace_reject() {
        let err = Registry::load(
            [Source::new("v1.xml", USERS), Source::new("v2.xml", USERS_V2)],
            DuplicatePolicy::Reject,
        )
        .unwrap_err();
        assert!(matches!(err, MapperError::Config(_)));
    }

    #[test]
    fn test_split_qualified_uses_last_dot() {
        assert_eq!(split_qualified("app.UserMapper.find").unwrap(), ("app.UserMapper", "find"));
        assert!(split_qualified("UserMapper.").is_err());
    }
}
