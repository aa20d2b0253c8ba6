//! Seed packs: sample data for bootstrapping a graph store.
//!
//! A seed pack is a TOML-defined bundle of labelled nodes and typed
//! relationships. One pack is bundled into the binary: `supply-chain`.
//! Loading a pack is the only write path in askgraph; see
//! [`crate::graph::GraphLoader`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, Diagnostic)]
pub enum SeedError {
    #[error("seed pack not found: \"{id}\"")]
    #[diagnostic(
        code(askgraph::seed::not_found),
        help("The bundled pack is `supply-chain`. Use `--file` to load a pack from disk.")
    )]
    NotFound { id: String },

    #[error("failed to parse seed pack \"{id}\": {message}")]
    #[diagnostic(
        code(askgraph::seed::parse),
        help("Check the seed.toml syntax: a [seed] table plus `nodes` and `relationships` arrays.")
    )]
    Parse { id: String, message: String },

    #[error("failed to read seed file: {path}")]
    #[diagnostic(code(askgraph::seed::io), help("Ensure the file exists and is readable."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid seed pack \"{id}\": {message}")]
    #[diagnostic(
        code(askgraph::seed::invalid),
        help(
            "Node ids, labels, relationship types and property keys must be identifiers \
             ([A-Za-z_][A-Za-z0-9_]*), node ids must be unique and relationships must \
             reference declared nodes."
        )
    )]
    Invalid { id: String, message: String },
}

pub type SeedResult<T> = std::result::Result<T, SeedError>;

// ── Seed pack data model ────────────────────────────────────────────────

/// A scalar property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// A node with its labels and properties.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedNode {
    /// Pack-local identifier, referenced by relationships.
    pub id: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

/// A directed, typed relationship between two nodes of the pack.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedRelationship {
    pub from: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub to: String,
}

/// A seed pack: TOML-defined graph bundle.
#[derive(Debug, Clone)]
pub struct SeedPack {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub nodes: Vec<SeedNode>,
    pub relationships: Vec<SeedRelationship>,
}

// ── TOML deserialization helpers ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SeedToml {
    seed: SeedMeta,
    #[serde(default)]
    nodes: Vec<SeedNode>,
    #[serde(default)]
    relationships: Vec<SeedRelationship>,
}

#[derive(Debug, Deserialize)]
struct SeedMeta {
    id: String,
    name: String,
    version: String,
    description: String,
}

// ── Bundled seed packs ──────────────────────────────────────────────────

const SUPPLY_CHAIN_TOML: &str = include_str!("../../data/seeds/supply-chain/seed.toml");

/// Id of the pack loaded when none is named.
pub const DEFAULT_PACK: &str = "supply-chain";

/// Whether `s` can be spliced into a query as a label, type or key.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SeedPack {
    /// Parse and validate a pack from TOML.
    pub fn parse(toml_str: &str) -> SeedResult<Self> {
        let parsed: SeedToml = toml::from_str(toml_str).map_err(|e| SeedError::Parse {
            id: "(unknown)".into(),
            message: e.to_string(),
        })?;
        let pack = Self {
            id: parsed.seed.id,
            name: parsed.seed.name,
            version: parsed.seed.version,
            description: parsed.seed.description,
            nodes: parsed.nodes,
            relationships: parsed.relationships,
        };
        pack.validate()?;
        Ok(pack)
    }

    /// Load a pack from a TOML file on disk.
    pub fn from_file(path: &Path) -> SeedResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Look up a pack bundled into the binary.
    pub fn bundled(id: &str) -> SeedResult<Self> {
        match id {
            DEFAULT_PACK => Self::parse(SUPPLY_CHAIN_TOML),
            _ => Err(SeedError::NotFound { id: id.to_string() }),
        }
    }

    fn invalid(&self, message: String) -> SeedError {
        SeedError::Invalid {
            id: self.id.clone(),
            message,
        }
    }

    fn validate(&self) -> SeedResult<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !is_identifier(&node.id) {
                return Err(self.invalid(format!("node id \"{}\" is not an identifier", node.id)));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(self.invalid(format!("duplicate node id \"{}\"", node.id)));
            }
            if node.labels.is_empty() {
                return Err(self.invalid(format!("node \"{}\" has no labels", node.id)));
            }
            if let Some(label) = node.labels.iter().find(|l| !is_identifier(l)) {
                return Err(self.invalid(format!("label \"{label}\" is not an identifier")));
            }
            if let Some(key) = node.properties.keys().find(|k| !is_identifier(k)) {
                return Err(self.invalid(format!("property key \"{key}\" is not an identifier")));
            }
        }

        for rel in &self.relationships {
            if !is_identifier(&rel.rel_type) {
                return Err(self.invalid(format!(
                    "relationship type \"{}\" is not an identifier",
                    rel.rel_type
                )));
            }
            for end in [&rel.from, &rel.to] {
                if !ids.contains(end.as_str()) {
                    return Err(self.invalid(format!(
                        "relationship {} -[{}]-> {} references undeclared node \"{end}\"",
                        rel.from, rel.rel_type, rel.to
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_supply_chain_parses() {
        let pack = SeedPack::bundled(DEFAULT_PACK).unwrap();
        assert_eq!(pack.id, "supply-chain");
        assert_eq!(pack.nodes.len(), 41);
        assert_eq!(pack.relationships.len(), 83);

        let tesla = pack.nodes.iter().find(|n| n.id == "tesla").unwrap();
        assert_eq!(tesla.labels, vec!["Company".to_string()]);
        assert_eq!(
            tesla.properties.get("nationality"),
            Some(&PropertyValue::Text("USA".into()))
        );
    }

    #[test]
    fn unknown_bundled_pack_is_not_found() {
        assert!(matches!(
            SeedPack::bundled("healthcare"),
            Err(SeedError::NotFound { .. })
        ));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("IMPACTED_BY"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("bad label"));
        assert!(!is_identifier("x`) DETACH DELETE (n"));
        assert!(!is_identifier(""));
    }

    const MINIMAL: &str = r#"
        nodes = [
            { id = "a", labels = ["Company"], properties = { name = "A", founded = 1999, listed = true } },
            { id = "b", labels = ["Country"] },
        ]
        relationships = [{ from = "a", type = "SOURCES_FROM", to = "b" }]

        [seed]
        id = "mini"
        name = "Mini"
        version = "0.1.0"
        description = "two nodes"
    "#;

    #[test]
    fn typed_properties_parse() {
        let pack = SeedPack::parse(MINIMAL).unwrap();
        let a = &pack.nodes[0];
        assert_eq!(a.properties["founded"], PropertyValue::Int(1999));
        assert_eq!(a.properties["listed"], PropertyValue::Bool(true));
        assert!(pack.nodes[1].properties.is_empty());
    }

    #[test]
    fn dangling_relationship_is_rejected() {
        let broken = MINIMAL.replace("to = \"b\"", "to = \"c\"");
        let err = SeedPack::parse(&broken).unwrap_err();
        assert!(matches!(err, SeedError::Invalid { ref message, .. } if message.contains("\"c\"")));
    }

    #[test]
    fn non_identifier_type_is_rejected() {
        let broken = MINIMAL.replace("SOURCES_FROM", "SOURCES FROM");
        assert!(matches!(
            SeedPack::parse(&broken),
            Err(SeedError::Invalid { .. })
        ));
    }

    #[test]
    fn from_file_reads_pack() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("seed.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let pack = SeedPack::from_file(&path).unwrap();
        assert_eq!(pack.id, "mini");
    }
}
