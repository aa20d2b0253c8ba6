//! Graph store boundary: schema discovery and query execution.
//!
//! The pipeline only needs two things from a store: the distinct set of
//! [`SchemaFact`]s currently present, and the ability to run an arbitrary
//! read query and get rows back. Two backends implement [`GraphStore`]:
//!
//! - **Neo4j** ([`neo4j::Neo4jStore`]): Cypher over the HTTP transactional endpoint
//! - **oxigraph** ([`sparql::SparqlStore`]): embedded RDF store queried with SPARQL
//!
//! [`Backend`] selects one of them from configuration.

pub mod guard;
pub mod neo4j;
pub mod sparql;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::GraphResult;
use crate::seeds::SeedPack;

/// One result row: column name to scalar or graph-entity value.
pub type ResultRow = BTreeMap<String, serde_json::Value>;

/// Rows in the order the store returned them.
pub type ResultSet = Vec<ResultRow>;

/// Declarative query language spoken by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryDialect {
    Cypher,
    Sparql,
}

impl QueryDialect {
    /// Human-readable language name used in prompts.
    pub fn name(self) -> &'static str {
        match self {
            Self::Cypher => "Cypher",
            Self::Sparql => "SPARQL",
        }
    }
}

impl fmt::Display for QueryDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One observed combination of labels, property keys and an outgoing relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFact {
    pub entity_types: BTreeSet<String>,
    pub property_keys: BTreeSet<String>,
    pub relationship_type: Option<String>,
    pub related_entity_types: BTreeSet<String>,
}

impl SchemaFact {
    pub fn new<L, K, R>(
        entity_types: L,
        property_keys: K,
        relationship_type: Option<&str>,
        related_entity_types: R,
    ) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            entity_types: entity_types.into_iter().map(Into::into).collect(),
            property_keys: property_keys.into_iter().map(Into::into).collect(),
            relationship_type: relationship_type.map(str::to_string),
            related_entity_types: related_entity_types.into_iter().map(Into::into).collect(),
        }
    }
}

fn join_set(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for SchemaFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entityTypes: [{}], propertyKeys: [{}], relationshipType: {}, relatedEntityTypes: [{}]",
            join_set(&self.entity_types),
            join_set(&self.property_keys),
            self.relationship_type.as_deref().unwrap_or("null"),
            join_set(&self.related_entity_types),
        )
    }
}

/// The distinct schema facts of a store, recomputed for every question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    facts: Vec<SchemaFact>,
}

impl Schema {
    /// Build a schema, dropping repeated facts while keeping first-seen order.
    pub fn from_facts(facts: impl IntoIterator<Item = SchemaFact>) -> Self {
        let mut seen = HashSet::new();
        let facts = facts
            .into_iter()
            .filter(|fact| seen.insert(fact.clone()))
            .collect();
        Self { facts }
    }

    pub fn facts(&self) -> &[SchemaFact] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Render the schema as prompt context, one fact per line.
    pub fn render(&self) -> String {
        if self.facts.is_empty() {
            return "(the graph is empty)".into();
        }
        self.facts
            .iter()
            .map(|fact| format!("- {fact}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Render rows as compact JSON for prompt context.
pub fn render_rows(rows: &[ResultRow]) -> String {
    serde_json::to_string(rows).unwrap_or_else(|_| format!("{} row(s)", rows.len()))
}

/// Read-side capabilities the pipeline needs from a graph store.
pub trait GraphStore {
    /// Query language accepted by [`GraphStore::execute`].
    fn dialect(&self) -> QueryDialect;

    /// Where the store lives, for logs and diagnostics.
    fn location(&self) -> String;

    /// Discover the distinct schema facts currently present.
    fn discover_schema(&self) -> GraphResult<Schema>;

    /// Run a query verbatim and return its rows.
    fn execute(&self, query: &str) -> GraphResult<ResultSet>;
}

/// Summary of a seed pack load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub nodes: usize,
    pub relationships: usize,
}

/// Write-side capabilities used only to bootstrap sample data.
pub trait GraphLoader {
    /// Remove every node and relationship.
    fn clear(&self) -> GraphResult<()>;

    /// Create the nodes and relationships of a seed pack.
    fn load(&self, pack: &SeedPack) -> GraphResult<LoadReport>;
}

/// The configured store, opened once per process.
#[derive(Debug)]
pub enum Backend {
    Neo4j(neo4j::Neo4jStore),
    Sparql(sparql::SparqlStore),
}

impl Backend {
    pub fn open(config: &StoreConfig) -> GraphResult<Self> {
        let backend = match config.backend {
            StoreBackend::Neo4j => Self::Neo4j(neo4j::Neo4jStore::connect(config)?),
            StoreBackend::Oxigraph => match &config.path {
                Some(path) => Self::Sparql(sparql::SparqlStore::open(path)?),
                None => Self::Sparql(sparql::SparqlStore::in_memory()?),
            },
        };
        tracing::info!(
            backend = ?config.backend,
            location = %backend.location(),
            "opened graph store"
        );
        Ok(backend)
    }
}

impl GraphStore for Backend {
    fn dialect(&self) -> QueryDialect {
        match self {
            Self::Neo4j(s) => s.dialect(),
            Self::Sparql(s) => s.dialect(),
        }
    }

    fn location(&self) -> String {
        match self {
            Self::Neo4j(s) => s.location(),
            Self::Sparql(s) => s.location(),
        }
    }

    fn discover_schema(&self) -> GraphResult<Schema> {
        match self {
            Self::Neo4j(s) => s.discover_schema(),
            Self::Sparql(s) => s.discover_schema(),
        }
    }

    fn execute(&self, query: &str) -> GraphResult<ResultSet> {
        match self {
            Self::Neo4j(s) => s.execute(query),
            Self::Sparql(s) => s.execute(query),
        }
    }
}

impl GraphLoader for Backend {
    fn clear(&self) -> GraphResult<()> {
        match self {
            Self::Neo4j(s) => s.clear(),
            Self::Sparql(s) => s.clear(),
        }
    }

    fn load(&self, pack: &SeedPack) -> GraphResult<LoadReport> {
        match self {
            Self::Neo4j(s) => s.load(pack),
            Self::Sparql(s) => s.load(pack),
        }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        tracing::info!(location = %self.location(), "closed graph store");
    }
}
