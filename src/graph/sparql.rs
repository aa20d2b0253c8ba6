//! Embedded property graph on oxigraph, queried with SPARQL.
//!
//! The property-graph model is mapped onto RDF as follows:
//!
//! - a node is an IRI in the [`NODE_NS`] namespace
//! - each label is an `rdf:type` object `kg:<Label>`
//! - each property is a literal-valued predicate `kg:<key>`
//! - each relationship is an IRI-valued predicate `kg:<TYPE>`
//!
//! where `kg:` is [`KG_NS`]. Query results map IRIs in either namespace back
//! to their local names so rows read like property-graph rows.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{GraphNameRef, Literal, NamedNode, Quad, Term};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use crate::error::{GraphError, GraphResult};
use crate::seeds::{PropertyValue, SeedPack};

use super::{GraphLoader, GraphStore, LoadReport, QueryDialect, ResultRow, ResultSet, Schema, SchemaFact};

/// Namespace for labels, property keys and relationship types.
pub const KG_NS: &str = "http://askgraph.local/kg#";

/// Namespace for node identities.
pub const NODE_NS: &str = "http://askgraph.local/node/";

/// oxigraph-backed graph store.
pub struct SparqlStore {
    store: Store,
    path: Option<PathBuf>,
}

#[derive(Default)]
struct NodeShape {
    types: BTreeSet<String>,
    keys: BTreeSet<String>,
    relationships: Vec<(String, String)>,
}

impl SparqlStore {
    /// Create a new in-memory store (no persistence).
    pub fn in_memory() -> GraphResult<Self> {
        let store = Store::new().map_err(|e| GraphError::Store {
            message: format!("failed to create oxigraph store: {e}"),
        })?;
        Ok(Self { store, path: None })
    }

    /// Open or create a persistent store at the given path.
    pub fn open(path: &Path) -> GraphResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| GraphError::Store {
            message: format!("failed to create oxigraph directory: {e}"),
        })?;
        let store = Store::open(path).map_err(|e| GraphError::Store {
            message: format!("failed to open oxigraph store at {}: {e}", path.display()),
        })?;
        Ok(Self {
            store,
            path: Some(path.to_path_buf()),
        })
    }

    fn vocab_iri(local: &str) -> GraphResult<NamedNode> {
        NamedNode::new(format!("{KG_NS}{local}")).map_err(|e| GraphError::Store {
            message: format!("invalid vocabulary term \"{local}\": {e}"),
        })
    }

    fn node_iri(id: &str) -> GraphResult<NamedNode> {
        NamedNode::new(format!("{NODE_NS}{id}")).map_err(|e| GraphError::Store {
            message: format!("invalid node id \"{id}\": {e}"),
        })
    }

    /// Strip the askgraph namespaces from an IRI.
    fn local_name(iri: &str) -> &str {
        iri.strip_prefix(KG_NS)
            .or_else(|| iri.strip_prefix(NODE_NS))
            .unwrap_or(iri)
    }

    fn literal_to_json(literal: &Literal) -> serde_json::Value {
        let value = literal.value();
        let datatype = literal.datatype();
        if datatype == xsd::INTEGER || datatype == xsd::INT || datatype == xsd::LONG {
            if let Ok(n) = value.parse::<i64>() {
                return n.into();
            }
        } else if datatype == xsd::DECIMAL || datatype == xsd::DOUBLE || datatype == xsd::FLOAT {
            if let Ok(x) = value.parse::<f64>() {
                return x.into();
            }
        } else if datatype == xsd::BOOLEAN {
            if let Ok(b) = value.parse::<bool>() {
                return b.into();
            }
        }
        value.into()
    }

    fn term_to_json(term: &Term) -> serde_json::Value {
        match term {
            Term::NamedNode(node) => Self::local_name(node.as_str()).into(),
            Term::Literal(literal) => Self::literal_to_json(literal),
            other => other.to_string().into(),
        }
    }

    fn insert(&self, quad: &Quad) -> GraphResult<()> {
        self.store.insert(quad).map_err(|e| GraphError::Store {
            message: format!("insert failed: {e}"),
        })?;
        Ok(())
    }

    fn property_literal(value: &PropertyValue) -> Literal {
        match value {
            PropertyValue::Bool(b) => Literal::from(*b),
            PropertyValue::Int(n) => Literal::from(*n),
            PropertyValue::Float(x) => Literal::from(*x),
            PropertyValue::Text(s) => Literal::new_simple_literal(s.as_str()),
        }
    }
}

impl GraphStore for SparqlStore {
    fn dialect(&self) -> QueryDialect {
        QueryDialect::Sparql
    }

    fn location(&self) -> String {
        match &self.path {
            Some(path) => format!("oxigraph:{}", path.display()),
            None => "oxigraph:memory".into(),
        }
    }

    /// One scan over every triple, folded into per-node shapes.
    fn discover_schema(&self) -> GraphResult<Schema> {
        let results = self
            .store
            .query("SELECT ?s ?p ?o WHERE { ?s ?p ?o }")
            .map_err(|e| GraphError::Store {
                message: format!("schema scan failed: {e}"),
            })?;
        let QueryResults::Solutions(solutions) = results else {
            return Err(GraphError::Protocol {
                message: "unexpected result type from schema scan".into(),
            });
        };

        let mut nodes: BTreeMap<String, NodeShape> = BTreeMap::new();
        for solution in solutions {
            let solution = solution.map_err(|e| GraphError::Store {
                message: format!("solution error: {e}"),
            })?;
            let (Some(s), Some(Term::NamedNode(p)), Some(o)) =
                (solution.get("s"), solution.get("p"), solution.get("o"))
            else {
                continue;
            };
            let shape = nodes.entry(s.to_string()).or_default();
            match o {
                Term::NamedNode(target) if p.as_ref() == rdf::TYPE => {
                    shape.types.insert(Self::local_name(target.as_str()).to_string());
                }
                Term::Literal(_) => {
                    shape.keys.insert(Self::local_name(p.as_str()).to_string());
                }
                other => shape
                    .relationships
                    .push((Self::local_name(p.as_str()).to_string(), other.to_string())),
            }
        }

        let empty = BTreeSet::new();
        let mut facts = Vec::new();
        for shape in nodes.values() {
            if shape.relationships.is_empty() {
                facts.push(SchemaFact {
                    entity_types: shape.types.clone(),
                    property_keys: shape.keys.clone(),
                    relationship_type: None,
                    related_entity_types: BTreeSet::new(),
                });
            }
            for (rel, target) in &shape.relationships {
                let related = nodes.get(target).map_or(&empty, |t| &t.types);
                facts.push(SchemaFact {
                    entity_types: shape.types.clone(),
                    property_keys: shape.keys.clone(),
                    relationship_type: Some(rel.clone()),
                    related_entity_types: related.clone(),
                });
            }
        }

        let schema = Schema::from_facts(facts);
        tracing::debug!(nodes = nodes.len(), facts = schema.len(), "discovered oxigraph schema");
        Ok(schema)
    }

    fn execute(&self, query: &str) -> GraphResult<ResultSet> {
        let results = self.store.query(query).map_err(|e| GraphError::QueryRejected {
            message: e.to_string(),
        })?;

        match results {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| GraphError::QueryRejected {
                        message: format!("solution error: {e}"),
                    })?;
                    let row: ResultRow = solution
                        .iter()
                        .map(|(var, term)| (var.as_str().to_string(), Self::term_to_json(term)))
                        .collect();
                    rows.push(row);
                }
                Ok(rows)
            }
            QueryResults::Boolean(b) => Ok(vec![ResultRow::from([("result".to_string(), b.into())])]),
            QueryResults::Graph(_) => Err(GraphError::QueryRejected {
                message: "CONSTRUCT/DESCRIBE queries are not supported; use SELECT or ASK".into(),
            }),
        }
    }
}

impl GraphLoader for SparqlStore {
    fn clear(&self) -> GraphResult<()> {
        self.store.clear().map_err(|e| GraphError::Store {
            message: format!("clear failed: {e}"),
        })
    }

    fn load(&self, pack: &SeedPack) -> GraphResult<LoadReport> {
        for node in &pack.nodes {
            let subject = Self::node_iri(&node.id)?;
            for label in &node.labels {
                self.insert(&Quad::new(
                    subject.clone(),
                    rdf::TYPE,
                    Self::vocab_iri(label)?,
                    GraphNameRef::DefaultGraph,
                ))?;
            }
            for (key, value) in &node.properties {
                self.insert(&Quad::new(
                    subject.clone(),
                    Self::vocab_iri(key)?,
                    Self::property_literal(value),
                    GraphNameRef::DefaultGraph,
                ))?;
            }
        }

        for rel in &pack.relationships {
            self.insert(&Quad::new(
                Self::node_iri(&rel.from)?,
                Self::vocab_iri(&rel.rel_type)?,
                Self::node_iri(&rel.to)?,
                GraphNameRef::DefaultGraph,
            ))?;
        }

        Ok(LoadReport {
            nodes: pack.nodes.len(),
            relationships: pack.relationships.len(),
        })
    }
}

impl std::fmt::Debug for SparqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparqlStore").field("path", &self.path).finish()
    }
}
