// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # askgraph
//!
//! Natural-language questions over a live property graph. A question is
//! answered by discovering the graph's schema, asking a language model for a
//! query that uses only that schema, running it, and retrying with the failed
//! attempts as feedback until a query returns rows or the budget runs out.
//!
//! ## Architecture
//!
//! - **Graph stores** (`graph`): schema discovery and query execution over
//!   Neo4j (Cypher, HTTP) or an embedded oxigraph store (SPARQL)
//! - **Oracles** (`oracle`): text completion behind one trait, providers picked by model name
//! - **Pipeline** (`pipeline`): feasibility gate, synthesis, extraction, retry loop, composition
//! - **Seed packs** (`seeds`): bundled sample data for bootstrapping a store
//!
//! ## Library usage
//!
//! ```no_run
//! use askgraph::config::PipelineConfig;
//! use askgraph::graph::GraphLoader;
//! use askgraph::graph::sparql::SparqlStore;
//! use askgraph::oracle::scripted::ScriptedOracle;
//! use askgraph::pipeline::Pipeline;
//! use askgraph::seeds::{DEFAULT_PACK, SeedPack};
//!
//! let store = SparqlStore::in_memory().unwrap();
//! store.load(&SeedPack::bundled(DEFAULT_PACK).unwrap()).unwrap();
//! let oracle = ScriptedOracle::new(["Yes", "SELECT ?s WHERE { ?s ?p ?o } LIMIT 1", "One node."]);
//! let pipeline = Pipeline::new(&store, &oracle, PipelineConfig::default()).unwrap();
//! let report = pipeline.ask("Name any node").unwrap();
//! println!("{:?}", report.outcome.explanation());
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod oracle;
pub mod pipeline;
pub mod seeds;
