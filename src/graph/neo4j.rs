//! Neo4j backend: Cypher over the HTTP transactional endpoint.
//!
//! Every call is a single auto-committed transaction posted to
//! `{base}/db/{database}/tx/commit`. Bolt-style URIs from the usual
//! `NEO4J_URI` setting are mapped onto the HTTP port of the same host.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};

use crate::config::StoreConfig;
use crate::error::{GraphError, GraphResult};
use crate::seeds::SeedPack;

use super::{GraphLoader, GraphStore, LoadReport, QueryDialect, ResultRow, ResultSet, Schema, SchemaFact};

/// Traversal that reports every node with at most one outgoing relationship.
pub const SCHEMA_QUERY: &str = "MATCH (n) OPTIONAL MATCH (n)-[r]->(m) RETURN DISTINCT labels(n) AS entityTypes, keys(n) AS propertyKeys, type(r) AS relationshipType, labels(m) AS relatedEntityTypes";

const CLEAR_QUERY: &str = "MATCH (n) DETACH DELETE n";

/// Default HTTP port used when the configured URI is a Bolt URI.
const HTTP_PORT: u16 = 7474;

/// One statement with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub parameters: Map<String, Value>,
}

/// Neo4j store reached over HTTP.
pub struct Neo4jStore {
    agent: ureq::Agent,
    base_url: String,
    database: String,
    username: String,
    authorization: String,
}

impl Neo4jStore {
    /// Build a client for the configured server. No request is sent until
    /// the first query.
    pub fn connect(config: &StoreConfig) -> GraphResult<Self> {
        let base_url = http_base_from_uri(&config.uri)?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let credentials = STANDARD.encode(format!("{}:{}", config.username, config.password));
        Ok(Self {
            agent,
            base_url,
            database: config.database.clone(),
            username: config.username.clone(),
            authorization: format!("Basic {credentials}"),
        })
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.base_url, self.database)
    }

    /// Post one statement and return its rows.
    fn run(&self, statement: &Statement) -> GraphResult<ResultSet> {
        let body = json!({
            "statements": [{
                "statement": statement.text,
                "parameters": statement.parameters,
            }]
        });
        let body_str = serde_json::to_string(&body).map_err(|e| GraphError::Protocol {
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = self
            .agent
            .post(&self.commit_url())
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .set("Authorization", &self.authorization)
            .send_string(&body_str)
            .map_err(|e| match e {
                ureq::Error::Status(401 | 403, _) => GraphError::Auth {
                    username: self.username.clone(),
                },
                ureq::Error::Status(code, resp) => GraphError::Protocol {
                    message: format!(
                        "server returned status {code}: {}",
                        resp.into_string().unwrap_or_default()
                    ),
                },
                ureq::Error::Transport(t) => GraphError::Unreachable {
                    uri: self.base_url.clone(),
                    message: t.to_string(),
                },
            })?;

        let resp_str = resp.into_string().map_err(|e| GraphError::Protocol {
            message: e.to_string(),
        })?;
        let json: Value = serde_json::from_str(&resp_str).map_err(|e| GraphError::Protocol {
            message: format!("invalid JSON response: {e}"),
        })?;
        parse_commit_response(&json, &self.username)
    }
}

impl GraphStore for Neo4jStore {
    fn dialect(&self) -> QueryDialect {
        QueryDialect::Cypher
    }

    fn location(&self) -> String {
        format!("{}/db/{}", self.base_url, self.database)
    }

    fn discover_schema(&self) -> GraphResult<Schema> {
        let rows = self.run(&Statement {
            text: SCHEMA_QUERY.into(),
            parameters: Map::new(),
        })?;
        let schema = Schema::from_facts(rows.iter().map(fact_from_row));
        tracing::debug!(rows = rows.len(), facts = schema.len(), "discovered neo4j schema");
        Ok(schema)
    }

    fn execute(&self, query: &str) -> GraphResult<ResultSet> {
        self.run(&Statement {
            text: query.into(),
            parameters: Map::new(),
        })
    }
}

impl GraphLoader for Neo4jStore {
    fn clear(&self) -> GraphResult<()> {
        self.run(&Statement {
            text: CLEAR_QUERY.into(),
            parameters: Map::new(),
        })?;
        Ok(())
    }

    fn load(&self, pack: &SeedPack) -> GraphResult<LoadReport> {
        self.run(&load_statement(pack))?;
        Ok(LoadReport {
            nodes: pack.nodes.len(),
            relationships: pack.relationships.len(),
        })
    }
}

impl std::fmt::Debug for Neo4jStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jStore")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("username", &self.username)
            .finish()
    }
}

/// Map a configured URI to the HTTP base of the same server.
///
/// `http(s)://` is used as is; `neo4j://` and `bolt://` become
/// `http://host:7474`; the `+s`/`+ssc` variants become `https://host`.
pub fn http_base_from_uri(uri: &str) -> GraphResult<String> {
    let unsupported = |message: &str| GraphError::Unreachable {
        uri: uri.to_string(),
        message: message.to_string(),
    };

    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| unsupported("missing URI scheme"))?;
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(unsupported("missing host"));
    }
    let host = match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    };

    match scheme.to_ascii_lowercase().as_str() {
        "http" | "https" => Ok(uri.trim_end_matches('/').to_string()),
        "neo4j" | "bolt" => Ok(format!("http://{host}:{HTTP_PORT}")),
        "neo4j+s" | "neo4j+ssc" | "bolt+s" | "bolt+ssc" => Ok(format!("https://{host}")),
        _ => Err(unsupported("unsupported URI scheme")),
    }
}

/// Turn a commit response into rows, or the first reported error.
///
/// Any status the server reports for the statement (client, database or
/// transient) rejects that query only. Security statuses are auth failures.
pub fn parse_commit_response(json: &Value, username: &str) -> GraphResult<ResultSet> {
    if let Some(error) = json["errors"].as_array().and_then(|errors| errors.first()) {
        let code = error["code"].as_str().unwrap_or("Neo.Unknown");
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(if code.starts_with("Neo.ClientError.Security") {
            GraphError::Auth {
                username: username.to_string(),
            }
        } else {
            GraphError::QueryRejected {
                message: format!("{code}: {message}"),
            }
        });
    }

    let Some(result) = json["results"].as_array().and_then(|results| results.first()) else {
        return Ok(Vec::new());
    };
    let columns: Vec<&str> = result["columns"]
        .as_array()
        .ok_or_else(|| GraphError::Protocol {
            message: "missing 'columns' field".into(),
        })?
        .iter()
        .filter_map(Value::as_str)
        .collect();

    let data = result["data"].as_array().map(Vec::as_slice).unwrap_or_default();
    let mut rows = Vec::with_capacity(data.len());
    for entry in data {
        let values = entry["row"].as_array().ok_or_else(|| GraphError::Protocol {
            message: "missing 'row' field".into(),
        })?;
        let row: ResultRow = columns
            .iter()
            .zip(values)
            .map(|(col, value)| (col.to_string(), value.clone()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn string_set(value: Option<&Value>) -> impl Iterator<Item = String> + '_ {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
}

/// One row of [`SCHEMA_QUERY`] as a fact. Missing columns read as empty.
fn fact_from_row(row: &ResultRow) -> SchemaFact {
    SchemaFact::new(
        string_set(row.get("entityTypes")),
        string_set(row.get("propertyKeys")),
        row.get("relationshipType").and_then(Value::as_str),
        string_set(row.get("relatedEntityTypes")),
    )
}

/// A whole seed pack as one parameterized `CREATE` statement.
///
/// Identifiers are validated by [`SeedPack`], so labels, types and node
/// variables are spliced directly; property values travel as parameters.
pub fn load_statement(pack: &SeedPack) -> Statement {
    let mut clauses = Vec::with_capacity(pack.nodes.len() + pack.relationships.len());
    let mut parameters = Map::new();

    for node in &pack.nodes {
        let labels: String = node.labels.iter().map(|l| format!(":{l}")).collect();
        clauses.push(format!("CREATE (v_{id}{labels} $p_{id})", id = node.id));
        let properties = serde_json::to_value(&node.properties).unwrap_or_else(|_| json!({}));
        parameters.insert(format!("p_{}", node.id), properties);
    }
    for rel in &pack.relationships {
        clauses.push(format!(
            "CREATE (v_{})-[:{}]->(v_{})",
            rel.from, rel.rel_type, rel.to
        ));
    }

    Statement {
        text: clauses.join("\n"),
        parameters,
    }
}
