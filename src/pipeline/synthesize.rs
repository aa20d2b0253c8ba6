//! Query synthesis prompts.
//!
//! The schema is the only vocabulary the oracle may use. From the second
//! attempt on, the failed candidates of earlier attempts are appended to the
//! user message so the oracle can steer away from them.

use crate::graph::{QueryDialect, Schema};
use crate::graph::sparql::KG_NS;
use crate::oracle::{Message, OracleResult, TextOracle};

use super::FeedbackLog;
use super::extract::{ERROR_SENTINEL, NO_ENTRIES};

/// Everything one synthesis call depends on.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub question: &'a str,
    pub schema: &'a Schema,
    pub dialect: QueryDialect,
    /// 1-based attempt number.
    pub attempt: usize,
    pub feedback: &'a FeedbackLog,
    pub domain_hint: Option<&'a str>,
}

fn naming_rules(dialect: QueryDialect) -> String {
    match dialect {
        QueryDialect::Cypher => "Naming: node labels are PascalCase (for example `Company`) and \
             relationship types are UPPER_SNAKE_CASE (for example `IMPACTED_BY`), exactly as \
             they appear in the schema. Use distinct variable names. Match property values \
             case-insensitively (for example with `toLower`) so that `tesla` finds `Tesla`."
            .to_string(),
        QueryDialect::Sparql => format!(
            "Naming: declare `PREFIX kg: <{KG_NS}>`. A node's labels are its `rdf:type` \
             values, written `?n a kg:Company`. Property keys and relationship types are \
             predicates, written `?n kg:name ?name` and `?a kg:IMPACTED_BY ?b`. Use the \
             schema's names exactly. Compare strings case-insensitively with \
             `FILTER(LCASE(STR(?name)) = \"tesla\")`. Only SELECT and ASK queries are accepted."
        ),
    }
}

/// Build the full conversation for one attempt.
pub fn synthesis_messages(req: &SynthesisRequest<'_>) -> Vec<Message> {
    let lang = req.dialect.name();
    let mut role = format!(
        "You are an expert at writing {lang} queries over a knowledge graph. You turn a user's \
         question into one precise, read-only {lang} query that fits the graph's structure."
    );
    if let Some(hint) = req.domain_hint {
        role.push_str(&format!(" The graph covers: {hint}."));
    }

    let mut messages = vec![
        Message::system(role),
        Message::system(
            "Never invent node labels, properties or relationship types. Never create, \
             update or delete data.",
        ),
        Message::system(format!(
            "Use only these node labels (entityTypes), their properties (propertyKeys) and the \
             relationships (relationshipType) that connect them to other labels \
             (relatedEntityTypes):\n{}",
            req.schema.render()
        )),
        Message::system(
            "Method: 1. Break the question into the entities and relationships it mentions, \
             including synonyms and related terms, and map each one onto the schema. \
             2. Entities are interconnected, so consider every relationship that could link \
             them. 3. Look for multi-hop chains through intermediate entities, following \
             relationships in either direction when that helps. 4. Reassemble the pieces so \
             the query answers the whole question, including every condition it states.",
        ),
        Message::system(format!(
            "Query rules: {} Return distinct rows, without duplicates. If nothing in the \
             schema is relevant to the question, reply exactly `{NO_ENTRIES}`. If you cannot \
             produce a query for any other reason, reply exactly `{ERROR_SENTINEL}`.",
            naming_rules(req.dialect)
        )),
        Message::system(format!(
            "Output: reply with a directly executable {lang} query and nothing else, or with \
             one of the two replies above."
        )),
    ];

    let mut user = format!("Write a {lang} query for this question: {}", req.question);
    if req.attempt > 1 && !req.feedback.is_empty() {
        user.push_str(&format!(
            "\n\nThis is attempt {}. The earlier attempts below failed: each one was rejected \
             by the database or returned no rows. Do not repeat them; change your approach.\n\n{}",
            req.attempt,
            req.feedback.render()
        ));
    }
    messages.push(Message::user(user));
    messages
}

/// Ask the oracle for one candidate. The raw reply is returned unchanged.
pub fn synthesize(oracle: &dyn TextOracle, req: &SynthesisRequest<'_>) -> OracleResult<String> {
    let raw = oracle.complete(&synthesis_messages(req))?;
    tracing::debug!(attempt = req.attempt, raw = %raw, "synthesized candidate");
    Ok(raw)
}
