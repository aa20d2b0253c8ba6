//! Answer composition: a short explanation of the final result set.

use crate::graph::{QueryDialect, ResultRow, Schema, render_rows};
use crate::oracle::{Message, OracleResult, TextOracle};

const NO_RESULTS_FALLBACK: &str = "No results were found in the graph for this question.";

/// Inputs to the final oracle call.
#[derive(Debug, Clone, Copy)]
pub struct CompositionRequest<'a> {
    pub question: &'a str,
    /// Winning query, or the last candidate tried when the budget ran out.
    pub query: Option<&'a str>,
    pub rows: &'a [ResultRow],
    pub schema: &'a Schema,
    pub dialect: QueryDialect,
    pub word_limit: usize,
    pub domain_hint: Option<&'a str>,
}

pub fn composition_messages(req: &CompositionRequest<'_>) -> Vec<Message> {
    let lang = req.dialect.name();
    let mut role = String::from(
        "You are an expert at explaining what data in a knowledge graph means for the person \
         who asked about it.",
    );
    if let Some(hint) = req.domain_hint {
        role.push_str(&format!(" The graph covers: {hint}."));
    }

    let results = if req.rows.is_empty() {
        "no rows".to_string()
    } else {
        render_rows(req.rows)
    };

    vec![
        Message::system(role),
        Message::system(format!(
            "Read the user's question and the {lang} query that was run, relate it to the \
             schema and answer the question as well as you can. Say what the results mean \
             and why someone would ask. If there are no results, say plainly that nothing was \
             found. Be clear and direct, in no more than {} words.",
            req.word_limit
        )),
        Message::user(format!(
            "My question was: {}\nThe query that was run: {}\nIts results: {results}\n\
             The graph schema:\n{}\nExplain what this means.",
            req.question,
            req.query.unwrap_or("(no query could be produced)"),
            req.schema.render(),
        )),
    ]
}

/// Keep at most `limit` words, joined by single spaces.
pub fn truncate_words(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= limit {
        return text.trim().to_string();
    }
    let mut truncated = words[..limit].join(" ");
    truncated.push('…');
    truncated
}

fn fallback(rows: usize) -> String {
    if rows == 0 {
        NO_RESULTS_FALLBACK.to_string()
    } else {
        format!("The query returned {rows} row(s).")
    }
}

/// One oracle call; the reply is bounded by the word limit and never empty.
pub fn compose(oracle: &dyn TextOracle, req: &CompositionRequest<'_>) -> OracleResult<String> {
    let reply = oracle.complete(&composition_messages(req))?;
    let explanation = truncate_words(&reply, req.word_limit);
    if explanation.is_empty() {
        tracing::warn!("oracle returned an empty explanation, using fallback");
        return Ok(fallback(req.rows.len()));
    }
    Ok(explanation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SchemaFact;
    use crate::oracle::scripted::ScriptedOracle;

    fn schema() -> Schema {
        Schema::from_facts([SchemaFact::new(
            ["Company"],
            ["name"],
            Some("IMPACTED_BY"),
            ["RawMaterials"],
        )])
    }

    fn rows() -> Vec<ResultRow> {
        vec![ResultRow::from([("material".to_string(), serde_json::json!("Aluminum"))])]
    }

    #[test]
    fn prompt_carries_query_results_and_limit() {
        let schema = schema();
        let rows = rows();
        let req = CompositionRequest {
            question: "What raw materials impact Tesla?",
            query: Some("MATCH (c:Company)-[:IMPACTED_BY]->(r) RETURN r.name AS material"),
            rows: &rows,
            schema: &schema,
            dialect: QueryDialect::Cypher,
            word_limit: 60,
            domain_hint: None,
        };
        let messages = composition_messages(&req);
        assert!(messages[1].content.contains("60 words"));
        let user = &messages[2].content;
        assert!(user.contains("RETURN r.name AS material"));
        assert!(user.contains("\"Aluminum\""));
        assert!(user.contains("IMPACTED_BY"));
    }

    #[test]
    fn empty_results_are_described() {
        let schema = schema();
        let req = CompositionRequest {
            question: "q",
            query: None,
            rows: &[],
            schema: &schema,
            dialect: QueryDialect::Cypher,
            word_limit: 60,
            domain_hint: None,
        };
        let user = &composition_messages(&req)[2].content;
        assert!(user.contains("no rows"));
        assert!(user.contains("(no query could be produced)"));
    }

    #[test]
    fn long_replies_are_truncated() {
        assert_eq!(truncate_words("a b c d", 2), "a b…");
        assert_eq!(truncate_words("  a  b ", 2), "a  b");
        assert_eq!(truncate_words("", 5), "");
    }

    #[test]
    fn empty_reply_falls_back() {
        let schema = schema();
        let oracle = ScriptedOracle::new(["   "]);
        let req = CompositionRequest {
            question: "q",
            query: Some("MATCH (n) RETURN n"),
            rows: &[],
            schema: &schema,
            dialect: QueryDialect::Cypher,
            word_limit: 60,
            domain_hint: None,
        };
        assert_eq!(compose(&oracle, &req).unwrap(), NO_RESULTS_FALLBACK);
    }

    #[test]
    fn explanation_stays_under_the_limit() {
        let schema = schema();
        let rows = rows();
        let oracle = ScriptedOracle::new(["word ".repeat(100)]);
        let req = CompositionRequest {
            question: "q",
            query: Some("MATCH (n) RETURN n"),
            rows: &rows,
            schema: &schema,
            dialect: QueryDialect::Cypher,
            word_limit: 10,
            domain_hint: None,
        };
        let explanation = compose(&oracle, &req).unwrap();
        assert_eq!(explanation.split_whitespace().count(), 10);
    }
}
