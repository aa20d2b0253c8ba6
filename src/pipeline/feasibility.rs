//! Feasibility gate: a lenient yes/no check before any query is synthesized.
//!
//! Only a reply that reads exactly `no` (trimmed, any case) blocks the
//! question. Anything else, including replies that are not an answer at
//! all, lets the retry loop try.

use crate::graph::Schema;
use crate::oracle::{Message, OracleResult, TextOracle};

/// Whether a gate reply blocks the question.
pub fn is_rejection(reply: &str) -> bool {
    reply.trim().eq_ignore_ascii_case("no")
}

/// Messages for the gate. Every message is a system message; the question
/// is the last one.
pub fn feasibility_messages(schema: &Schema, question: &str, domain_hint: Option<&str>) -> Vec<Message> {
    let mut role = String::from(
        "You are a careful assistant who knows graph databases well. Your only task is to \
         decide whether a user's question could be answered by querying the graph described below.",
    );
    if let Some(hint) = domain_hint {
        role.push_str(&format!(" The graph covers: {hint}."));
    }

    vec![
        Message::system(role),
        Message::system(format!(
            "Graph schema, one observed pattern per line:\n{}\n\n\
             Judge from this schema whether the question is worth attempting. If any entity \
             type, property or relationship in the schema appears in the question, or a word \
             closely associated with one does, let the question proceed. When in doubt, let \
             it proceed.",
            schema.render()
        )),
        Message::system(
            "Reply with exactly one word: `Yes` if the question can be attempted, `No` if it cannot.",
        ),
        Message::system(format!("The user's question: {question}")),
    ]
}

/// Ask the oracle whether the question is answerable from `schema`.
pub fn check_feasible(
    oracle: &dyn TextOracle,
    schema: &Schema,
    question: &str,
    domain_hint: Option<&str>,
) -> OracleResult<bool> {
    let reply = oracle.complete(&feasibility_messages(schema, question, domain_hint))?;
    let feasible = !is_rejection(&reply);
    tracing::info!(feasible, reply = %reply, "feasibility gate");
    Ok(feasible)
}
