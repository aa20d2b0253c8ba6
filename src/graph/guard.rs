//! Runtime read-only guard for generated queries.
//!
//! Candidate queries come from the oracle and are untrusted. The guard masks
//! string literals, quoted identifiers, IRIs and comments, then looks for
//! mutating clauses as whole words. A hit is reported as
//! [`GraphError::MutationBlocked`], which the retry loop treats like any
//! other failed attempt.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{GraphError, GraphResult};

use super::QueryDialect;

static CYPHER_MUTATIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:load\s+csv|call\s+(?:dbms|apoc)\.[a-z0-9_.]*|call\s+db\.(?:create|drop|index)[a-z0-9_.]*|create|merge|delete|detach|set|remove|drop|foreach)\b",
    )
    .expect("valid cypher guard pattern")
});

static SPARQL_MUTATIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:insert|delete|load|clear|drop|create|add|move|copy)\b")
        .expect("valid sparql guard pattern")
});

/// Rejects queries that would mutate the store.
#[derive(Debug, Clone, Copy)]
pub struct ReadOnlyGuard {
    dialect: QueryDialect,
}

impl ReadOnlyGuard {
    pub fn new(dialect: QueryDialect) -> Self {
        Self { dialect }
    }

    /// `Ok(())` when the query contains no mutating clause.
    pub fn check(&self, query: &str) -> GraphResult<()> {
        match self.find_mutation(query) {
            Some(clause) => Err(GraphError::MutationBlocked { clause }),
            None => Ok(()),
        }
    }

    /// The first mutating clause in `query`, upper-cased, if any.
    pub fn find_mutation(&self, query: &str) -> Option<String> {
        let masked = mask_literals(query, self.dialect);
        let pattern = match self.dialect {
            QueryDialect::Cypher => &*CYPHER_MUTATIONS,
            QueryDialect::Sparql => &*SPARQL_MUTATIONS,
        };

        pattern
            .find_iter(&masked)
            .find(|m| is_clause_position(&masked, m.start(), m.end()))
            .map(|m| {
                m.as_str()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_uppercase()
            })
    }
}

/// Keywords used as property names, labels, variables or map keys are not clauses.
fn is_clause_position(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    if matches!(before, Some('.' | ':' | '$' | '?')) {
        return false;
    }
    let after = text[end..].chars().find(|c| !c.is_whitespace());
    after != Some(':')
}

/// Replace the contents of literals, quoted identifiers, IRIs and comments with spaces.
fn mask_literals(query: &str, dialect: QueryDialect) -> String {
    let chars: Vec<char> = query.chars().collect();
    let mut out = String::with_capacity(query.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match (dialect, c, next) {
            (_, '\'' | '"', _) | (QueryDialect::Cypher, '`', _) => {
                let end = skip_quoted(&chars, i, c);
                mask_delimited(&mut out, &chars[i..end]);
                i = end;
            }
            (QueryDialect::Cypher, '/', Some('/')) | (QueryDialect::Sparql, '#', _) => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            (QueryDialect::Cypher, '/', Some('*')) => {
                let mut j = i + 2;
                while j + 1 < chars.len() && !(chars[j] == '*' && chars[j + 1] == '/') {
                    j += 1;
                }
                let end = (j + 2).min(chars.len());
                out.extend(std::iter::repeat_n(' ', end - i));
                i = end;
            }
            (QueryDialect::Sparql, '<', _) => match iri_end(&chars, i) {
                Some(end) => {
                    mask_delimited(&mut out, &chars[i..end]);
                    i = end;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            },
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Keep the delimiters of `span` and blank everything between them, so a
/// keyword written flush against a quote or bracket still ends at a word boundary.
fn mask_delimited(out: &mut String, span: &[char]) {
    let Some((&open, rest)) = span.split_first() else {
        return;
    };
    out.push(open);
    match rest.split_last() {
        Some((&close, inner)) if close == open || (open == '<' && close == '>') => {
            out.extend(std::iter::repeat_n(' ', inner.len()));
            out.push(close);
        }
        // Unterminated.
        _ => out.extend(std::iter::repeat_n(' ', rest.len())),
    }
}

/// Index just past the closing quote of a literal starting at `start`.
fn skip_quoted(chars: &[char], start: usize, quote: char) -> usize {
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' if quote != '`' => j += 2,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    chars.len()
}

/// Index just past `>` when `<` at `start` opens an IRI rather than a comparison.
fn iri_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '>' if j > start + 1 => return Some(j + 1),
            c if c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`') => {
                return None;
            }
            _ => j += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cypher() -> ReadOnlyGuard {
        ReadOnlyGuard::new(QueryDialect::Cypher)
    }

    fn sparql() -> ReadOnlyGuard {
        ReadOnlyGuard::new(QueryDialect::Sparql)
    }

    #[test]
    fn read_only_cypher_passes() {
        let q = "MATCH (c:Company {name: 'Tesla'})-[:IMPACTED_BY]->(r:RawMaterials) RETURN DISTINCT r.name";
        assert!(cypher().check(q).is_ok());
    }

    #[test]
    fn mutating_cypher_is_blocked() {
        for (q, clause) in [
            ("MATCH (n) DETACH DELETE n", "DETACH"),
            ("create (n:Company {name: 'X'})", "CREATE"),
            ("MATCH (n) SET n.name = 'x' RETURN n", "SET"),
            ("MERGE (a:Country {name: 'Chile'})", "MERGE"),
            ("LOAD  CSV FROM 'file:///x' AS row RETURN row", "LOAD CSV"),
            ("CALL dbms.security.createUser('x', 'y')", "CALL DBMS.SECURITY.CREATEUSER"),
            ("MATCH (n) REMOVE n:Company", "REMOVE"),
            ("MATCH (n) DELETE`n`", "DELETE"),
            ("MATCH (`n`) SET`n`.name = 'x'", "SET"),
            ("MATCH (n) WITH n DETACH DELETE`n`", "DETACH"),
        ] {
            let err = cypher().check(q).unwrap_err();
            assert!(
                matches!(&err, GraphError::MutationBlocked { clause: c } if c == clause),
                "{q} -> {err:?}"
            );
        }
    }

    #[test]
    fn keywords_inside_literals_and_names_are_ignored() {
        for q in [
            "MATCH (p:Policy {name: 'Create Delete Set'}) RETURN p",
            "MATCH (n) WHERE n.set = 1 RETURN n.remove",
            "MATCH (n:`DELETE ME`) RETURN n",
            "MATCH (n) RETURN {set: n.name} // then DELETE everything",
            "MATCH (n) /* MERGE */ RETURN n",
            "MATCH (a)-[:CREATE]->(b) RETURN b",
            "MATCH (n) WHERE n.name = \"it's \\\"set\\\"\" RETURN n",
        ] {
            assert!(cypher().check(q).is_ok(), "{q}");
        }
    }

    #[test]
    fn error_sentinel_is_not_a_mutation() {
        assert!(cypher().check("Error.").is_ok());
    }

    #[test]
    fn sparql_updates_are_blocked() {
        let err = sparql()
            .check("PREFIX kg: <http://askgraph.local/kg#> INSERT DATA { kg:a kg:b kg:c }")
            .unwrap_err();
        assert!(matches!(err, GraphError::MutationBlocked { clause } if clause == "INSERT"));
        assert!(sparql().check("CLEAR ALL").is_err());
        assert!(sparql().check("DELETE WHERE { ?s ?p ?o }").is_err());
    }

    #[test]
    fn sparql_reads_with_tricky_tokens_pass() {
        for q in [
            "SELECT ?add WHERE { ?add <http://x.org/delete> ?o }",
            "PREFIX kg: <http://askgraph.local/kg#> SELECT ?n WHERE { ?n kg:copy ?c . FILTER(?c < 5) }",
            "SELECT ?s WHERE { ?s ?p \"insert here\" } # drop this comment",
        ] {
            assert!(sparql().check(q).is_ok(), "{q}");
        }
    }

    #[test]
    fn comparison_does_not_hide_later_update() {
        let q = "SELECT * WHERE { FILTER(?a < ?b) } ; DELETE WHERE { ?s ?p ?o }";
        assert!(sparql().check(q).is_err());
    }
}
