//! Candidate extraction: raw oracle text to one executable query.

use std::sync::LazyLock;

use regex::Regex;

/// Reply meaning the oracle found nothing relevant in the schema.
pub const NO_ENTRIES: &str = "No entries to display.";

/// Reply the oracle is told to give on an internal failure. Not recognized
/// by [`extract`]; it reaches the store as a query and fails there.
pub const ERROR_SENTINEL: &str = "Error.";

/// First fenced block. A language tag is recognized when it is `cypher` or
/// `sparql`, or when any word sits alone on the opening fence line.
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:(?i:cypher|sparql)\b|[A-Za-z][\w+-]*[ \t]*\r?\n)?(.*?)```")
        .expect("valid fenced block pattern")
});

/// What the retry loop should do with a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Submit this text to the store.
    Query(String),
    /// The oracle reported no entries, or produced nothing to run.
    NoEntries,
}

impl Candidate {
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Query(q) => Some(q),
            Self::NoEntries => None,
        }
    }
}

pub fn extract(raw: &str) -> Candidate {
    let candidate = match FENCED_BLOCK.captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => {
            let trimmed = raw.trim();
            if trimmed == NO_ENTRIES {
                return Candidate::NoEntries;
            }
            trimmed
        }
    };

    if candidate.is_empty() {
        Candidate::NoEntries
    } else {
        Candidate::Query(candidate.to_string())
    }
}
