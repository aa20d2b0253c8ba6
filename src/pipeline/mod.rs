//! Question answering: schema-grounded query synthesis with a bounded retry loop.
//!
//! One question runs start to finish through [`Pipeline::ask`]:
//!
//! 1. discover the store's schema (fatal on failure)
//! 2. ask the feasibility gate; a `No` ends in [`Outcome::Rejected`]
//! 3. synthesize, extract and execute candidates until one returns rows or
//!    `max_attempts` is spent, feeding failed candidates back each time
//! 4. compose an explanation, for exhausted questions too
//!
//! The store and the oracle are borrowed for the lifetime of the pipeline;
//! nothing here outlives a call to [`Pipeline::ask`] except the report.

pub mod compose;
pub mod extract;
pub mod feasibility;
pub mod synthesize;

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::{AskResult, GraphError, PipelineError};
use crate::graph::guard::ReadOnlyGuard;
use crate::graph::{GraphStore, QueryDialect, ResultSet};
use crate::oracle::TextOracle;

use self::compose::CompositionRequest;
use self::extract::Candidate;
use self::synthesize::SynthesisRequest;

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The candidate returned this many rows.
    Success { rows: usize },
    /// The candidate ran and returned nothing.
    EmptyResult,
    /// The store or the read-only guard refused the candidate.
    ExecutionFailed { error: String },
    /// The oracle reported no entries; nothing was executed.
    ExtractionError,
}

/// One trip through synthesize, extract and execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub run_number: usize,
    pub candidate_query: Option<String>,
    pub outcome: AttemptOutcome,
}

/// Failed candidates fed back to the synthesizer, oldest first.
///
/// Holds at most `cap` entries, evicting the oldest. An extraction failure
/// is recorded as an empty marker entry.
#[derive(Debug, Clone, Default)]
pub struct FeedbackLog {
    entries: VecDeque<String>,
    cap: Option<usize>,
    total: usize,
}

impl FeedbackLog {
    /// `None` keeps every entry.
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            cap,
            total: 0,
        }
    }

    pub fn push(&mut self, candidate: impl Into<String>) {
        self.entries.push_back(candidate.into());
        self.total += 1;
        if let Some(cap) = self.cap {
            while self.entries.len() > cap {
                self.entries.pop_front();
            }
        }
    }

    /// Record an attempt that produced no query.
    pub fn push_marker(&mut self) {
        self.push(String::new());
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Failures recorded, including evicted ones.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Entries labelled with the attempt that produced them.
    pub fn render(&self) -> String {
        let first = self.total - self.entries.len() + 1;
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let run = first + i;
                if entry.is_empty() {
                    format!("Attempt {run}: no query was produced")
                } else {
                    format!("Attempt {run}:\n{entry}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Terminal state of one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The feasibility gate said no. No attempt was made.
    Rejected,
    /// A candidate returned rows.
    Answered {
        query: String,
        rows: ResultSet,
        explanation: String,
    },
    /// Every attempt failed. The explanation is best effort.
    Exhausted {
        last_query: Option<String>,
        rows: ResultSet,
        explanation: String,
    },
}

impl Outcome {
    /// The executed query to show the user, if any.
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Rejected => None,
            Self::Answered { query, .. } => Some(query),
            Self::Exhausted { last_query, .. } => last_query.as_deref(),
        }
    }

    pub fn explanation(&self) -> Option<&str> {
        match self {
            Self::Rejected => None,
            Self::Answered { explanation, .. } | Self::Exhausted { explanation, .. } => {
                Some(explanation)
            }
        }
    }
}

/// Everything that happened while answering one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionReport {
    pub question: String,
    pub dialect: QueryDialect,
    pub schema_facts: usize,
    pub attempts: Vec<Attempt>,
    /// Feedback log as it stood when the loop ended.
    pub feedback: Vec<String>,
    pub outcome: Outcome,
}

/// The retry controller with its collaborators injected.
pub struct Pipeline<'a> {
    store: &'a dyn GraphStore,
    oracle: &'a dyn TextOracle,
    policy: PipelineConfig,
    guard: Option<ReadOnlyGuard>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a dyn GraphStore,
        oracle: &'a dyn TextOracle,
        policy: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        policy.validate().map_err(|e| PipelineError::InvalidPolicy {
            message: e.to_string(),
        })?;
        let guard = policy
            .read_only_guard
            .then(|| ReadOnlyGuard::new(store.dialect()));
        Ok(Self {
            store,
            oracle,
            policy,
            guard,
        })
    }

    /// Guard, then store.
    fn run_candidate(&self, query: &str) -> Result<ResultSet, GraphError> {
        if let Some(guard) = &self.guard {
            guard.check(query)?;
        }
        self.store.execute(query)
    }

    /// Answer one question.
    ///
    /// Errors are fatal: an unreachable store, an oracle failure or an empty
    /// question. Everything the loop can retry ends up in the report.
    pub fn ask(&self, question: &str) -> AskResult<QuestionReport> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion.into());
        }
        let dialect = self.store.dialect();
        let hint = self.policy.domain_hint.as_deref();

        let schema = self.store.discover_schema()?;
        tracing::info!(facts = schema.len(), location = %self.store.location(), "schema discovered");

        let mut report = QuestionReport {
            question: question.to_string(),
            dialect,
            schema_facts: schema.len(),
            attempts: Vec::new(),
            feedback: Vec::new(),
            outcome: Outcome::Rejected,
        };

        if !feasibility::check_feasible(self.oracle, &schema, question, hint)? {
            tracing::info!("question rejected by the feasibility gate");
            return Ok(report);
        }

        let mut feedback = FeedbackLog::new(self.policy.feedback_limit());
        let mut last_candidate: Option<String> = None;
        let mut winner: Option<(String, ResultSet)> = None;

        for attempt in 1..=self.policy.max_attempts {
            let raw = synthesize::synthesize(
                self.oracle,
                &SynthesisRequest {
                    question,
                    schema: &schema,
                    dialect,
                    attempt,
                    feedback: &feedback,
                    domain_hint: hint,
                },
            )?;

            let query = match extract::extract(&raw) {
                Candidate::Query(query) => query,
                Candidate::NoEntries => {
                    tracing::info!(attempt, outcome = "no_entries", "attempt failed");
                    feedback.push_marker();
                    report.attempts.push(Attempt {
                        run_number: attempt,
                        candidate_query: None,
                        outcome: AttemptOutcome::ExtractionError,
                    });
                    continue;
                }
            };

            let outcome = match self.run_candidate(&query) {
                Ok(rows) if !rows.is_empty() => {
                    tracing::info!(attempt, rows = rows.len(), outcome = "success", "attempt succeeded");
                    report.attempts.push(Attempt {
                        run_number: attempt,
                        candidate_query: Some(query.clone()),
                        outcome: AttemptOutcome::Success { rows: rows.len() },
                    });
                    winner = Some((query, rows));
                    break;
                }
                Ok(_) => {
                    tracing::info!(attempt, outcome = "empty", query = %query, "attempt failed");
                    AttemptOutcome::EmptyResult
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(attempt, outcome = "execution_failed", query = %query, error = %e, "attempt failed");
                    AttemptOutcome::ExecutionFailed { error: e.to_string() }
                }
                Err(e) => return Err(e.into()),
            };

            report.attempts.push(Attempt {
                run_number: attempt,
                candidate_query: Some(query.clone()),
                outcome,
            });
            feedback.push(query.as_str());
            last_candidate = Some(query);
        }

        report.feedback = feedback.entries().map(str::to_string).collect();

        let (query, rows) = match &winner {
            Some((query, rows)) => (Some(query.as_str()), rows.as_slice()),
            None => {
                tracing::warn!(
                    attempts = report.attempts.len(),
                    feedback_entries = feedback.total(),
                    "attempt budget exhausted"
                );
                (last_candidate.as_deref(), &[][..])
            }
        };

        let explanation = compose::compose(
            self.oracle,
            &CompositionRequest {
                question,
                query,
                rows,
                schema: &schema,
                dialect,
                word_limit: self.policy.answer_word_limit,
                domain_hint: hint,
            },
        )?;

        report.outcome = match winner {
            Some((query, rows)) => Outcome::Answered {
                query,
                rows,
                explanation,
            },
            None => Outcome::Exhausted {
                last_query: last_candidate,
                rows: Vec::new(),
                explanation,
            },
        };
        Ok(report)
    }
}

impl std::fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("store", &self.store.location())
            .field("oracle", &self.oracle.name())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::error::AskError;
    use crate::graph::{ResultRow, Schema, SchemaFact};
    use crate::oracle::scripted::ScriptedOracle;

    /// Store that returns rows only for one exact query.
    struct FakeStore {
        answer_to: &'static str,
        fail_with: Option<fn() -> GraphError>,
        executed: RefCell<Vec<String>>,
    }

    impl FakeStore {
        fn answering(query: &'static str) -> Self {
            Self {
                answer_to: query,
                fail_with: None,
                executed: RefCell::new(Vec::new()),
            }
        }
    }

    impl GraphStore for FakeStore {
        fn dialect(&self) -> QueryDialect {
            QueryDialect::Cypher
        }

        fn location(&self) -> String {
            "fake".into()
        }

        fn discover_schema(&self) -> Result<Schema, GraphError> {
            Ok(Schema::from_facts([SchemaFact::new(
                ["Company"],
                ["name"],
                Some("IMPACTED_BY"),
                ["RawMaterials"],
            )]))
        }

        fn execute(&self, query: &str) -> Result<ResultSet, GraphError> {
            self.executed.borrow_mut().push(query.to_string());
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            if query == self.answer_to {
                Ok(vec![ResultRow::from([("name".to_string(), serde_json::json!("Aluminum"))])])
            } else if query.starts_with("BROKEN") {
                Err(GraphError::QueryRejected {
                    message: "syntax error".into(),
                })
            } else if query.starts_with("HEAVY") {
                let response = serde_json::json!({
                    "results": [],
                    "errors": [{
                        "code": "Neo.TransientError.General.MemoryPoolOutOfMemoryError",
                        "message": "The allocation of an extra 2.0 MiB would use more than the limit"
                    }]
                });
                crate::graph::neo4j::parse_commit_response(&response, "neo4j")
            } else {
                Ok(Vec::new())
            }
        }
    }

    const GOOD: &str = "MATCH (c:Company)-[:IMPACTED_BY]->(r) RETURN r.name AS name";

    fn policy(max_attempts: usize) -> PipelineConfig {
        PipelineConfig {
            max_attempts,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn first_attempt_success_skips_feedback() {
        let store = FakeStore::answering(GOOD);
        let fenced = format!("```cypher\n{GOOD}\n```");
        let oracle = ScriptedOracle::new(["Yes", fenced.as_str(), "Aluminum."]);
        let report = Pipeline::new(&store, &oracle, policy(10)).unwrap().ask("What impacts Tesla?").unwrap();

        assert_eq!(report.attempts.len(), 1);
        assert!(report.feedback.is_empty());
        assert!(matches!(&report.outcome, Outcome::Answered { query, rows, .. } if query == GOOD && rows.len() == 1));
        assert_eq!(report.outcome.explanation(), Some("Aluminum."));
        assert_eq!(report.outcome.query(), Some(GOOD));
        assert_eq!(oracle.call_count(), 3);
    }

    #[test]
    fn rejection_consumes_no_attempts() {
        let store = FakeStore::answering(GOOD);
        let oracle = ScriptedOracle::new(["no"]);
        let report = Pipeline::new(&store, &oracle, policy(10)).unwrap().ask("Which planets?").unwrap();
        assert_eq!(report.outcome, Outcome::Rejected);
        assert_eq!(report.outcome.query(), None);
        assert!(report.attempts.is_empty());
        assert!(store.executed.borrow().is_empty());
        assert_eq!(oracle.call_count(), 1);
    }

    #[test]
    fn failures_feed_back_and_winner_is_excluded() {
        let store = FakeStore::answering(GOOD);
        let oracle = ScriptedOracle::new([
            "Yes",
            "MATCH (n:Planet) RETURN n",
            "No entries to display.",
            "BROKEN query",
            GOOD,
            "Explained.",
        ]);
        let report = Pipeline::new(&store, &oracle, policy(10)).unwrap().ask("What impacts Tesla?").unwrap();

        assert_eq!(report.feedback, vec!["MATCH (n:Planet) RETURN n", "", "BROKEN query"]);
        let outcomes: Vec<_> = report.attempts.iter().map(|a| &a.outcome).collect();
        assert_eq!(outcomes[0], &AttemptOutcome::EmptyResult);
        assert_eq!(outcomes[1], &AttemptOutcome::ExtractionError);
        assert!(matches!(outcomes[2], AttemptOutcome::ExecutionFailed { .. }));
        assert_eq!(outcomes[3], &AttemptOutcome::Success { rows: 1 });
        let runs: Vec<_> = report.attempts.iter().map(|a| a.run_number).collect();
        assert_eq!(runs, vec![1, 2, 3, 4]);

        // The sentinel attempt never reached the store.
        assert_eq!(store.executed.borrow().len(), 3);

        // Attempt 4 saw all three failures.
        let calls = oracle.calls();
        let fourth = &calls[4].last().unwrap().content;
        assert!(fourth.contains("MATCH (n:Planet) RETURN n"));
        assert!(fourth.contains("BROKEN query"));
        let first = &calls[1].last().unwrap().content;
        assert!(!first.contains("Attempt"));
    }

    #[test]
    fn exhaustion_still_composes_an_explanation() {
        let store = FakeStore::answering(GOOD);
        let oracle = ScriptedOracle::new(["Yes", "MATCH (a) RETURN a", "No entries to display.", "MATCH (b) RETURN b", "Nothing found."]);
        let report = Pipeline::new(&store, &oracle, policy(3)).unwrap().ask("Which planets supply lithium?").unwrap();

        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.feedback.len(), 3);
        match &report.outcome {
            Outcome::Exhausted { last_query, rows, explanation } => {
                assert_eq!(last_query.as_deref(), Some("MATCH (b) RETURN b"));
                assert!(rows.is_empty());
                assert_eq!(explanation, "Nothing found.");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(report.outcome.query(), Some("MATCH (b) RETURN b"));
        // gate + 3 syntheses + composer
        assert_eq!(oracle.call_count(), 5);
        assert_eq!(oracle.remaining(), 0);
    }

    #[test]
    fn error_sentinel_reaches_the_store() {
        let store = FakeStore::answering(GOOD);
        let oracle = ScriptedOracle::new(["Yes", "Error.", GOOD, "ok"]);
        let report = Pipeline::new(&store, &oracle, policy(5)).unwrap().ask("q").unwrap();
        assert_eq!(store.executed.borrow()[0], "Error.");
        assert_eq!(report.feedback, vec!["Error."]);
    }

    #[test]
    fn guard_blocks_mutations_before_the_store() {
        let store = FakeStore::answering(GOOD);
        let oracle = ScriptedOracle::new(["Yes", "MATCH (n) DETACH DELETE n", GOOD, "ok"]);
        let report = Pipeline::new(&store, &oracle, policy(5)).unwrap().ask("q").unwrap();
        assert!(matches!(
            &report.attempts[0].outcome,
            AttemptOutcome::ExecutionFailed { error } if error.contains("DETACH")
        ));
        assert_eq!(*store.executed.borrow(), vec![GOOD.to_string()]);
    }

    #[test]
    fn disabled_guard_passes_mutations_through() {
        let store = FakeStore::answering(GOOD);
        let oracle = ScriptedOracle::new(["Yes", "MATCH (n) DETACH DELETE n", GOOD, "ok"]);
        let policy = PipelineConfig {
            read_only_guard: false,
            ..policy(5)
        };
        Pipeline::new(&store, &oracle, policy).unwrap().ask("q").unwrap();
        assert_eq!(store.executed.borrow()[0], "MATCH (n) DETACH DELETE n");
    }

    #[test]
    fn transport_failure_in_the_loop_is_fatal() {
        let store = FakeStore {
            fail_with: Some(|| GraphError::Unreachable {
                uri: "http://localhost:7474".into(),
                message: "connection refused".into(),
            }),
            ..FakeStore::answering(GOOD)
        };
        let oracle = ScriptedOracle::new(["Yes", GOOD]);
        let err = Pipeline::new(&store, &oracle, policy(5)).unwrap().ask("q").unwrap_err();
        assert!(matches!(err, AskError::Graph(GraphError::Unreachable { .. })));
    }

    #[test]
    fn store_side_execution_errors_consume_an_attempt() {
        let store = FakeStore::answering(GOOD);
        let oracle = ScriptedOracle::new(["Yes", "HEAVY MATCH (a)-[*]->(b) RETURN b", GOOD, "ok"]);
        let report = Pipeline::new(&store, &oracle, policy(5)).unwrap().ask("q").unwrap();

        assert!(matches!(
            &report.attempts[0].outcome,
            AttemptOutcome::ExecutionFailed { error } if error.contains("MemoryPoolOutOfMemoryError")
        ));
        assert_eq!(report.attempts[1].outcome, AttemptOutcome::Success { rows: 1 });
        assert_eq!(report.feedback, vec!["HEAVY MATCH (a)-[*]->(b) RETURN b"]);
        assert!(matches!(report.outcome, Outcome::Answered { .. }));
    }

    #[test]
    fn oracle_failure_is_fatal() {
        let store = FakeStore::answering(GOOD);
        let oracle = ScriptedOracle::new(["Yes"]);
        let err = Pipeline::new(&store, &oracle, policy(5)).unwrap().ask("q").unwrap_err();
        assert!(matches!(err, AskError::Oracle(_)));
    }

    #[test]
    fn empty_question_is_refused() {
        let store = FakeStore::answering(GOOD);
        let oracle = ScriptedOracle::default();
        let err = Pipeline::new(&store, &oracle, policy(5)).unwrap().ask("   ").unwrap_err();
        assert!(matches!(err, AskError::Pipeline(PipelineError::EmptyQuestion)));
        assert_eq!(oracle.call_count(), 0);
    }

    #[test]
    fn zero_attempts_is_an_invalid_policy() {
        let store = FakeStore::answering(GOOD);
        let oracle = ScriptedOracle::default();
        assert!(matches!(
            Pipeline::new(&store, &oracle, policy(0)),
            Err(PipelineError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn feedback_cap_evicts_oldest() {
        let mut log = FeedbackLog::new(Some(2));
        log.push("a");
        log.push_marker();
        log.push("c");
        assert_eq!(log.entries().collect::<Vec<_>>(), vec!["", "c"]);
        assert_eq!(log.total(), 3);
        let rendered = log.render();
        assert!(rendered.starts_with("Attempt 2: no query was produced\n\n"));
        assert!(!rendered.contains("No entries to display."));
        assert!(rendered.ends_with("Attempt 3:\nc"));
    }

    #[test]
    fn capped_log_matches_uncapped_when_cap_covers_budget() {
        let mut capped = FeedbackLog::new(Some(10));
        let mut uncapped = FeedbackLog::new(None);
        for i in 0..10 {
            capped.push(format!("q{i}"));
            uncapped.push(format!("q{i}"));
        }
        assert!(capped.entries().eq(uncapped.entries()));
    }

    #[test]
    fn report_serializes_with_status_tags() {
        let report = QuestionReport {
            question: "q".into(),
            dialect: QueryDialect::Cypher,
            schema_facts: 1,
            attempts: vec![Attempt {
                run_number: 1,
                candidate_query: None,
                outcome: AttemptOutcome::ExtractionError,
            }],
            feedback: vec![String::new()],
            outcome: Outcome::Rejected,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "rejected");
        assert_eq!(json["attempts"][0]["outcome"]["kind"], "extraction_error");
        assert_eq!(json["dialect"], "cypher");
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn attempts_are_bounded_and_feedback_tracks_failures(
                max_attempts in 1usize..8,
                replies in proptest::collection::vec(
                    prop_oneof![
                        Just("MATCH (x) RETURN x".to_string()),
                        Just("No entries to display.".to_string()),
                        Just("BROKEN".to_string()),
                        Just(GOOD.to_string()),
                    ],
                    8,
                ),
            ) {
                let store = FakeStore::answering(GOOD);
                let oracle = ScriptedOracle::new(["Yes".to_string()]);
                for reply in &replies {
                    oracle.push(reply.clone());
                }
                oracle.push("done");
                let policy = PipelineConfig { max_attempts, feedback_cap: 0, ..PipelineConfig::default() };
                let report = Pipeline::new(&store, &oracle, policy).unwrap().ask("q").unwrap();

                prop_assert!(report.attempts.len() <= max_attempts);
                for (i, attempt) in report.attempts.iter().enumerate() {
                    prop_assert_eq!(attempt.run_number, i + 1);
                }
                let failures = report
                    .attempts
                    .iter()
                    .filter(|a| !matches!(a.outcome, AttemptOutcome::Success { .. }))
                    .count();
                prop_assert_eq!(report.feedback.len(), failures);
                prop_assert!(!report.feedback.iter().any(|f| f == GOOD));
                match &report.outcome {
                    Outcome::Answered { .. } => prop_assert_eq!(failures + 1, report.attempts.len()),
                    Outcome::Exhausted { .. } => prop_assert_eq!(failures, max_attempts),
                    Outcome::Rejected => prop_assert!(false, "gate said yes"),
                }
            }
        }
    }
}
