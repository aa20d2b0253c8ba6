//! Rich diagnostic error types for askgraph.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. [`AskError`] is the top-level type that
//! carries any of them through to the CLI.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::oracle::OracleError;
use crate::seeds::SeedError;

/// Top-level error type for askgraph.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum AskError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),
}

// ---------------------------------------------------------------------------
// Graph store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("graph store is unreachable at {uri}: {message}")]
    #[diagnostic(
        code(askgraph::graph::unreachable),
        help(
            "Check that the database is running and that `store.uri` (or NEO4J_URI) \
             points at its HTTP endpoint."
        )
    )]
    Unreachable { uri: String, message: String },

    #[error("graph store rejected the credentials for user \"{username}\"")]
    #[diagnostic(
        code(askgraph::graph::auth),
        help("Set NEO4J_USERNAME / NEO4J_PASSWORD or the `[store]` credentials in the config file.")
    )]
    Auth { username: String },

    #[error("query rejected by the store: {message}")]
    #[diagnostic(
        code(askgraph::graph::query_rejected),
        help("The store could not evaluate the submitted query: a syntax error, an unknown name, or a limit such as memory or transaction time.")
    )]
    QueryRejected { message: String },

    #[error("query contains a mutating clause: {clause}")]
    #[diagnostic(
        code(askgraph::graph::mutation_blocked),
        help(
            "Generated queries must be read-only. Set `pipeline.read_only_guard = false` \
             only if you trust every query the oracle can produce."
        )
    )]
    MutationBlocked { clause: String },

    #[error("unexpected response from the graph store: {message}")]
    #[diagnostic(
        code(askgraph::graph::protocol),
        help("The store answered in a format askgraph does not understand. Check the server version.")
    )]
    Protocol { message: String },

    #[error("graph store error: {message}")]
    #[diagnostic(
        code(askgraph::graph::store),
        help(
            "The embedded store could not be opened or written. Check that the data \
             directory exists and is writable."
        )
    )]
    Store { message: String },
}

impl GraphError {
    /// Whether the retry loop may consume this failure as a failed attempt.
    ///
    /// Only failures caused by the submitted query itself are recoverable;
    /// infrastructure failures abort the question.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::QueryRejected { .. } | Self::MutationBlocked { .. })
    }
}

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("the question is empty")]
    #[diagnostic(
        code(askgraph::pipeline::empty_question),
        help("Pass a question as an argument or type one at the prompt.")
    )]
    EmptyQuestion,

    #[error("invalid pipeline policy: {message}")]
    #[diagnostic(code(askgraph::pipeline::invalid_policy), help("Check the `[pipeline]` section. {message}"))]
    InvalidPolicy { message: String },
}

/// Convenience alias for functions returning askgraph results.
pub type AskResult<T> = std::result::Result<T, AskError>;

/// Convenience alias for graph store operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_converts_to_ask_error() {
        let err = GraphError::QueryRejected {
            message: "syntax".into(),
        };
        let ask: AskError = err.into();
        assert!(matches!(ask, AskError::Graph(GraphError::QueryRejected { .. })));
    }

    #[test]
    fn only_query_level_failures_are_recoverable() {
        assert!(GraphError::QueryRejected { message: "x".into() }.is_recoverable());
        assert!(GraphError::MutationBlocked { clause: "CREATE".into() }.is_recoverable());
        assert!(
            !GraphError::Unreachable {
                uri: "http://localhost:7474".into(),
                message: "refused".into()
            }
            .is_recoverable()
        );
        assert!(!GraphError::Auth { username: "neo4j".into() }.is_recoverable());
        assert!(!GraphError::Protocol { message: "x".into() }.is_recoverable());
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = GraphError::MutationBlocked {
            clause: "DETACH DELETE".into(),
        };
        assert!(format!("{err}").contains("DETACH DELETE"));
    }
}
