//! Runtime configuration: TOML file, environment overrides, CLI overrides.
//!
//! The file lives at `$XDG_CONFIG_HOME/askgraph/config.toml` unless a path is
//! given explicitly. Every field has a serde default, so a missing file, an
//! empty file and a partial file are all valid. Provider credentials are never
//! read from the file; see [`crate::oracle::from_config`].

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(askgraph::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(askgraph::config::parse),
        help("Check the TOML syntax and the section names: [store], [oracle], [pipeline].")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(askgraph::config::invalid), help("{message}"))]
    Invalid { message: String },

    #[error("cannot determine home directory")]
    #[diagnostic(
        code(askgraph::config::no_home),
        help("Set HOME or XDG_CONFIG_HOME, or pass --config explicitly.")
    )]
    NoHome,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Which graph store implementation to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Neo4j over its HTTP API (Cypher).
    Neo4j,
    /// Embedded oxigraph store (SPARQL).
    Oxigraph,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Neo4j endpoint. `neo4j://`, `bolt://` and `http(s)://` forms are accepted.
    pub uri: String,
    pub username: String,
    pub password: String,
    pub database: String,
    /// oxigraph data directory. `None` keeps the store in memory.
    pub path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Neo4j,
            uri: "http://localhost:7474".into(),
            username: "neo4j".into(),
            password: String::new(),
            database: "neo4j".into(),
            path: None,
            timeout_secs: 30,
        }
    }
}

/// `[oracle]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Provider selector: `gpt-35-turbo`, `gpt-4o`, `openai`, `ollama[:model]`.
    pub model_name: String,
    pub timeout_secs: u64,
    pub ollama_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model_name: "gpt-35-turbo".into(),
            timeout_secs: 120,
            ollama_url: "http://localhost:11434".into(),
            max_tokens: 4096,
            temperature: 1.0,
            top_p: 1.0,
        }
    }
}

/// `[pipeline]` section: the retry policy of one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hard ceiling on synthesis attempts per question.
    pub max_attempts: usize,
    /// Most recent failed candidates kept for feedback. `0` keeps all of them.
    pub feedback_cap: usize,
    /// Refuse candidates containing mutating clauses before they reach the store.
    pub read_only_guard: bool,
    /// Word ceiling for the composed explanation.
    pub answer_word_limit: usize,
    /// Optional description of the graph's domain, added to prompts.
    pub domain_hint: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            feedback_cap: 10,
            read_only_guard: true,
            answer_word_limit: 60,
            domain_hint: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "pipeline.max_attempts must be at least 1".into(),
            });
        }
        if self.answer_word_limit == 0 {
            return Err(ConfigError::Invalid {
                message: "pipeline.answer_word_limit must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Feedback cap as an option, `None` meaning unbounded.
    pub fn feedback_limit(&self) -> Option<usize> {
        (self.feedback_cap > 0).then_some(self.feedback_cap)
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub oracle: OracleConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Default config file location following the XDG base directory layout.
    pub fn default_path() -> ConfigResult<PathBuf> {
        let base = match std::env::var("XDG_CONFIG_HOME") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .map_err(|_| ConfigError::NoHome)?,
        };
        Ok(base.join("askgraph").join("config.toml"))
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Load from an explicit path (which must exist) or from the default
    /// location (which may be absent).
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path()?, false),
        };

        if !required && !path.is_file() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&content, &path.display().to_string())?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply environment overrides through an injected lookup.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = env("NEO4J_URI") {
            self.store.uri = uri;
        }
        if let Some(user) = env("NEO4J_USERNAME") {
            self.store.username = user;
        }
        if let Some(password) = env("NEO4J_PASSWORD") {
            self.store.password = password;
        }
        if let Some(database) = env("NEO4J_DATABASE") {
            self.store.database = database;
        }
        if let Some(model) = env("ASKGRAPH_MODEL") {
            self.oracle.model_name = model;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.pipeline.validate()?;
        if self.oracle.model_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "oracle.model_name must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Environment lookup backed by the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.store.backend, StoreBackend::Neo4j);
        assert_eq!(config.oracle.model_name, "gpt-35-turbo");
        assert_eq!(config.pipeline.max_attempts, 10);
        assert_eq!(config.pipeline.answer_word_limit, 60);
        assert!(config.pipeline.read_only_guard);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [store]
            backend = "oxigraph"

            [pipeline]
            max_attempts = 3
            domain_hint = "supply chains"
            "#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Oxigraph);
        assert_eq!(config.store.database, "neo4j");
        assert_eq!(config.pipeline.max_attempts, 3);
        assert_eq!(config.pipeline.feedback_cap, 10);
        assert_eq!(config.pipeline.domain_hint.as_deref(), Some("supply chains"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = AppConfig::from_toml("[store\nbackend=", "broken.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == "broken.toml"));
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("NEO4J_URI", "neo4j+s://abc.databases.neo4j.io"),
            ("NEO4J_PASSWORD", "secret"),
            ("ASKGRAPH_MODEL", "gpt-4o"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.store.uri, "neo4j+s://abc.databases.neo4j.io");
        assert_eq!(config.store.password, "secret");
        assert_eq!(config.store.username, "neo4j");
        assert_eq!(config.oracle.model_name, "gpt-4o");
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let mut config = AppConfig::default();
        config.pipeline.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_feedback_cap_means_unbounded() {
        let mut pipeline = PipelineConfig::default();
        assert_eq!(pipeline.feedback_limit(), Some(10));
        pipeline.feedback_cap = 0;
        assert_eq!(pipeline.feedback_limit(), None);
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[oracle]\nmodel_name = \"ollama:llama3.2\"\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.oracle.model_name, "ollama:llama3.2");
    }
}
