//! askgraph CLI: ask a property graph questions in natural language.

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use askgraph::config::{AppConfig, StoreBackend, process_env};
use askgraph::graph::{Backend, GraphLoader, GraphStore};
use askgraph::oracle;
use askgraph::pipeline::{Outcome, Pipeline, QuestionReport};
use askgraph::seeds::{DEFAULT_PACK, SeedPack};

#[derive(Parser)]
#[command(name = "askgraph", version, about = "Ask a property graph questions in natural language")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/askgraph/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Graph store backend.
    #[arg(long, global = true, value_enum)]
    backend: Option<StoreBackend>,

    /// Data directory for the embedded oxigraph store.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question. Reads it from stdin when omitted.
    Ask {
        question: Option<String>,

        /// Maximum number of synthesis attempts.
        #[arg(long)]
        max_attempts: Option<usize>,

        /// Oracle model name (gpt-35-turbo, gpt-4o, openai, ollama[:model]).
        #[arg(long)]
        model: Option<String>,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the schema discovered from the store.
    Schema {
        #[arg(long)]
        json: bool,
    },

    /// Load a seed pack into the store.
    Seed {
        /// Seed pack TOML file (default: the bundled supply-chain pack).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Keep existing data instead of clearing the store first.
        #[arg(long)]
        keep: bool,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_env(process_env);
    if let Some(backend) = cli.backend {
        config.store.backend = backend;
    }
    if let Some(dir) = cli.data_dir {
        config.store.path = Some(dir);
    }

    match cli.command {
        Commands::Ask {
            question,
            max_attempts,
            model,
            json,
        } => {
            if let Some(n) = max_attempts {
                config.pipeline.max_attempts = n;
            }
            if let Some(model) = model {
                config.oracle.model_name = model;
            }
            config.validate()?;

            let question = match question {
                Some(q) => q,
                None => read_question()?,
            };

            let oracle = oracle::from_config(&config.oracle, process_env)?;
            let store = open_store(&config)?;
            let pipeline = Pipeline::new(&store, oracle.as_ref(), config.pipeline.clone())?;
            let report = pipeline.ask(&question)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
            } else {
                print_report(&report);
            }
        }

        Commands::Schema { json } => {
            let store = open_store(&config)?;
            let schema = store.discover_schema()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&schema).into_diagnostic()?);
            } else {
                println!("{} schema fact(s) in {}:", schema.len(), store.location());
                println!("{}", schema.render());
            }
        }

        Commands::Seed { file, keep } => {
            let pack = match &file {
                Some(path) => SeedPack::from_file(path)?,
                None => SeedPack::bundled(DEFAULT_PACK)?,
            };
            let store = Backend::open(&config.store)?;
            if !keep {
                store.clear()?;
            }
            let report = store.load(&pack)?;
            println!(
                "Loaded seed pack \"{}\" v{}: {} nodes, {} relationships into {}",
                pack.id,
                pack.version,
                report.nodes,
                report.relationships,
                store.location()
            );
        }
    }

    Ok(())
}

/// Open the configured store. An in-memory oxigraph store starts empty, so
/// it is given the bundled seed pack.
fn open_store(config: &AppConfig) -> Result<Backend> {
    let store = Backend::open(&config.store)?;
    if config.store.backend == StoreBackend::Oxigraph && config.store.path.is_none() {
        let report = store.load(&SeedPack::bundled(DEFAULT_PACK)?)?;
        tracing::info!(
            pack = DEFAULT_PACK,
            nodes = report.nodes,
            relationships = report.relationships,
            "seeded in-memory store"
        );
    }
    Ok(store)
}

fn read_question() -> Result<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("Question: ");
        std::io::stderr().flush().into_diagnostic()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line).into_diagnostic()?;
    Ok(line.trim().to_string())
}

fn print_report(report: &QuestionReport) {
    let outcome = &report.outcome;
    let attempts = report.attempts.len();
    match outcome {
        Outcome::Rejected => {
            println!("The question does not look answerable from this graph's schema.");
            return;
        }
        Outcome::Answered { rows, .. } => {
            println!("Query ({}, attempt {attempts}):", report.dialect);
            if let Some(query) = outcome.query() {
                println!("{query}");
            }
            println!("\n{} row(s)", rows.len());
        }
        Outcome::Exhausted { .. } => {
            println!("No query returned results after {attempts} attempt(s).");
            if let Some(query) = outcome.query() {
                println!("Last query tried:\n{query}");
            }
        }
    }
    if let Some(explanation) = outcome.explanation() {
        println!("\n{explanation}");
    }
}
