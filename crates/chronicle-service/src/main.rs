//! CLI entry point for the Chronicle knowledge-graph engine.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use chronicle_core::config::EngineConfig;
use chronicle_core::types::{ConstraintType, ProposedChange, Severity};
use chronicle_graph::GraphConfig;
use chronicle_govern::ConstraintSpec;
use chronicle_query::{ImpactRequest, SearchRequest};
use chronicle_service::{
    AcquireLockRequest, ApplyConstraintRequest, ChronicleService, IngestBatchRequest,
};

#[derive(Parser)]
#[command(name = "chronicle")]
#[command(about = "Bitemporal knowledge-graph consistency engine")]
struct Cli {
    /// Config file prefix (default: chronicle).
    #[arg(short, long, default_value = "chronicle")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge a JSON batch of nodes and edges into the graph.
    Ingest {
        /// Path to a JSON file holding `{nodes, edges, provenance}`.
        file: PathBuf,
    },
    /// Hybrid search over the graph.
    Search {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Project the graph as of this RFC 3339 instant.
        #[arg(long)]
        as_of: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// Blast-radius analysis for a target node.
    Impact {
        /// Node id, or an exact name/path.
        target: String,
        #[arg(short = 'd', long)]
        max_depth: Option<usize>,
    },
    /// Acquire an exclusive lock on a node.
    Lock {
        target: String,
        #[arg(long)]
        agent_id: String,
        #[arg(long)]
        task_id: String,
    },
    /// Release every lock held by a task.
    Unlock {
        task_id: String,
    },
    /// Attach a declarative constraint to a node.
    Constrain {
        target: String,
        /// IMMUTABLE_LOGIC, VERSION_PINNING, LICENSE_RESTRICTION or
        /// ACCESS_CONTROL.
        #[arg(long = "type")]
        constraint_type: String,
        #[arg(long)]
        owner: String,
        /// info, warning or error.
        #[arg(long, default_value = "error")]
        severity: String,
        /// Constraint parameters as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Evaluate a proposed change (JSON file) against constraints.
    Check {
        file: PathBuf,
    },
    /// List nodes with no live relationships.
    Orphans {
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let graph_config = load_graph_config(&cli.config);
    let engine_config = load_engine_config(&cli.config)?;

    let client = chronicle_graph::connect_driver(&graph_config.driver, &graph_config).await?;
    tracing::info!(driver = %graph_config.driver, uri = %graph_config.uri, "Connected to graph store");

    let service = ChronicleService::new(client, engine_config);

    match cli.command {
        Command::Ingest { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let request: IngestBatchRequest = serde_json::from_str(&raw)?;
            let response = service.ingest_batch(&request).await?;
            print_json(&response)?;
        }
        Command::Search {
            query,
            top_k,
            as_of,
        } => {
            let outcome = service
                .search(&SearchRequest {
                    query_text: query,
                    top_k,
                    as_of,
                    deadline_ms: None,
                })
                .await?;
            print_json(&outcome)?;
        }
        Command::Impact { target, max_depth } => {
            let outcome = service
                .analyze_impact(&ImpactRequest {
                    target,
                    max_depth,
                    deadline_ms: None,
                })
                .await?;
            print_json(&outcome)?;
        }
        Command::Lock {
            target,
            agent_id,
            task_id,
        } => {
            let grant = service
                .acquire_lock(&AcquireLockRequest {
                    target,
                    agent_id,
                    task_id,
                })
                .await?;
            print_json(&grant)?;
        }
        Command::Unlock { task_id } => {
            let response = service.release_lock(&task_id).await?;
            print_json(&response)?;
        }
        Command::Constrain {
            target,
            constraint_type,
            owner,
            severity,
            params,
        } => {
            let spec = ConstraintSpec {
                constraint_type: parse_constraint_type(&constraint_type)?,
                params: serde_json::from_str(&params)?,
                severity: parse_severity(&severity)?,
                owner,
            };
            let response = service
                .apply_constraint(&ApplyConstraintRequest { target, spec })
                .await?;
            print_json(&response)?;
        }
        Command::Check { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let change: ProposedChange = serde_json::from_str(&raw)?;
            let response = service.evaluate_constraints(&change).await?;
            print_json(&response)?;
        }
        Command::Orphans { limit } => {
            let rows = service.orphans(limit).await?;
            print_json(&rows)?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_constraint_type(raw: &str) -> anyhow::Result<ConstraintType> {
    ConstraintType::parse(&raw.to_uppercase()).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid constraint type: {raw}. Choose: IMMUTABLE_LOGIC, VERSION_PINNING, \
             LICENSE_RESTRICTION, ACCESS_CONTROL"
        )
    })
}

fn parse_severity(raw: &str) -> anyhow::Result<Severity> {
    match raw.to_lowercase().as_str() {
        "info" => Ok(Severity::Info),
        "warning" => Ok(Severity::Warning),
        "error" => Ok(Severity::Error),
        _ => anyhow::bail!("Invalid severity: {raw}. Choose: info, warning, error"),
    }
}

fn load_graph_config(file_prefix: &str) -> GraphConfig {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("CHRONICLE")
                .separator("__")
                .try_parsing(true),
        )
        .build();

    match cfg {
        Ok(c) => GraphConfig {
            driver: c
                .get_string("store.driver")
                .unwrap_or_else(|_| "neo4j".to_string()),
            uri: c
                .get_string("store.uri")
                .unwrap_or_else(|_| "bolt://localhost:7687".to_string()),
            user: c
                .get_string("store.user")
                .unwrap_or_else(|_| "neo4j".to_string()),
            password: c
                .get_string("store.password")
                .unwrap_or_else(|_| "chronicle-dev".to_string()),
            ..Default::default()
        },
        Err(_) => GraphConfig::default(),
    }
}

/// Load the `engine` config section. A missing section falls back to the
/// defaults; a present-but-malformed one is a startup error, as is any
/// section that fails [`EngineConfig::validate`].
fn load_engine_config(file_prefix: &str) -> anyhow::Result<EngineConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("CHRONICLE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let engine = match cfg.get::<EngineConfig>("engine") {
        Ok(c) => c,
        Err(config::ConfigError::NotFound(_)) => EngineConfig::default(),
        Err(e) => return Err(e.into()),
    };
    engine.validate()?;
    Ok(engine)
}
