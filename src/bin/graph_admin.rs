//! Area graph admin CLI.
//!
//! Operates on the PostgreSQL store: schema bootstrap, health checks, version
//! management and history queries. Results are printed to stdout as JSON; logs go to stderr.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` and the `DB_*` pool settings (see `PostgresConfig`)
//! - `GRAPH_ADMIN_USER`: acting user id for snapshot and restore
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: pretty)
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... cargo run --bin graph_admin --features cli -- versions --area <uuid>
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use area_graph_kernel::{
    ActionType, AreaId, AuditQuery, EntityType, HistoryFilter, Kernel, KernelConfig, NodeId,
    PoolStats, PostgresConfig, PostgresGraphStore, UserId, VersionId,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Area graph versions and history", long_about = None)]
struct Cli {
    /// PostgreSQL connection string (overrides DATABASE_URL).
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create tables and indexes.
    Migrate,

    /// Check database connectivity and report pool usage.
    Health,

    /// Capture an area as a new version.
    Snapshot {
        /// Area id.
        #[arg(long)]
        area: Uuid,
        /// Version name.
        #[arg(long)]
        name: String,
        /// Optional description.
        #[arg(long)]
        description: Option<String>,
        /// Acting user.
        #[arg(long, env = "GRAPH_ADMIN_USER")]
        user: Uuid,
    },

    /// List an area's versions, newest first.
    Versions {
        /// Area id.
        #[arg(long)]
        area: Uuid,
    },

    /// Show one version with its payload.
    ShowVersion {
        /// Version id.
        id: Uuid,
    },

    /// Replace an area's graph with a version.
    Restore {
        /// Version id.
        id: Uuid,
        /// Acting user.
        #[arg(long, env = "GRAPH_ADMIN_USER")]
        user: Uuid,
    },

    /// Delete a version.
    DeleteVersion {
        /// Version id.
        id: Uuid,
    },

    /// Query the audit trail.
    History {
        #[command(subcommand)]
        query: HistoryCommand,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// Composite history of a node (its edges and table rows included).
    Node {
        /// Node id.
        id: Uuid,
    },
    /// History of one entity.
    Entity {
        /// NODE, EDGE or TABLE_ROW.
        #[arg(long = "type", value_parser = parse_entity_type)]
        entity_type: EntityType,
        /// Entity id.
        id: Uuid,
    },
    /// Entries written by a user.
    User {
        /// User id.
        id: Uuid,
        /// Maximum number of entries.
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Filtered, paginated search.
    Search {
        #[arg(long, value_parser = parse_entity_type)]
        entity_type: Option<EntityType>,
        #[arg(long, value_parser = parse_action_type)]
        action: Option<ActionType>,
        #[arg(long)]
        user: Option<Uuid>,
        /// Inclusive lower bound (RFC 3339).
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Inclusive upper bound (RFC 3339).
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// Restrict to a node's composite history.
        #[arg(long)]
        node: Option<Uuid>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
}

fn parse_entity_type(s: &str) -> Result<EntityType, String> {
    EntityType::from_str(s).ok_or_else(|| format!("unknown entity type: {s}"))
}

fn parse_action_type(s: &str) -> Result<ActionType, String> {
    ActionType::from_str(s).ok_or_else(|| format!("unknown action type: {s}"))
}

/// Initialize the tracing subscriber with JSON or pretty format.
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "graph_admin=info,area_graph_kernel=info,sqlx=warn".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[derive(Debug, Serialize)]
struct HealthReport {
    healthy: bool,
    pool: PoolStats,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let mut pg_config = PostgresConfig::from_env();
    if let Some(url) = cli.database_url {
        pg_config = pg_config.with_url(url);
    }

    let connect_start = Instant::now();
    let store = match tokio::time::timeout(Duration::from_secs(30), PostgresGraphStore::new(pg_config)).await {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            tracing::error!("PostgreSQL connection timeout after 30s");
            return Err("Database connection timeout".into());
        }
    };
    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "PostgreSQL connection established"
    );

    match cli.command {
        Commands::Migrate => {
            store.ensure_schema().await?;
            return print_json(&serde_json::json!({ "migrated": true }));
        }
        Commands::Health => {
            let report = HealthReport {
                healthy: store.is_healthy().await,
                pool: store.pool_stats(),
            };
            print_json(&report)?;
            if !report.healthy {
                return Err("database health check failed".into());
            }
            return Ok(());
        }
        _ => {}
    }

    let audit = store.audit_store();
    let kernel = Kernel::new(Arc::new(store), Arc::new(audit), &KernelConfig::from_env());

    match cli.command {
        Commands::Migrate | Commands::Health => Ok(()),
        Commands::Snapshot { area, name, description, user } => {
            let summary = kernel
                .versions
                .create_snapshot(AreaId::new(area), &name, description, UserId::new(user))
                .await?;
            print_json(&summary)
        }
        Commands::Versions { area } => print_json(&kernel.versions.list_versions(AreaId::new(area)).await?),
        Commands::ShowVersion { id } => print_json(&kernel.versions.get_version(VersionId::new(id)).await?),
        Commands::Restore { id, user } => {
            let report = kernel.versions.restore(VersionId::new(id), UserId::new(user)).await?;
            print_json(&report)
        }
        Commands::DeleteVersion { id } => {
            kernel.versions.delete_version(VersionId::new(id)).await?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        Commands::History { query } => match query {
            HistoryCommand::Node { id } => print_json(&kernel.history.by_node(NodeId::new(id)).await?),
            HistoryCommand::Entity { entity_type, id } => {
                print_json(&kernel.history.by_entity(entity_type, id).await?)
            }
            HistoryCommand::User { id, limit } => {
                print_json(&kernel.history.by_user(UserId::new(id), limit).await?)
            }
            HistoryCommand::Search { entity_type, action, user, from, to, node, page, limit } => {
                let filter = HistoryFilter {
                    query: AuditQuery {
                        entity_type,
                        action_type: action,
                        user_id: user.map(UserId::new),
                        date_from: from,
                        date_to: to,
                    },
                    node_id: node.map(NodeId::new),
                    page,
                    limit,
                };
                print_json(&kernel.history.find_all(&filter).await?)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_needs_no_arguments() {
        let cli = Cli::try_parse_from(["graph_admin", "health"]).unwrap();
        assert!(matches!(cli.command, Commands::Health));
        assert!(Cli::try_parse_from(["graph_admin", "health", "--area", "x"]).is_err());
    }

    #[test]
    fn test_health_report_layout() {
        let report = HealthReport {
            healthy: false,
            pool: PoolStats { size: 3, idle: 2, max: 10 },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["healthy"], false);
        assert_eq!(json["pool"]["size"], 3);
        assert_eq!(json["pool"]["idle"], 2);
        assert_eq!(json["pool"]["max"], 10);
    }

    #[test]
    fn test_history_search_parses_filters() {
        let cli = Cli::try_parse_from([
            "graph_admin",
            "history",
            "search",
            "--entity-type",
            "EDGE",
            "--action",
            "MOVE",
            "--limit",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::History { query: HistoryCommand::Search { entity_type, action, limit, .. } } => {
                assert_eq!(entity_type, Some(EntityType::Edge));
                assert_eq!(action, Some(ActionType::Move));
                assert_eq!(limit, Some(5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
