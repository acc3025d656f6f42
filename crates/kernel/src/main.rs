//! Talentdesk Kernel
//!
//! HTTP server for role-scoped list queries, plus a helper to mint
//! development tokens.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use clap::{Parser, Subcommand};
use serde_json::Value;
use talentdesk_kernel::config::Config;
use talentdesk_kernel::models::{Caller, Role};
use talentdesk_kernel::routes;
use talentdesk_kernel::schema::SchemaRegistry;
use talentdesk_kernel::services::TokenService;
use talentdesk_kernel::state::AppState;
use talentdesk_kernel::storage::MemoryStorage;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Serve from process memory instead of PostgreSQL.
        #[arg(long)]
        memory: bool,

        /// JSON file of `{"entity": [rows]}` loaded into memory storage.
        #[arg(long, requires = "memory")]
        seed: Option<PathBuf>,
    },

    /// Print a signed bearer token.
    Token {
        /// Caller id.
        #[arg(long)]
        sub: Uuid,

        /// One of admin, recruiter, candidate.
        #[arg(long)]
        role: Role,

        /// Lifetime in seconds.
        #[arg(long, default_value = "3600")]
        ttl: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve {
        memory: false,
        seed: None,
    }) {
        Command::Serve { memory, seed } => serve(config, memory, seed.as_deref()).await,
        Command::Token { sub, role, ttl } => {
            let token = TokenService::new(config.jwt_secret.as_bytes())
                .issue(Caller::new(sub, role), ttl)
                .context("failed to sign token")?;
            println!("{token}");
            Ok(())
        }
    }
}

async fn serve(config: Config, memory: bool, seed: Option<&Path>) -> Result<()> {
    init_tracing();

    info!("Starting Talentdesk kernel");
    info!(port = config.port, memory, "Configuration loaded");

    let state = if memory {
        let registry = Arc::new(SchemaRegistry::ats_default());
        let tables = match seed {
            Some(path) => load_seed(path)?,
            None => HashMap::new(),
        };
        let storage = Arc::new(MemoryStorage::with_tables(registry.clone(), tables));
        AppState::with_storage(&config, registry, storage)
    } else {
        AppState::new(&config)
            .await
            .context("failed to initialize application state")?
    };

    let cors = build_cors_layer(&config);

    // TraceLayer → CORS → metrics → bearer auth → routes
    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, "Server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn load_seed(path: &Path) -> Result<HashMap<String, Vec<Value>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    let tables: HashMap<String, Vec<Value>> =
        serde_json::from_str(&text).context("seed file must map entity names to row arrays")?;

    for (entity, rows) in &tables {
        info!(entity = %entity, rows = rows.len(), "Seeded memory storage");
    }
    Ok(tables)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if config.cors_allowed_origins.len() == 1 && config.cors_allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
            .allow_credentials(true)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
