//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL. Only optional for in-memory mode.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,

    /// HS256 secret used to verify bearer tokens.
    pub jwt_secret: String,

    /// Largest `take` a list request may ask for (default: 100).
    pub query_max_take: u64,

    /// `take` used when a list request omits it (default: 20).
    pub query_default_take: u64,

    /// Deepest include nesting kept before collapsing (default: 1).
    pub query_max_include_depth: usize,

    /// Per-transaction statement timeout for list queries (default: 10).
    pub statement_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url = env::var("DATABASE_URL").ok();

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        let jwt_secret =
            env::var("JWT_SECRET").context("JWT_SECRET environment variable is required")?;

        let query_max_take = env::var("QUERY_MAX_TAKE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .context("QUERY_MAX_TAKE must be a valid u64")?;

        let query_default_take = env::var("QUERY_DEFAULT_TAKE")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .context("QUERY_DEFAULT_TAKE must be a valid u64")?;

        let query_max_include_depth = env::var("QUERY_MAX_INCLUDE_DEPTH")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .context("QUERY_MAX_INCLUDE_DEPTH must be a valid usize")?;

        let statement_timeout_secs = env::var("QUERY_STATEMENT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("QUERY_STATEMENT_TIMEOUT_SECS must be a valid u64")?;

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            cors_allowed_origins,
            jwt_secret,
            query_max_take,
            query_default_take,
            query_max_include_depth,
            statement_timeout_secs,
        })
    }

    /// Configuration with defaults and no database, for tests and
    /// in-memory mode.
    pub fn for_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            port: 3000,
            database_url: None,
            database_max_connections: 10,
            cors_allowed_origins: vec!["*".to_string()],
            jwt_secret: jwt_secret.into(),
            query_max_take: 100,
            query_default_take: 20,
            query_max_include_depth: 1,
            statement_timeout_secs: 10,
        }
    }
}
