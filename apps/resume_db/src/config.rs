use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

/// Where to connect. `DATABASE_URL` wins; otherwise the connection is
/// assembled from the individual `DB_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Url(String),
    Parts {
        host: String,
        port: u16,
        name: String,
        username: String,
        password: String,
        ssl_mode: Option<String>,
    },
}

/// Configuration loaded from environment variables (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseTarget,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database = match lookup("DATABASE_URL") {
            Some(url) => DatabaseTarget::Url(url),
            None => DatabaseTarget::Parts {
                host: lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: lookup("DB_PORT")
                    .unwrap_or_else(|| "5432".to_string())
                    .parse::<u16>()
                    .context("DB_PORT must be a valid port number")?,
                name: lookup("DB_NAME").unwrap_or_else(|| "resume_db".to_string()),
                username: require_env(&lookup, "DB_USERNAME")
                    .context("Set DATABASE_URL, or DB_USERNAME and DB_PASSWORD")?,
                password: require_env(&lookup, "DB_PASSWORD")
                    .context("Set DATABASE_URL, or DB_USERNAME and DB_PASSWORD")?,
                ssl_mode: lookup("DB_SSLMODE"),
            },
        };

        Ok(Config {
            database,
            max_connections: lookup("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "5".to_string())
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
        })
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        match &self.database {
            DatabaseTarget::Url(url) => {
                PgConnectOptions::from_str(url).context("DATABASE_URL is not a valid Postgres URL")
            }
            DatabaseTarget::Parts {
                host,
                port,
                name,
                username,
                password,
                ssl_mode,
            } => {
                let mut options = PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .database(name)
                    .username(username)
                    .password(password);
                if let Some(mode) = ssl_mode {
                    let mode = PgSslMode::from_str(mode)
                        .with_context(|| format!("DB_SSLMODE '{mode}' is not a valid SSL mode"))?;
                    options = options.ssl_mode(mode);
                }
                Ok(options)
            }
        }
    }

    /// Connection target without credentials, for logs.
    pub fn describe_target(&self) -> String {
        match &self.database {
            DatabaseTarget::Url(url) => match url.rsplit_once('@') {
                Some((_, rest)) => format!("postgres://{rest}"),
                None => url.clone(),
            },
            DatabaseTarget::Parts {
                host, port, name, ..
            } => format!("postgres://{host}:{port}/{name}"),
        }
    }
}

fn require_env(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
