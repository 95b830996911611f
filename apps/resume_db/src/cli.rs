use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{apply_migrations, create_pool, migration_status, server_version, teardown};
use crate::schema::ddl::{render_create, render_teardown};
use crate::schema::introspect::{verify, PgIntrospector};
use crate::schema::validate::validate;
use crate::schema::{resume_catalog, UuidStrategy};

#[derive(Parser, Debug)]
#[command(name = "resume_db", version, about = "Schema management for the resume store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending migrations.
    Migrate,
    /// Revert every migration, dropping all resume tables and their data.
    Teardown {
        /// Confirm that all resume data may be deleted.
        #[arg(long)]
        yes: bool,
    },
    /// List embedded migrations and whether each is applied.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Print the DDL rendered from the catalog. Does not connect.
    Render(RenderArgs),
    /// Connect and print the server version.
    Check,
    /// Compare the live schema with the catalog; exits non-zero on drift.
    Verify {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// UUID generator extension: pgcrypto or uuid-ossp.
    #[arg(long, default_value_t = UuidStrategy::Pgcrypto)]
    pub uuid: UuidStrategy,

    /// Render the teardown script instead of the create script.
    #[arg(long)]
    pub teardown: bool,

    /// Write to a file instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let catalog = resume_catalog();
    validate(&catalog).context("Schema catalog failed validation")?;

    match cli.command {
        Command::Render(args) => {
            let sql = render(&args)?;
            match &args.out {
                Some(path) => {
                    write_script(path, &sql)?;
                    info!("Wrote {}", path.display());
                }
                None => print!("{sql}"),
            }
        }
        Command::Migrate => apply_migrations(&connect().await?).await?,
        Command::Teardown { yes } => {
            if !yes {
                bail!("Refusing to drop every resume table without --yes");
            }
            let pool = connect().await?;
            warn!("Dropping all resume tables");
            teardown(&pool).await?;
        }
        Command::Status { json } => {
            let status = migration_status(&connect().await?).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                for m in &status {
                    let state = match m.installed_on {
                        Some(at) => format!("applied {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                        None => "pending".to_string(),
                    };
                    println!("{:>14}  {:<24} {state}", m.version, m.description);
                }
            }
        }
        Command::Check => {
            let version = server_version(&connect().await?).await?;
            println!("Connected successfully");
            println!("PostgreSQL version: {version}");
        }
        Command::Verify { json } => {
            let introspector = PgIntrospector::new(connect().await?);
            let report = verify(&catalog, &introspector).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
            if !report.is_clean() {
                warn!("Live schema has drifted from the catalog");
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Only the database commands need configuration; `render` works offline.
async fn connect() -> Result<PgPool> {
    let config = Config::from_env()?;
    create_pool(&config).await
}

pub fn render(args: &RenderArgs) -> Result<String> {
    let catalog = resume_catalog();
    let sql = if args.teardown {
        render_teardown(&catalog)?
    } else {
        render_create(&catalog, args.uuid)?
    };
    Ok(sql)
}

fn write_script(path: &Path, sql: &str) -> Result<()> {
    std::fs::write(path, sql).with_context(|| format!("Failed to write {}", path.display()))
}
