//! SQL rendering for a catalog.
//!
//! `render_create` produces the body of the `up` migration and
//! `render_teardown` the body of the `down` migration. Neither emits
//! `BEGIN`/`COMMIT`: the migrator wraps each migration in a transaction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::graph::creation_order;
use super::{Catalog, Column, ColumnDefault, Table};
use crate::errors::SchemaError;

/// Which extension supplies the server-side UUID generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UuidStrategy {
    /// `pgcrypto` / `gen_random_uuid()`.
    #[default]
    Pgcrypto,
    /// `uuid-ossp` / `uuid_generate_v4()`.
    UuidOssp,
}

impl UuidStrategy {
    pub fn extension(&self) -> &'static str {
        match self {
            UuidStrategy::Pgcrypto => "pgcrypto",
            UuidStrategy::UuidOssp => "uuid-ossp",
        }
    }

    pub fn generator(&self) -> &'static str {
        match self {
            UuidStrategy::Pgcrypto => "gen_random_uuid()",
            UuidStrategy::UuidOssp => "uuid_generate_v4()",
        }
    }
}

impl FromStr for UuidStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pgcrypto" => Ok(UuidStrategy::Pgcrypto),
            "uuid-ossp" => Ok(UuidStrategy::UuidOssp),
            other => Err(format!(
                "unknown UUID strategy '{other}' (expected 'pgcrypto' or 'uuid-ossp')"
            )),
        }
    }
}

impl fmt::Display for UuidStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Full create script: extension, then each table with its indexes.
pub fn render_create(catalog: &Catalog, strategy: UuidStrategy) -> Result<String, SchemaError> {
    let mut sql = format!(
        "CREATE EXTENSION IF NOT EXISTS \"{}\";\n",
        strategy.extension()
    );
    for table in creation_order(catalog)? {
        sql.push('\n');
        sql.push_str(&render_table(table, strategy));
        sql.push('\n');
        for statement in render_indexes(table) {
            sql.push_str(&statement);
            sql.push('\n');
        }
    }
    Ok(sql)
}

/// Drops every table, children first. The UUID extension stays installed
/// since other schemas in the database may use it.
pub fn render_teardown(catalog: &Catalog) -> Result<String, SchemaError> {
    let sql: String = creation_order(catalog)?
        .iter()
        .rev()
        .map(|t| format!("DROP TABLE IF EXISTS {};\n", t.name()))
        .collect();
    Ok(sql)
}

pub fn render_table(table: &Table, strategy: UuidStrategy) -> String {
    let mut lines: Vec<String> = table
        .columns()
        .iter()
        .map(|c| render_column(c, strategy))
        .collect();

    lines.push(format!(
        "CONSTRAINT {} PRIMARY KEY ({})",
        table.primary_key_name(),
        table.primary_key().join(", ")
    ));
    for fk in table.foreign_keys() {
        lines.push(format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
            table.foreign_key_name(fk),
            fk.column,
            fk.references,
            fk.referenced_column,
            fk.on_delete.sql()
        ));
    }
    for columns in table.uniques() {
        lines.push(format!(
            "CONSTRAINT {} UNIQUE ({})",
            table.unique_name(columns),
            columns.join(", ")
        ));
    }
    for check in table.checks() {
        lines.push(format!(
            "CONSTRAINT {} CHECK ({})",
            table.check_name(check),
            check.expression()
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        table.name(),
        lines.join(",\n    ")
    )
}

pub fn render_indexes(table: &Table) -> Vec<String> {
    table
        .indexes()
        .iter()
        .map(|columns| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
                table.index_name(columns),
                table.name(),
                columns.join(", ")
            )
        })
        .collect()
}

fn render_column(column: &Column, strategy: UuidStrategy) -> String {
    let mut sql = format!("{} {}", column.name, column.ty.sql());
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(match default {
            ColumnDefault::GeneratedUuid => strategy.generator(),
            ColumnDefault::Now => "now()",
            ColumnDefault::Bool(true) => "TRUE",
            ColumnDefault::Bool(false) => "FALSE",
        });
    }
    sql
}

/// Collapses whitespace and drops `--` comment lines so two scripts can be
/// compared by their statements alone.
pub fn normalize_sql(sql: &str) -> String {
    sql.lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
