//! Live schema verification.
//!
//! A [`SchemaSource`] reads what the database actually has; [`diff`] compares
//! that against the catalog. Only the catalog's own tables are inspected, so
//! unrelated tables in the same schema (including `_sqlx_migrations`) are
//! ignored. Named objects are compared by definition as well as by name: a
//! constraint that kept its name but lost its `ON DELETE CASCADE` is drift.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

use super::{Catalog, Check, CheckRule, ForeignKey, Table};
use crate::errors::SchemaError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LiveColumn {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
}

impl LiveColumn {
    /// `data_type` with its length or precision, in the same form as
    /// [`ColumnType::information_schema_signature`](super::ColumnType::information_schema_signature).
    pub fn signature(&self) -> String {
        match (
            self.data_type.as_str(),
            self.character_maximum_length,
            self.numeric_precision,
            self.numeric_scale,
        ) {
            ("character varying", Some(len), _, _) => format!("character varying({len})"),
            ("numeric", _, Some(precision), Some(scale)) => format!("numeric({precision},{scale})"),
            (other, ..) => other.to_string(),
        }
    }
}

/// One row of `pg_constraint`. `kind` is `contype` (`p`, `f`, `u`, `c`) and
/// `on_delete` is `confdeltype`, set for foreign keys only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LiveConstraint {
    pub table_name: String,
    pub name: String,
    pub kind: String,
    pub columns: Vec<String>,
    pub referenced_table: Option<String>,
    pub referenced_columns: Vec<String>,
    pub on_delete: Option<String>,
    /// As printed by `pg_get_constraintdef`.
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LiveIndex {
    pub table_name: String,
    pub name: String,
    pub columns: Vec<String>,
}

/// Snapshot of the objects in the current schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSchema {
    pub columns: Vec<LiveColumn>,
    pub constraints: Vec<LiveConstraint>,
    pub indexes: Vec<LiveIndex>,
}

impl LiveSchema {
    fn column(&self, table: &str, column: &str) -> Option<&LiveColumn> {
        self.columns
            .iter()
            .find(|c| c.table_name == table && c.column_name == column)
    }

    fn constraint(&self, table: &str, name: &str) -> Option<&LiveConstraint> {
        self.constraints
            .iter()
            .find(|c| c.table_name == table && c.name == name)
    }

    fn index(&self, table: &str, name: &str) -> Option<&LiveIndex> {
        self.indexes
            .iter()
            .find(|i| i.table_name == table && i.name == name)
    }

    fn has_table(&self, table: &str) -> bool {
        self.columns.iter().any(|c| c.table_name == table)
    }
}

#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn load(&self) -> Result<LiveSchema, SchemaError>;
}

/// Reads the live schema from the Postgres system catalogs.
pub struct PgIntrospector {
    pool: PgPool,
}

impl PgIntrospector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchemaSource for PgIntrospector {
    async fn load(&self) -> Result<LiveSchema, SchemaError> {
        let columns = sqlx::query_as::<_, LiveColumn>(
            r#"
            SELECT table_name::text AS table_name,
                   column_name::text AS column_name,
                   data_type::text AS data_type,
                   (is_nullable = 'YES') AS is_nullable,
                   character_maximum_length::int4 AS character_maximum_length,
                   numeric_precision::int4 AS numeric_precision,
                   numeric_scale::int4 AS numeric_scale
            FROM information_schema.columns
            WHERE table_schema = current_schema()
            ORDER BY table_name, ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let constraints = sqlx::query_as::<_, LiveConstraint>(
            r#"
            SELECT rel.relname::text AS table_name,
                   con.conname::text AS name,
                   con.contype::text AS kind,
                   ARRAY(
                       SELECT att.attname::text
                       FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                       JOIN pg_attribute att
                         ON att.attrelid = con.conrelid AND att.attnum = k.attnum
                       ORDER BY k.ord
                   ) AS columns,
                   ref.relname::text AS referenced_table,
                   ARRAY(
                       SELECT att.attname::text
                       FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                       JOIN pg_attribute att
                         ON att.attrelid = con.confrelid AND att.attnum = k.attnum
                       ORDER BY k.ord
                   ) AS referenced_columns,
                   CASE WHEN con.contype = 'f' THEN con.confdeltype::text END AS on_delete,
                   pg_get_constraintdef(con.oid) AS definition
            FROM pg_constraint con
            JOIN pg_namespace ns ON ns.oid = con.connamespace
            JOIN pg_class rel ON rel.oid = con.conrelid
            LEFT JOIN pg_class ref ON ref.oid = con.confrelid
            WHERE ns.nspname = current_schema()
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let indexes = sqlx::query_as::<_, LiveIndex>(
            r#"
            SELECT tbl.relname::text AS table_name,
                   idx.relname::text AS name,
                   ARRAY(
                       SELECT att.attname::text
                       FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                       JOIN pg_attribute att
                         ON att.attrelid = ix.indrelid AND att.attnum = k.attnum
                       ORDER BY k.ord
                   ) AS columns
            FROM pg_index ix
            JOIN pg_class idx ON idx.oid = ix.indexrelid
            JOIN pg_class tbl ON tbl.oid = ix.indrelid
            JOIN pg_namespace ns ON ns.oid = tbl.relnamespace
            WHERE ns.nspname = current_schema()
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        info!(
            "Introspected {} columns, {} constraints, {} indexes",
            columns.len(),
            constraints.len(),
            indexes.len()
        );

        Ok(LiveSchema {
            columns,
            constraints,
            indexes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeMismatch {
    pub column: String,
    pub expected: String,
    pub actual: String,
}

/// A constraint or index present under its catalog name but defined
/// differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefinitionMismatch {
    pub object: String,
    pub expected: String,
    pub actual: String,
}

/// Differences between the catalog and a live schema. Columns are reported
/// as `table.column`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub missing_tables: Vec<String>,
    pub missing_columns: Vec<String>,
    pub unexpected_columns: Vec<String>,
    pub type_mismatches: Vec<TypeMismatch>,
    pub nullability_mismatches: Vec<String>,
    pub missing_constraints: Vec<String>,
    pub missing_indexes: Vec<String>,
    pub definition_mismatches: Vec<DefinitionMismatch>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing_tables.is_empty()
            && self.missing_columns.is_empty()
            && self.unexpected_columns.is_empty()
            && self.type_mismatches.is_empty()
            && self.nullability_mismatches.is_empty()
            && self.missing_constraints.is_empty()
            && self.missing_indexes.is_empty()
            && self.definition_mismatches.is_empty()
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return writeln!(f, "schema matches catalog");
        }
        let sections: [(&str, &[String]); 6] = [
            ("missing table", self.missing_tables.as_slice()),
            ("missing column", self.missing_columns.as_slice()),
            ("unexpected column", self.unexpected_columns.as_slice()),
            ("nullability differs", self.nullability_mismatches.as_slice()),
            ("missing constraint", self.missing_constraints.as_slice()),
            ("missing index", self.missing_indexes.as_slice()),
        ];
        for (label, items) in sections {
            for item in items {
                writeln!(f, "{label}: {item}")?;
            }
        }
        for m in &self.type_mismatches {
            writeln!(
                f,
                "type differs: {} (expected {}, found {})",
                m.column, m.expected, m.actual
            )?;
        }
        for m in &self.definition_mismatches {
            writeln!(
                f,
                "definition differs: {} (expected {}, found {})",
                m.object, m.expected, m.actual
            )?;
        }
        Ok(())
    }
}

/// What the catalog declares behind one constraint name.
enum Declared<'a> {
    PrimaryKey(&'a [&'static str]),
    ForeignKey(&'a ForeignKey),
    Unique(&'a [&'static str]),
    Check(&'a Check),
}

impl Declared<'_> {
    /// Every named constraint of `table`, in the order of
    /// [`Table::constraint_names`].
    fn all(table: &Table) -> Vec<(String, Declared<'_>)> {
        let mut declared = vec![(
            table.primary_key_name(),
            Declared::PrimaryKey(table.primary_key()),
        )];
        declared.extend(
            table
                .foreign_keys()
                .iter()
                .map(|fk| (table.foreign_key_name(fk), Declared::ForeignKey(fk))),
        );
        declared.extend(
            table
                .uniques()
                .iter()
                .map(|u| (table.unique_name(u), Declared::Unique(u.as_slice()))),
        );
        declared.extend(
            table
                .checks()
                .iter()
                .map(|c| (table.check_name(c), Declared::Check(c))),
        );
        declared
    }

    fn clause(&self) -> String {
        match self {
            Declared::PrimaryKey(columns) => format!("PRIMARY KEY ({})", columns.join(", ")),
            Declared::ForeignKey(fk) => format!(
                "FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
                fk.column,
                fk.references,
                fk.referenced_column,
                fk.on_delete.sql()
            ),
            Declared::Unique(columns) => format!("UNIQUE ({})", columns.join(", ")),
            Declared::Check(check) => format!("CHECK ({})", check.expression()),
        }
    }

    fn matches(&self, live: &LiveConstraint) -> bool {
        match self {
            Declared::PrimaryKey(columns) => live.kind == "p" && same_columns(&live.columns, columns),
            Declared::ForeignKey(fk) => {
                live.kind == "f"
                    && same_columns(&live.columns, &[fk.column])
                    && live.referenced_table.as_deref() == Some(fk.references)
                    && same_columns(&live.referenced_columns, &[fk.referenced_column])
                    && live.on_delete.as_deref() == Some(fk.on_delete.action_code())
            }
            Declared::Unique(columns) => live.kind == "u" && same_columns(&live.columns, columns),
            Declared::Check(check) => {
                live.kind == "c"
                    && same_columns(&live.columns, &[check.column])
                    && check_matches(check, &live.definition)
            }
        }
    }
}

fn same_columns(live: &[String], expected: &[&str]) -> bool {
    live.len() == expected.len() && live.iter().zip(expected).all(|(a, b)| a.as_str() == *b)
}

/// Compares a check rule against `pg_get_constraintdef` output. Postgres
/// rewrites `IN (...)` as `= ANY (ARRAY[...])` with casts, so value sets are
/// compared by their quoted literals.
fn check_matches(check: &Check, definition: &str) -> bool {
    match check.rule {
        CheckRule::OneOf(values) => {
            if definition.contains("<>") || definition.contains("NOT ") {
                return false;
            }
            let mut live = quoted_literals(definition);
            live.sort();
            live.dedup();
            let mut expected: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            expected.sort();
            expected.dedup();
            live == expected
        }
        CheckRule::NonNegative => {
            let compact: String = definition
                .chars()
                .filter(|c| !c.is_whitespace() && !matches!(c, '(' | ')'))
                .collect();
            compact == format!("CHECK{}>=0", check.column)
        }
    }
}

/// Single-quoted SQL literals in `sql`, with `''` unescaped.
fn quoted_literals(sql: &str) -> Vec<String> {
    let mut literals = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\'' {
            continue;
        }
        let mut literal = String::new();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    literal.push('\'');
                } else {
                    break;
                }
            } else {
                literal.push(c);
            }
        }
        literals.push(literal);
    }
    literals
}

pub fn diff(catalog: &Catalog, live: &LiveSchema) -> DriftReport {
    let mut report = DriftReport::default();

    for table in catalog.tables() {
        let name = table.name();
        if !live.has_table(name) {
            report.missing_tables.push(name.to_string());
            continue;
        }

        for column in table.columns() {
            let qualified = format!("{name}.{}", column.name);
            let Some(actual) = live.column(name, column.name) else {
                report.missing_columns.push(qualified);
                continue;
            };
            let expected = column.ty.information_schema_signature();
            let found = actual.signature();
            if found != expected {
                report.type_mismatches.push(TypeMismatch {
                    column: qualified.clone(),
                    expected,
                    actual: found,
                });
            }
            if actual.is_nullable != column.nullable {
                report.nullability_mismatches.push(qualified);
            }
        }

        for actual in live.columns.iter().filter(|c| c.table_name == name) {
            if table.column(&actual.column_name).is_none() {
                report
                    .unexpected_columns
                    .push(format!("{name}.{}", actual.column_name));
            }
        }

        for (constraint, declared) in Declared::all(table) {
            match live.constraint(name, &constraint) {
                None => report.missing_constraints.push(constraint),
                Some(actual) if !declared.matches(actual) => {
                    report.definition_mismatches.push(DefinitionMismatch {
                        object: constraint,
                        expected: declared.clause(),
                        actual: actual.definition.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        for columns in table.indexes() {
            let index = table.index_name(columns);
            match live.index(name, &index) {
                None => report.missing_indexes.push(index),
                Some(actual) if !same_columns(&actual.columns, columns) => {
                    report.definition_mismatches.push(DefinitionMismatch {
                        object: index,
                        expected: format!("INDEX ({})", columns.join(", ")),
                        actual: format!("INDEX ({})", actual.columns.join(", ")),
                    });
                }
                Some(_) => {}
            }
        }
    }

    report
}

/// Loads the live schema from `source` and diffs it against `catalog`.
pub async fn verify(
    catalog: &Catalog,
    source: &dyn SchemaSource,
) -> Result<DriftReport, SchemaError> {
    let live = source.load().await?;
    Ok(diff(catalog, &live))
}
