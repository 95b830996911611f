use std::fmt;

use serde::Serialize;
use sqlx::postgres::PgDatabaseError;
use thiserror::Error;

/// Library-level error type.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Invalid catalog: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Foreign-key cycle between tables: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchemaError {
    /// The constraint the database rejected, if this wraps a constraint violation.
    pub fn violation(&self) -> Option<ConstraintViolation> {
        match self {
            SchemaError::Database(e) => ConstraintViolation::from_sqlx(e),
            _ => None,
        }
    }
}

/// Integrity-constraint classes (SQLSTATE class 23) the schema relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Unique,
    Check,
    ForeignKey,
    NotNull,
}

impl ConstraintKind {
    pub fn from_sqlstate(code: &str) -> Option<Self> {
        match code {
            "23505" => Some(ConstraintKind::Unique),
            "23514" => Some(ConstraintKind::Check),
            "23503" => Some(ConstraintKind::ForeignKey),
            "23502" => Some(ConstraintKind::NotNull),
            _ => None,
        }
    }

    pub fn sqlstate(&self) -> &'static str {
        match self {
            ConstraintKind::Unique => "23505",
            ConstraintKind::Check => "23514",
            ConstraintKind::ForeignKey => "23503",
            ConstraintKind::NotNull => "23502",
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConstraintKind::Unique => "uniqueness",
            ConstraintKind::Check => "check",
            ConstraintKind::ForeignKey => "foreign-key",
            ConstraintKind::NotNull => "not-null",
        })
    }
}

/// A write rejected by one of the schema's constraints.
///
/// NOT NULL violations carry no constraint name; Postgres reports the
/// offending column instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintViolation {
    pub kind: ConstraintKind,
    pub constraint: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
}

impl ConstraintViolation {
    pub fn from_sqlx(err: &sqlx::Error) -> Option<Self> {
        let sqlx::Error::Database(db_err) = err else {
            return None;
        };
        let kind = ConstraintKind::from_sqlstate(db_err.code()?.as_ref())?;
        let pg = db_err.try_downcast_ref::<PgDatabaseError>();
        Some(ConstraintViolation {
            kind,
            constraint: db_err.constraint().map(str::to_string),
            table: pg.and_then(|e| e.table()).map(str::to_string),
            column: pg.and_then(|e| e.column()).map(str::to_string),
        })
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation", self.kind)?;
        if let Some(name) = &self.constraint {
            write!(f, " on constraint '{name}'")?;
        }
        match (&self.table, &self.column) {
            (Some(table), Some(column)) => write!(f, " ({table}.{column})"),
            (Some(table), None) => write!(f, " ({table})"),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for ConstraintViolation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_mapping() {
        for kind in [
            ConstraintKind::Unique,
            ConstraintKind::Check,
            ConstraintKind::ForeignKey,
            ConstraintKind::NotNull,
        ] {
            assert_eq!(ConstraintKind::from_sqlstate(kind.sqlstate()), Some(kind));
        }
        assert_eq!(ConstraintKind::from_sqlstate("42P01"), None);
        assert_eq!(ConstraintKind::from_sqlstate("23P01"), None);
    }

    #[test]
    fn test_non_database_errors_are_not_violations() {
        assert!(ConstraintViolation::from_sqlx(&sqlx::Error::RowNotFound).is_none());
        let err = SchemaError::UnknownTable("nope".into());
        assert!(err.violation().is_none());
    }

    #[test]
    fn test_violation_display() {
        let v = ConstraintViolation {
            kind: ConstraintKind::Unique,
            constraint: Some("uq_users_email".into()),
            table: Some("users".into()),
            column: None,
        };
        assert_eq!(
            v.to_string(),
            "uniqueness violation on constraint 'uq_users_email' (users)"
        );

        let v = ConstraintViolation {
            kind: ConstraintKind::NotNull,
            constraint: None,
            table: Some("summaries".into()),
            column: Some("blurb".into()),
        };
        assert_eq!(v.to_string(), "not-null violation (summaries.blurb)");
    }

    #[test]
    fn test_invalid_message_joins_problems() {
        let err = SchemaError::Invalid(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Invalid catalog: a; b");
    }
}
