use std::collections::HashSet;

use super::graph::creation_order;
use super::{Catalog, CheckRule, ColumnType, OnDelete, Table, OWNER_COLUMN};
use crate::errors::SchemaError;

/// Structural self-check of a catalog.
///
/// Collects every problem instead of stopping at the first one. A catalog
/// that passes renders to DDL the database accepts, and upholds the
/// ownership rules: a `user_id` reference and both sides of a junction
/// must cascade on delete.
pub fn validate(catalog: &Catalog) -> Result<(), SchemaError> {
    let mut problems = Vec::new();

    let mut names = HashSet::new();
    for table in catalog.tables() {
        if !names.insert(table.name()) {
            problems.push(format!("table '{}' is declared twice", table.name()));
        }
        check_table(catalog, table, &mut problems);
    }

    if !problems.is_empty() {
        return Err(SchemaError::Invalid(problems));
    }

    creation_order(catalog)?;
    Ok(())
}

fn check_table(catalog: &Catalog, table: &Table, problems: &mut Vec<String>) {
    let name = table.name();

    let mut columns = HashSet::new();
    for column in table.columns() {
        if !columns.insert(column.name) {
            problems.push(format!("{name}.{} is declared twice", column.name));
        }
    }
    if table.columns().is_empty() {
        problems.push(format!("{name} has no columns"));
    }

    if table.primary_key().is_empty() {
        problems.push(format!("{name} has no primary key"));
    }

    let mut require_column = |column: &str, role: &str| {
        if table.column(column).is_none() {
            problems.push(format!("{name}: {role} refers to unknown column '{column}'"));
        }
    };
    for &column in table.primary_key() {
        require_column(column, "primary key");
    }
    for unique in table.uniques() {
        for &column in unique {
            require_column(column, "unique constraint");
        }
    }
    for index in table.indexes() {
        for &column in index {
            require_column(column, "index");
        }
    }
    for check in table.checks() {
        require_column(check.column, "check constraint");
    }
    for fk in table.foreign_keys() {
        require_column(fk.column, "foreign key");
    }

    for check in table.checks() {
        let Some(column) = table.column(check.column) else {
            continue;
        };
        match check.rule {
            CheckRule::OneOf(values) => {
                if values.is_empty() {
                    problems.push(format!("{name}.{}: empty value set", check.column));
                }
                if !column.ty.is_textual() {
                    problems.push(format!(
                        "{name}.{}: value-set check on non-text column",
                        check.column
                    ));
                }
            }
            CheckRule::NonNegative => {
                let numeric = matches!(column.ty, ColumnType::Integer | ColumnType::Numeric { .. });
                if !numeric {
                    problems.push(format!(
                        "{name}.{}: non-negative check on non-numeric column",
                        check.column
                    ));
                }
            }
        }
    }

    for fk in table.foreign_keys() {
        let Some(target) = catalog.table(fk.references) else {
            problems.push(format!(
                "{name}.{} references unknown table '{}'",
                fk.column, fk.references
            ));
            continue;
        };
        if !matches!(target.primary_key(), [pk] if *pk == fk.referenced_column) {
            problems.push(format!(
                "{name}.{} must reference the primary key of {}",
                fk.column, fk.references
            ));
        }
        if let (Some(from), Some(to)) = (table.column(fk.column), target.column(fk.referenced_column)) {
            if from.ty != to.ty {
                problems.push(format!(
                    "{name}.{} type does not match {}.{}",
                    fk.column, fk.references, fk.referenced_column
                ));
            }
        }
        if fk.on_delete == OnDelete::SetNull
            && table.column(fk.column).is_some_and(|c| !c.nullable)
        {
            problems.push(format!(
                "{name}.{} is NOT NULL but set to NULL on delete",
                fk.column
            ));
        }
        let must_cascade = fk.column == OWNER_COLUMN || table.is_junction();
        if must_cascade && fk.on_delete != OnDelete::Cascade {
            problems.push(format!("{name}.{} must cascade on delete", fk.column));
        }
    }
}
