//! Foreign-key graph over a catalog: creation order and delete cascades.

use std::collections::{HashSet, VecDeque};

use super::{Catalog, OnDelete, Table};
use crate::errors::SchemaError;

/// Orders tables so every referenced table comes before the tables pointing
/// at it. Ties keep declaration order, so a catalog that is already in a
/// valid order comes back unchanged. Self-references are ignored.
pub fn creation_order(catalog: &Catalog) -> Result<Vec<&Table>, SchemaError> {
    for table in catalog.tables() {
        for fk in table.foreign_keys() {
            if catalog.table(fk.references).is_none() {
                return Err(SchemaError::UnknownTable(fk.references.to_string()));
            }
        }
    }

    let mut ordered: Vec<&Table> = Vec::with_capacity(catalog.tables().len());
    let mut placed: HashSet<&str> = HashSet::new();

    while ordered.len() < catalog.tables().len() {
        let before = ordered.len();
        for table in catalog.tables() {
            if placed.contains(table.name()) {
                continue;
            }
            let ready = table
                .foreign_keys()
                .iter()
                .all(|fk| fk.references == table.name() || placed.contains(fk.references));
            if ready {
                placed.insert(table.name());
                ordered.push(table);
            }
        }
        if ordered.len() == before {
            let stuck = catalog
                .tables()
                .iter()
                .filter(|t| !placed.contains(t.name()))
                .map(|t| t.name().to_string())
                .collect();
            return Err(SchemaError::Cycle(stuck));
        }
    }

    Ok(ordered)
}

/// Tables that lose rows, directly or transitively, when a row of `table` is
/// deleted. Only `ON DELETE CASCADE` edges are followed; the starting table
/// itself is not included. Breadth-first, declaration order within a level.
pub fn cascade_closure(catalog: &Catalog, table: &str) -> Result<Vec<&'static str>, SchemaError> {
    if catalog.table(table).is_none() {
        return Err(SchemaError::UnknownTable(table.to_string()));
    }

    let mut reached: Vec<&'static str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::from([table]);
    let mut queue: VecDeque<&str> = VecDeque::from([table]);

    while let Some(parent) = queue.pop_front() {
        for child in catalog.tables() {
            if seen.contains(child.name()) {
                continue;
            }
            let cascades = child
                .foreign_keys()
                .iter()
                .any(|fk| fk.references == parent && fk.on_delete == OnDelete::Cascade);
            if cascades {
                seen.insert(child.name());
                reached.push(child.name());
                queue.push_back(child.name());
            }
        }
    }

    Ok(reached)
}
