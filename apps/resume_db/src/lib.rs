//! Schema package for the resume store: the typed table catalog, its
//! rendered migrations, and the tooling to apply and verify them.

pub mod cli;
pub mod config;
pub mod db;
pub mod errors;
pub mod schema;
