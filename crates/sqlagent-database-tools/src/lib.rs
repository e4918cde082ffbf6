//! Database tools for the SQL agent
//!
//! This crate turns uploaded files into SQLite databases, wraps a database in
//! a read-only handle, and exposes the three tools the agent works with:
//! list tables, inspect schema, run a query.

pub mod config;
pub mod database;
pub mod ingest;
pub mod tools;
pub mod types;

// Re-exports
pub use config::{DatabaseToolConfig, SqlOperation};
pub use database::SqlDatabase;
pub use ingest::{csv_to_sqlite, save_uploaded_file, DatasetKind, IngestConfig, SavedDataset, SavedSource};
pub use tools::{create_sql_tools, LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL};
pub use types::{ColumnInfo, QueryResult, TableInfo};
