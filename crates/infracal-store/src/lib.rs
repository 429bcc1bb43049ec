//! InfraCalendar Store — pages, versioned events, migrations and FTS5 search on SQLite.

pub mod dedup;
pub mod hash;
pub mod migrate;
pub mod schema;
pub mod sqlite;
pub mod text;
pub mod types;
pub mod validity;

pub use hash::content_hash;
pub use migrate::{validate_schema, Migration, MigrationReport, Migrator, SchemaReport};
pub use sqlite::SqliteStore;
pub use types::*;
pub use validity::classify;
