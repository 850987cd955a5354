//! DDL statements for the SQLite schema.
//!
//! Every record collection shares one `records` table partitioned by
//! `collection`. Bodies are the record's JSON; timestamps are TEXT in
//! RFC 3339 format.

/// Current schema version, stored under `schema_version` in `metadata`.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Core DDL statements executed during `init_schema`.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // -- Records table -------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS records (
        collection TEXT NOT NULL,
        id         TEXT NOT NULL,
        position   INTEGER NOT NULL DEFAULT 0,
        body       TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_records_position ON records(collection, position)",
    // -- Metadata table ------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS metadata (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];
