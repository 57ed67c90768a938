/// SQL DDL for the local cache database.
/// One key-value table: each collection (habit cache, pending queue) is a
/// single JSON-encoded row replaced wholesale on save.
pub const SCHEMA_VERSION: u32 = 1;

pub const KEY_HABITS: &str = "habits";
pub const KEY_PENDING_COMPLETIONS: &str = "pending_completions";

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
