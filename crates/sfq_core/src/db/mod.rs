use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction};

use crate::error::AppError;

/// Schema steps in apply order. Names are recorded once applied and never reused.
const MIGRATIONS: [(&str, &str); 2] = [
    (
        "0001_init.sql",
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../migrations/0001_init.sql")),
    ),
    (
        "0002_review_decisions.sql",
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../migrations/0002_review_decisions.sql"
        )),
    ),
];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn sql_err(code: &'static str, message: String) -> impl FnOnce(rusqlite::Error) -> AppError {
    move |e| AppError::new(code, message).with_details(e.to_string())
}

pub fn open(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path).map_err(|e| {
        AppError::new("DB_OPEN_FAILED", "Failed to open SQLite database")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(sql_err("DB_OPEN_FAILED", "Failed to set SQLite busy timeout".into()))?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory()
        .map_err(sql_err("DB_OPEN_FAILED", "Failed to open in-memory SQLite database".into()))
}

fn applied_migrations(conn: &Connection) -> Result<HashSet<String>, AppError> {
    let mut stmt = conn
        .prepare("SELECT name FROM _migrations")
        .map_err(sql_err("DB_MIGRATIONS_QUERY_FAILED", "Failed to query applied migrations".into()))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(sql_err("DB_MIGRATIONS_QUERY_FAILED", "Failed to read applied migrations".into()))?;
    names
        .collect::<Result<HashSet<_>, _>>()
        .map_err(sql_err("DB_MIGRATIONS_QUERY_FAILED", "Failed to read applied migration row".into()))
}

fn apply_one(tx: &Transaction<'_>, name: &str, sql: &str) -> Result<(), AppError> {
    tx.execute_batch(sql)
        .map_err(sql_err("DB_MIGRATION_FAILED", format!("Migration {name} failed")))?;
    tx.execute(
        "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
        [name],
    )
    .map_err(sql_err("DB_MIGRATION_FAILED", format!("Failed to record migration {name}")))?;
    Ok(())
}

/// Enable foreign keys and bring the schema up to date. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         CREATE TABLE IF NOT EXISTS _migrations (name TEXT PRIMARY KEY NOT NULL, applied_at TEXT NOT NULL);",
    )
    .map_err(sql_err("DB_MIGRATIONS_TABLE_FAILED", "Failed to prepare migrations table".into()))?;

    let applied = applied_migrations(conn)?;
    for (name, sql) in MIGRATIONS.iter().filter(|(n, _)| !applied.contains(*n)) {
        let tx = conn
            .transaction()
            .map_err(sql_err("DB_TX_FAILED", "Failed to start migration transaction".into()))?;
        apply_one(&tx, name, sql)?;
        tx.commit()
            .map_err(sql_err("DB_TX_FAILED", "Failed to commit migration transaction".into()))?;
        tracing::debug!(migration = *name, "applied migration");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::OptionalExtension;

    #[test]
    fn migrations_create_pipeline_tables() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");

        for table in ["runs", "questions", "artifacts", "review_decisions"] {
            let name: Option<String> = conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .optional()
                .unwrap();
            assert_eq!(name.as_deref(), Some(table));
        }
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("first");
        migrate(&mut conn).expect("second");
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 2);
    }
}
