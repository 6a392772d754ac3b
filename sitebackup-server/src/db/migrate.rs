use crate::db::connection::DbPool;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS archives (
  filename TEXT PRIMARY KEY,
  method TEXT NOT NULL CHECK(method IN ('sftp','ssh','cpanel')),
  size_bytes INTEGER NOT NULL DEFAULT 0,
  status TEXT NOT NULL DEFAULT 'Success',
  timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schedules (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  method TEXT NOT NULL DEFAULT 'sftp' CHECK(method IN ('sftp','ssh','cpanel')),
  hour INTEGER NOT NULL CHECK(hour BETWEEN 0 AND 23),
  minute INTEGER NOT NULL CHECK(minute BETWEEN 0 AND 59),
  days TEXT NOT NULL DEFAULT 'mon,tue,wed,thu,fri,sat,sun'
);

CREATE TABLE IF NOT EXISTS smtp_config (
  id INTEGER PRIMARY KEY CHECK(id = 1),
  host TEXT NOT NULL DEFAULT '',
  port INTEGER NOT NULL DEFAULT 587,
  user TEXT NOT NULL DEFAULT '',
  password TEXT NOT NULL DEFAULT '',
  from_addr TEXT NOT NULL DEFAULT '',
  to_addr TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS settings (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_archives_timestamp ON archives(timestamp DESC);
"#;

pub fn apply_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(SCHEMA)?;

    // Databases created before per-method schedules
    if !has_column(conn, "schedules", "method")? {
        conn.execute_batch("ALTER TABLE schedules ADD COLUMN method TEXT NOT NULL DEFAULT 'sftp'")?;
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .collect::<Vec<_>>();
    Ok(columns.iter().any(|c| c == column))
}

pub fn migrate(pool: &DbPool, data_dir: &Path, archives_dir: &Path) -> anyhow::Result<()> {
    tracing::info!("[DB] Starting database migration...");

    fs::create_dir_all(data_dir)?;
    fs::create_dir_all(archives_dir)?;

    let conn = pool.get()?;
    apply_schema(&conn)?;

    tracing::info!("[DB] Migration completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();
        assert!(has_column(&conn, "archives", "method").unwrap());
    }

    #[test]
    fn test_legacy_schedules_gain_method() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schedules (id INTEGER PRIMARY KEY AUTOINCREMENT, hour INTEGER, minute INTEGER, days TEXT);
             INSERT INTO schedules (hour, minute, days) VALUES (3, 0, 'mon');",
        )
        .unwrap();

        apply_schema(&conn).unwrap();

        let method: String = conn
            .query_row("SELECT method FROM schedules", [], |row| row.get(0))
            .unwrap();
        assert_eq!(method, "sftp");
    }
}
