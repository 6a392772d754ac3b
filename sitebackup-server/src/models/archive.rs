use super::{keep_decoded, parse_column};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use sitebackup_engine::notify::ArchiveRecord;
use sitebackup_engine::Method;

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveRow {
    pub filename: String,
    pub method: Method,
    pub size_bytes: i64,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl ArchiveRow {
    pub fn size_mb(&self) -> f64 {
        (self.size_bytes as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
    }
}

fn row_to_archive(row: &Row) -> rusqlite::Result<ArchiveRow> {
    let timestamp: DateTime<chrono::FixedOffset> = parse_column(row, "timestamp")?;
    Ok(ArchiveRow {
        filename: row.get("filename")?,
        method: parse_column(row, "method")?,
        size_bytes: row.get("size_bytes")?,
        status: row.get("status")?,
        timestamp: timestamp.with_timezone(&Utc),
    })
}

pub fn insert(conn: &Connection, record: &ArchiveRecord) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO archives (filename, method, size_bytes, status, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(filename) DO UPDATE SET size_bytes = excluded.size_bytes, status = excluded.status, timestamp = excluded.timestamp",
        params![
            record.filename,
            record.method.slug(),
            record.size_bytes as i64,
            record.status,
            record.timestamp.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Newest first.
pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<ArchiveRow>> {
    let mut stmt = conn.prepare("SELECT * FROM archives ORDER BY timestamp DESC")?;
    let rows = stmt.query_map([], |row| row_to_archive(row))?;
    Ok(keep_decoded("archives", rows))
}

pub fn delete(conn: &Connection, filename: &str) -> anyhow::Result<bool> {
    let changes = conn.execute("DELETE FROM archives WHERE filename = ?", params![filename])?;
    Ok(changes > 0)
}

/// First instant of the local calendar day `day` in `tz`.
fn day_start(day: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    // Zones that skip midnight start the day at the end of the gap.
    (0..=2)
        .find_map(|h| tz.from_local_datetime(&(midnight + chrono::Duration::hours(h))).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// `(today, total)` archive counts; "today" is the local day `day` in `tz`.
///
/// Timestamps are stored as UTC RFC 3339, so the local day becomes a UTC
/// range compared on the `YYYY-MM-DDTHH:MM:SS` prefix.
pub fn counts(conn: &Connection, day: NaiveDate, tz: &Tz) -> anyhow::Result<(i64, i64)> {
    const PREFIX: &str = "%Y-%m-%dT%H:%M:%S";
    let start = day_start(day, tz);
    let end = day.succ_opt().map(|next| day_start(next, tz)).unwrap_or(DateTime::<Utc>::MAX_UTC);

    let total: i64 = conn.query_row("SELECT COUNT(*) FROM archives", [], |row| row.get(0))?;
    let today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM archives WHERE substr(timestamp, 1, 19) >= ?1 AND substr(timestamp, 1, 19) < ?2",
        params![start.format(PREFIX).to_string(), end.format(PREFIX).to_string()],
        |row| row.get(0),
    )?;
    Ok((today, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::memory_pool;
    use chrono::TimeZone;

    fn record(filename: &str, day: u32) -> ArchiveRecord {
        ArchiveRecord {
            filename: filename.into(),
            size_bytes: 5 * 1024 * 1024,
            status: "Success".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 7, day, 3, 0, 0).unwrap(),
            method: Method::SshSync,
        }
    }

    #[test]
    fn test_insert_list_delete() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        insert(&conn, &record("ssh_backup_20240725_030000.tar.gz", 25)).unwrap();
        insert(&conn, &record("ssh_backup_20240726_030000.tar.gz", 26)).unwrap();

        let rows = find_all(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].filename, "ssh_backup_20240726_030000.tar.gz");
        assert_eq!(rows[0].method, Method::SshSync);
        assert_eq!(rows[0].size_mb(), 5.0);

        assert!(delete(&conn, "ssh_backup_20240725_030000.tar.gz").unwrap());
        assert!(!delete(&conn, "ssh_backup_20240725_030000.tar.gz").unwrap());
        assert_eq!(find_all(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_counts_today_and_total() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        insert(&conn, &record("a.tar.gz", 25)).unwrap();
        insert(&conn, &record("b.tar.gz", 26)).unwrap();
        insert(&conn, &record("c.tar.gz", 26)).unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 7, 26).unwrap();
        assert_eq!(counts(&conn, day, &chrono_tz::UTC).unwrap(), (2, 3));
    }

    #[test]
    fn test_today_follows_local_day() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let at = |filename: &str, h: u32| ArchiveRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 7, 25, h, 30, 0).unwrap(),
            ..record(filename, 25)
        };
        // 22:30 UTC on the 25th is 00:30 on the 26th in Johannesburg.
        insert(&conn, &at("late.tar.gz", 22)).unwrap();
        insert(&conn, &at("early.tar.gz", 20)).unwrap();

        let tz: Tz = "Africa/Johannesburg".parse().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 7, 26).unwrap();
        assert_eq!(counts(&conn, day, &tz).unwrap(), (1, 2));
        assert_eq!(counts(&conn, day, &chrono_tz::UTC).unwrap(), (0, 2));
    }

    #[test]
    fn test_unknown_method_row_is_skipped() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        insert(&conn, &record("ssh_backup_20240726_030000.tar.gz", 26)).unwrap();
        conn.execute_batch("PRAGMA ignore_check_constraints = ON").unwrap();
        conn.execute(
            "INSERT INTO archives (filename, method, size_bytes, status, timestamp)
             VALUES ('ftp_backup.tar.gz', 'ftp', 1, 'Success', '2024-07-26T04:00:00+00:00')",
            [],
        )
        .unwrap();

        let rows = find_all(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].method, Method::SshSync);
    }
}
