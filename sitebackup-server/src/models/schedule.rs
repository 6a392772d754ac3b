use super::{keep_decoded, parse_column};
use rusqlite::{params, Connection, Row};
use serde::Deserialize;
use sitebackup_engine::schedule::{DaySet, ScheduleRule};
use sitebackup_engine::Method;

fn row_to_rule(row: &Row) -> rusqlite::Result<ScheduleRule> {
    let days: String = row.get("days")?;
    Ok(ScheduleRule {
        id: row.get("id")?,
        method: parse_column(row, "method")?,
        hour: row.get("hour")?,
        minute: row.get("minute")?,
        days: DaySet::parse(&days).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default = "default_method")]
    pub method: Method,
    pub hour: u8,
    pub minute: u8,
    #[serde(default)]
    pub days: DaySet,
}

fn default_method() -> Method {
    Method::Sftp
}

impl ScheduleRequest {
    /// Rule as it will be stored; unset or empty days mean every day.
    pub fn to_rule(&self, id: i64) -> ScheduleRule {
        ScheduleRule {
            id,
            method: self.method,
            hour: self.hour,
            minute: self.minute,
            days: self.days.or_all(),
        }
    }
}

pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<ScheduleRule>> {
    let mut stmt = conn.prepare("SELECT * FROM schedules ORDER BY hour, minute, id")?;
    let rows = stmt.query_map([], |row| row_to_rule(row))?;
    Ok(keep_decoded("schedules", rows))
}

pub fn find_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<ScheduleRule>> {
    let mut stmt = conn.prepare("SELECT * FROM schedules WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], |row| row_to_rule(row))?;
    Ok(rows.next().transpose()?)
}

pub fn create(conn: &Connection, req: &ScheduleRequest) -> anyhow::Result<ScheduleRule> {
    let rule = req.to_rule(0);
    conn.execute(
        "INSERT INTO schedules (method, hour, minute, days) VALUES (?1, ?2, ?3, ?4)",
        params![rule.method.slug(), rule.hour, rule.minute, rule.days.to_csv()],
    )?;
    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("Failed to retrieve created schedule"))
}

pub fn update(conn: &Connection, id: i64, req: &ScheduleRequest) -> anyhow::Result<Option<ScheduleRule>> {
    let rule = req.to_rule(id);
    let changes = conn.execute(
        "UPDATE schedules SET method = ?1, hour = ?2, minute = ?3, days = ?4 WHERE id = ?5",
        params![rule.method.slug(), rule.hour, rule.minute, rule.days.to_csv(), id],
    )?;
    if changes == 0 {
        return Ok(None);
    }
    find_by_id(conn, id)
}

pub fn delete(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let changes = conn.execute("DELETE FROM schedules WHERE id = ?", params![id])?;
    Ok(changes > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::memory_pool;
    use chrono::Weekday;

    fn request(json: &str) -> ScheduleRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_create_defaults_to_every_day() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();

        let rule = create(&conn, &request(r#"{"hour":3,"minute":15}"#)).unwrap();

        assert_eq!(rule.method, Method::Sftp);
        assert_eq!(rule.days, DaySet::ALL);
        assert_eq!(find_all(&conn).unwrap(), vec![rule]);
    }

    #[test]
    fn test_update_and_delete() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let rule = create(&conn, &request(r#"{"method":"ssh","hour":1,"minute":0,"days":["mon"]}"#)).unwrap();

        let updated = update(&conn, rule.id, &request(r#"{"method":"cpanel","hour":14,"minute":30,"days":["mon","wed"]}"#))
            .unwrap()
            .unwrap();
        assert_eq!(updated.method, Method::Cpanel);
        assert!(updated.days.contains(Weekday::Wed));
        assert!(update(&conn, 999, &request(r#"{"hour":1,"minute":1}"#)).unwrap().is_none());

        assert!(delete(&conn, rule.id).unwrap());
        assert!(find_all(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_damaged_rows_are_skipped_not_retargeted() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let good = create(&conn, &request(r#"{"method":"ssh","hour":2,"minute":0}"#)).unwrap();
        conn.execute_batch("PRAGMA ignore_check_constraints = ON").unwrap();
        conn.execute(
            "INSERT INTO schedules (method, hour, minute, days) VALUES ('ftp', 3, 0, 'mon')",
            [],
        )
        .unwrap();
        let bad_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO schedules (method, hour, minute, days) VALUES ('sftp', 4, 0, 'funday')",
            [],
        )
        .unwrap();

        assert_eq!(find_all(&conn).unwrap(), vec![good]);
        assert!(find_by_id(&conn, bad_id).is_err());
    }
}
