use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sitebackup_engine::{Method, RemoteConfig};

pub fn get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?")?;
    let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
    Ok(rows.next().and_then(|r| r.ok()))
}

pub fn set(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn method_key(method: Method) -> String {
    format!("method.{}", method.slug())
}

/// Stored remote settings for `method`, or `fallback` when none were saved.
pub fn method_config(conn: &Connection, method: Method, fallback: RemoteConfig) -> anyhow::Result<RemoteConfig> {
    match get(conn, &method_key(method))? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(fallback),
    }
}

pub fn save_method_config(conn: &Connection, method: Method, config: &RemoteConfig) -> anyhow::Result<()> {
    set(conn, &method_key(method), &serde_json::to_string(config)?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from_addr: String,
    #[serde(default)]
    pub to_addr: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

pub fn smtp_config(conn: &Connection) -> anyhow::Result<Option<SmtpConfig>> {
    let config = conn
        .query_row(
            "SELECT host, port, user, password, from_addr, to_addr FROM smtp_config WHERE id = 1",
            [],
            |row| {
                Ok(SmtpConfig {
                    host: row.get(0)?,
                    port: row.get(1)?,
                    user: row.get(2)?,
                    password: row.get(3)?,
                    from_addr: row.get(4)?,
                    to_addr: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(config)
}

pub fn save_smtp_config(conn: &Connection, config: &SmtpConfig) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO smtp_config (id, host, port, user, password, from_addr, to_addr) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET host = excluded.host, port = excluded.port, user = excluded.user,
           password = excluded.password, from_addr = excluded.from_addr, to_addr = excluded.to_addr",
        params![
            config.host,
            config.port,
            config.user,
            config.password,
            config.from_addr,
            config.to_addr,
        ],
    )?;
    Ok(())
}
