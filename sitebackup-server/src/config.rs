use chrono_tz::Tz;
use sitebackup_engine::{Method, RemoteConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_TIMEZONE: &str = "Africa/Johannesburg";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub archives_dir: PathBuf,
    pub timezone: Tz,
    pub cpu_sample_secs: u64,
    /// Remote settings from the environment; database values take precedence.
    pub method_defaults: BTreeMap<Method, RemoteConfig>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "./data".into()));

        Self {
            port: var("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            db_path: data_dir.join("backups.db"),
            archives_dir: var("ARCHIVES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("archives")),
            data_dir,
            timezone: parse_timezone(&var("BACKUP_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.into())),
            cpu_sample_secs: var("CPU_SAMPLE_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(1),
            method_defaults: Method::ALL
                .iter()
                .map(|m| (*m, method_from_lookup(*m, &var)))
                .collect(),
        }
    }

    pub fn method_default(&self, method: Method) -> RemoteConfig {
        self.method_defaults
            .get(&method)
            .cloned()
            .unwrap_or_else(|| RemoteConfig {
                port: method.default_port(),
                ..Default::default()
            })
    }
}

fn env_prefix(method: Method) -> &'static str {
    match method {
        Method::Sftp => "SFTP",
        Method::SshSync => "SSH",
        Method::Cpanel => "CPANEL",
    }
}

fn method_from_lookup(method: Method, var: &impl Fn(&str) -> Option<String>) -> RemoteConfig {
    let prefix = env_prefix(method);
    let get = |field: &str| var(&format!("{}_{}", prefix, field));

    RemoteConfig {
        host: get("HOST").unwrap_or_default(),
        port: get("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| method.default_port()),
        user: get("USER").unwrap_or_default(),
        secret: get("PASS").or_else(|| get("TOKEN")).unwrap_or_default(),
        remote_path: get("PATH").unwrap_or_else(|| ".".into()),
        key_path: get("KEY").map(PathBuf::from),
    }
}

/// Unknown names fall back to UTC so a typo never keeps the service down.
pub fn parse_timezone(name: &str) -> Tz {
    name.trim().parse::<Tz>().unwrap_or_else(|_| {
        tracing::warn!(timezone = %name, "Unknown timezone, falling back to UTC");
        Tz::UTC
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.archives_dir, PathBuf::from("./data/archives"));
        assert_eq!(config.timezone, chrono_tz::Africa::Johannesburg);
        assert_eq!(config.method_default(Method::Cpanel).port, 2083);
        assert!(!config.method_default(Method::Sftp).has_host());
    }

    #[test]
    fn test_method_settings_from_env() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SSH_HOST", "files.example.org"),
            ("SSH_PORT", "2222"),
            ("SSH_USER", "deploy"),
            ("SSH_PASS", "hunter2"),
            ("SSH_PATH", "public_html"),
            ("CPANEL_TOKEN", "ABC123"),
        ]));
        let ssh = config.method_default(Method::SshSync);
        assert_eq!(ssh.host, "files.example.org");
        assert_eq!(ssh.port, 2222);
        assert_eq!(ssh.root(), "public_html");
        assert_eq!(config.method_default(Method::Cpanel).secret, "ABC123");
    }

    #[test]
    fn test_bad_timezone_falls_back_to_utc() {
        assert_eq!(parse_timezone("Mars/Olympus_Mons"), Tz::UTC);
        assert_eq!(parse_timezone("Europe/Berlin"), chrono_tz::Europe::Berlin);
    }
}
