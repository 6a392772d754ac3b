//! cPanel probe: checks the API version endpoint and reports it as a marker
//! file. There is no file tree behind this method.

use super::{Handshake, RemoteConfig, RemoteEntry, RemoteSource};
use crate::utils::errors::{EngineError, Result};
use reqwest::header::AUTHORIZATION;
use std::path::Path;
use std::time::Duration;

pub const MARKER_NAME: &str = "cpanel_probe.txt";

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CpanelSource {
    config: RemoteConfig,
}

impl CpanelSource {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }

    fn version_url(&self) -> String {
        format!("https://{}:{}/json-api/version", self.config.host, self.config.port)
    }
}

impl RemoteSource for CpanelSource {
    fn connect(&mut self) -> Result<Handshake> {
        let client = reqwest::blocking::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()?;

        let response = client
            .get(self.version_url())
            .header(
                AUTHORIZATION,
                format!("cpanel {}:{}", self.config.user, self.config.secret),
            )
            .send()?
            .error_for_status()?;

        let body: serde_json::Value = response.json()?;
        let version = extract_version(&body).ok_or_else(|| {
            EngineError::Connection("cPanel API response carried no version".into())
        })?;

        tracing::info!(host = %self.config.host, %version, "cPanel API reachable");

        Ok(Handshake::Probe {
            marker_name: MARKER_NAME.to_string(),
            contents: format!(
                "host: {}\ncpanel_version: {}\nprobed_at: {}\n",
                self.config.host,
                version,
                chrono::Utc::now().to_rfc3339()
            ),
        })
    }

    fn list_entries(&mut self, _path: &str) -> Result<Vec<RemoteEntry>> {
        Ok(Vec::new())
    }

    fn fetch(&mut self, remote: &str, _local: &Path) -> Result<u64> {
        Err(EngineError::fetch(remote, "cPanel probe does not transfer files"))
    }

    fn close(&mut self) {}
}

/// WHM answers `{"version": ..}`, newer API versions nest it under `data`.
fn extract_version(body: &serde_json::Value) -> Option<String> {
    body.get("version")
        .or_else(|| body.get("data").and_then(|d| d.get("version")))
        .and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_version_flat() {
        assert_eq!(
            extract_version(&json!({ "version": "11.118.0.5" })).as_deref(),
            Some("11.118.0.5")
        );
    }

    #[test]
    fn test_extract_version_nested() {
        let body = json!({ "metadata": { "result": 1 }, "data": { "version": "11.120.0.3" } });
        assert_eq!(extract_version(&body).as_deref(), Some("11.120.0.3"));
        assert_eq!(extract_version(&json!({ "status": 0 })), None);
    }

    #[test]
    fn test_version_url() {
        let source = CpanelSource::new(RemoteConfig {
            host: "cp.example.org".into(),
            port: 2083,
            ..Default::default()
        });
        assert_eq!(source.version_url(), "https://cp.example.org:2083/json-api/version");
    }
}
