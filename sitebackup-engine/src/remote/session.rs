//! SSH session setup shared by the SFTP and SSH sync transports.

use super::RemoteConfig;
use crate::utils::errors::{EngineError, Result};
use ssh2::Session;
use std::net::TcpStream;

pub fn open_session(config: &RemoteConfig) -> Result<Session> {
    let tcp = TcpStream::connect((config.host.as_str(), config.port)).map_err(|e| {
        EngineError::Connection(format!("{}:{} unreachable: {}", config.host, config.port, e))
    })?;

    let mut sess = Session::new()?;
    sess.set_tcp_stream(tcp);
    sess.handshake()?;

    if let Some(key_path) = &config.key_path {
        let passphrase = (!config.secret.is_empty()).then_some(config.secret.as_str());
        if let Err(e) = sess.userauth_pubkey_file(&config.user, None, key_path, passphrase) {
            tracing::debug!(host = %config.host, error = %e, "Key authentication failed, trying password");
        }
    }

    if !sess.authenticated() {
        sess.userauth_password(&config.user, &config.secret)
            .map_err(|e| EngineError::Connection(format!("SSH authentication failed: {}", e)))?;
    }

    if !sess.authenticated() {
        return Err(EngineError::Connection("SSH authentication failed".into()));
    }

    tracing::debug!(host = %config.host, port = config.port, user = %config.user, "SSH session established");
    Ok(sess)
}

pub fn close_session(sess: &Session) {
    if let Err(e) = sess.disconnect(None, "backup finished", None) {
        tracing::debug!(error = %e, "SSH disconnect failed");
    }
}

/// Join a child name onto a remote directory without producing a leading `./`.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == super::ROOT_SENTINEL {
        name.to_string()
    } else if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_path_under_sentinel() {
        assert_eq!(child_path(".", "wp-config.php"), "wp-config.php");
    }

    #[test]
    fn test_child_path_nested() {
        assert_eq!(child_path("public_html", "index.php"), "public_html/index.php");
        assert_eq!(child_path("/var/www/", "index.php"), "/var/www/index.php");
    }
}
