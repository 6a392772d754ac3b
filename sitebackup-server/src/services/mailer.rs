//! Database-backed implementations of the engine's outbound seams.

use crate::db::connection::DbPool;
use crate::models::{archive, settings};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use sitebackup_engine::notify::{ArchiveRecord, ArchiveStore, Delivery, Notifier};
use sitebackup_engine::{EngineError, NotifyError};

/// Sends outcome mail through the relay saved in `smtp_config`.
pub struct SmtpNotifier {
    db: DbPool,
}

impl SmtpNotifier {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl Notifier for SmtpNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<Delivery, NotifyError> {
        let conn = self.db.get().map_err(|e| NotifyError::Settings(e.to_string()))?;
        let config = settings::smtp_config(&conn).map_err(|e| NotifyError::Settings(e.to_string()))?;
        drop(conn);

        let Some(config) = config.filter(|c| c.is_configured()) else {
            return Ok(Delivery::Skipped);
        };

        let msg = build_message(&config, subject, body)?;
        let creds = Credentials::new(config.user.clone(), config.password.clone());
        let transport = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(config.port)
            .credentials(creds)
            .build();

        transport
            .send(&msg)
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        tracing::info!(to = %config.to_addr, subject, "Notification mail sent");
        Ok(Delivery::Sent)
    }
}

fn build_message(config: &settings::SmtpConfig, subject: &str, body: &str) -> Result<Message, NotifyError> {
    let from: Mailbox = config
        .from_addr
        .parse()
        .map_err(|e| NotifyError::Address(format!("from {}: {}", config.from_addr, e)))?;
    let to: Mailbox = config
        .to_addr
        .parse()
        .map_err(|e| NotifyError::Address(format!("to {}: {}", config.to_addr, e)))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| NotifyError::Message(e.to_string()))
}

/// Writes archive records to the `archives` table.
pub struct DbArchiveStore {
    db: DbPool,
}

impl DbArchiveStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl ArchiveStore for DbArchiveStore {
    fn record(&self, record: &ArchiveRecord) -> sitebackup_engine::Result<()> {
        let conn = self.db.get().map_err(|e| EngineError::Store(e.to_string()))?;
        archive::insert(&conn, record).map_err(|e| EngineError::Store(e.to_string()))
    }
}
