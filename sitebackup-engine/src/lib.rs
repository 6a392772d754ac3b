//! Site Backup Engine Library
//!
//! Multi-method backup jobs: a remote tree (SFTP, SSH or a cPanel probe) is
//! mirrored into a staging directory and packed into a timestamped archive,
//! with one admitted run per method at a time.

pub mod engine;
pub mod events;
pub mod executor;
pub mod jobs;
pub mod method;
pub mod monitor;
pub mod notify;
pub mod remote;
pub mod schedule;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use engine::{Engine, EngineStatus};
pub use events::EngineEvent;
pub use executor::{JobOutcome, StorageLayout};
pub use jobs::{JobPhase, MethodStatus, RunTicket};
pub use method::Method;
pub use remote::RemoteConfig;
pub use utils::errors::{ArchiveError, EngineError, NotifyError};
pub type Result<T> = std::result::Result<T, EngineError>;
