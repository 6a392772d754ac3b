//! Utility modules for the backup engine.

pub mod errors;

pub use errors::{ArchiveError, EngineError, NotifyError, Result};
