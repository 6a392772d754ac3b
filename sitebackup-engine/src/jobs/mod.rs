//! Per-method run state.

pub mod board;

pub use board::{JobBoard, JobPhase, MethodStatus, RunTicket};
