//! Bounded in-memory history: recent log lines and CPU samples.

pub mod cpu;
pub mod logbuf;

pub use cpu::{CpuHistory, CpuSample, CpuSampler};
pub use logbuf::{LogBuffer, LogEntry};
