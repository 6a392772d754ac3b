//! Host CPU utilisation, sampled from `/proc/stat`.

use crate::events::EngineEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

pub const CPU_CAPACITY: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuSample {
    pub timestamp: DateTime<Utc>,
    pub percent: f64,
}

pub struct CpuHistory {
    samples: Mutex<VecDeque<CpuSample>>,
    events: broadcast::Sender<EngineEvent>,
}

impl CpuHistory {
    pub fn new(events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(CPU_CAPACITY)),
            events,
        }
    }

    pub fn push(&self, percent: f64) {
        let sample = CpuSample {
            timestamp: Utc::now(),
            percent: (percent * 10.0).round() / 10.0,
        };
        {
            let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
            if samples.len() == CPU_CAPACITY {
                samples.pop_front();
            }
            samples.push_back(sample);
        }
        let _ = self.events.send(EngineEvent::Cpu(sample));
    }

    pub fn snapshot(&self) -> Vec<CpuSample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

impl CpuTimes {
    /// Parse the aggregate `cpu ` line of `/proc/stat`.
    fn parse(stat: &str) -> Option<Self> {
        let line = stat.lines().find(|l| l.starts_with("cpu "))?;
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(|f| f.parse().ok())
            .collect::<Option<_>>()?;
        if fields.len() < 4 {
            return None;
        }
        // idle + iowait
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        // guest time is already counted in user/nice
        let total = fields.iter().take(8).sum();
        Some(Self { idle, total })
    }
}

/// Computes utilisation between successive reads.
pub struct CpuSampler {
    stat_path: PathBuf,
    previous: Option<CpuTimes>,
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::with_path("/proc/stat")
    }
}

impl CpuSampler {
    pub fn with_path(stat_path: impl Into<PathBuf>) -> Self {
        Self {
            stat_path: stat_path.into(),
            previous: None,
        }
    }

    /// Utilisation in percent since the previous call. The first call only
    /// primes the sampler and returns `None`.
    pub fn sample(&mut self) -> std::io::Result<Option<f64>> {
        let stat = std::fs::read_to_string(&self.stat_path)?;
        let current = CpuTimes::parse(&stat).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "no aggregate cpu line")
        })?;
        Ok(self.advance(current))
    }

    fn advance(&mut self, current: CpuTimes) -> Option<f64> {
        let previous = self.previous.replace(current)?;
        let total = current.total.saturating_sub(previous.total);
        if total == 0 {
            return Some(0.0);
        }
        let idle = current.idle.saturating_sub(previous.idle).min(total);
        Some((total - idle) as f64 * 100.0 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_aggregate_line() {
        let stat = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 50 0 25 400 25 0 0 0 0 0\n";
        assert_eq!(
            CpuTimes::parse(stat),
            Some(CpuTimes { idle: 850, total: 1000 })
        );
        assert_eq!(CpuTimes::parse("intr 1 2 3"), None);
    }

    #[test]
    fn test_sampler_reports_delta() {
        let mut sampler = CpuSampler::with_path("/nonexistent");
        assert_eq!(sampler.advance(CpuTimes { idle: 800, total: 1000 }), None);
        let percent = sampler.advance(CpuTimes { idle: 850, total: 1200 }).unwrap();
        assert!((percent - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sampler_reads_file() -> std::io::Result<()> {
        let file = NamedTempFile::new()?;
        std::fs::write(file.path(), "cpu  10 0 10 80 0 0 0 0\n")?;
        let mut sampler = CpuSampler::with_path(file.path());
        assert_eq!(sampler.sample()?, None);

        std::fs::write(file.path(), "cpu  30 0 30 140 0 0 0 0\n")?;
        let percent = sampler.sample()?.unwrap();
        assert!((percent - 40.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_history_keeps_newest_forty() {
        let history = CpuHistory::new(crate::events::channel());
        for i in 0..60 {
            history.push(i as f64);
        }
        let samples = history.snapshot();
        assert_eq!(samples.len(), CPU_CAPACITY);
        assert_eq!(samples[0].percent, 20.0);
    }
}
