use sitebackup_engine::monitor::CpuSampler;
use sitebackup_engine::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Samples host CPU into the engine's history until `cancel` fires. Hosts
/// without `/proc/stat` record nothing.
pub fn start_cpu_monitor(engine: Arc<Engine>, every: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut sampler = CpuSampler::default();
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match sampler.sample() {
                        Ok(Some(percent)) => engine.cpu().push(percent),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::info!(error = %e, "CPU sampling unavailable, monitor disabled");
                            break;
                        }
                    }
                }
            }
        }
        tracing::info!("CPU monitor stopped");
    });
}
