use super::Reachability;
use crate::config::TcpCheckConfig;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, warn};

/// Attempts one TCP connection per target, strictly in order.
pub async fn collect_reachability(targets: &[TcpCheckConfig]) -> Vec<Reachability> {
    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        results.push(run_tcp_check(target).await);
    }
    results
}

async fn run_tcp_check(cfg: &TcpCheckConfig) -> Reachability {
    let start = Instant::now();
    let addr = format!("{}:{}", cfg.host, cfg.port);

    let reachable = match time::timeout(
        Duration::from_millis(cfg.timeout_ms),
        TcpStream::connect(&addr),
    )
    .await
    {
        Ok(Ok(_stream)) => {
            debug!(
                check = %cfg.name,
                address = %addr,
                latency_ms = start.elapsed().as_millis() as u64,
                "tcp-цель доступна"
            );
            true
        }
        Ok(Err(err)) => {
            warn!(check = %cfg.name, address = %addr, error = %err, "tcp-цель недоступна");
            false
        }
        Err(_elapsed) => {
            warn!(check = %cfg.name, address = %addr, "таймаут подключения к tcp-цели");
            false
        }
    };

    Reachability {
        name: cfg.name.clone(),
        address: addr,
        reachable,
    }
}
