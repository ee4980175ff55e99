//! Client-side retry across known client ports (§4.4 "Client-side
//! failover").

use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// Per-outcome counters accumulated across one [`request_with_failover`]
/// call's attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailoverStats {
    pub attempts: u32,
    pub connection_failures: u32,
    pub responses: Vec<String>,
}

/// Shuffles `ports`, tries each against `host` in turn, and returns the
/// first response that isn't a bare connection failure (a `SUCCESS`,
/// `ERROR_RESPONSE`, `NO_CONSENSUS`, or `INCORRECT_RESPONSE` reply all
/// count as an answer — only an unreachable port is retried) up to
/// `max_retries` attempts.
pub async fn request_with_failover(
    host: &str,
    ports: &[u16],
    req: &str,
    max_retries: u32,
    timeout: Duration,
) -> (Option<String>, FailoverStats) {
    let mut shuffled = ports.to_vec();
    shuffled.shuffle(&mut rand::thread_rng());

    let mut stats = FailoverStats::default();
    for port in shuffled.into_iter().take(max_retries.max(1) as usize) {
        stats.attempts += 1;
        let addr = format!("{host}:{port}");
        match send_one(&addr, req, timeout).await {
            Ok(response) => {
                stats.responses.push(response.clone());
                return (Some(response), stats);
            }
            Err(e) => {
                debug!(addr, error = %e, "flat-group client attempt failed");
                stats.connection_failures += 1;
            }
        }
    }
    (None, stats)
}

async fn send_one(addr: &str, req: &str, timeout: Duration) -> std::io::Result<String> {
    tokio::time::timeout(timeout, async {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(format!("{req}\n").as_bytes()).await?;
        stream.flush().await?;
        let mut reader = BufReader::new(&mut stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        Ok(line.trim_end().to_string())
    })
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "flat-group request timed out"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_port_unreachable_exhausts_retries_and_returns_none() {
        let (response, stats) =
            request_with_failover("127.0.0.1", &[1, 2], "REQ_1", 2, Duration::from_millis(50)).await;
        assert!(response.is_none());
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.connection_failures, 2);
    }
}
