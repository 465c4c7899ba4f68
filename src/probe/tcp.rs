//! TCP connect probe
//!
//! Dials the candidate on the configured port and treats a completed
//! handshake as proof of reachability. No data is exchanged; the
//! connection is dropped the moment it is ready.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::{clamp_latency_ms, ProbeFamily, ProbeOutcome, ProbeResult};

/// Probe one candidate with a single connection attempt, emitting exactly
/// one result on `tx`
pub(crate) async fn probe(
    ip: IpAddr,
    port: u16,
    reply_idx: usize,
    timeout: Duration,
    tx: mpsc::Sender<ProbeResult>,
) {
    let addr = SocketAddr::new(ip, port);
    log::debug!("connecting to {} via tcp", addr);

    let start = Instant::now();
    let outcome = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            let latency_ms = clamp_latency_ms(start.elapsed());
            drop(stream);
            ProbeOutcome::Success { latency_ms }
        }
        Ok(Err(e)) => {
            log::debug!("tcp connect to {} failed: {}", addr, e);
            ProbeOutcome::Failure
        }
        Err(_) => {
            log::debug!("tcp connect to {} timed out", addr);
            ProbeOutcome::Failure
        }
    };

    let _ = tx
        .send(ProbeResult {
            ip,
            reply_idx,
            family: ProbeFamily::Tcp,
            outcome,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};

    #[tokio::test]
    async fn test_connect_success() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, mut rx) = mpsc::channel(1);
        probe(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            3,
            Duration::from_millis(1000),
            tx,
        )
        .await;

        let result = rx.recv().await.unwrap();
        assert_eq!(result.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(result.reply_idx, 3);
        assert_eq!(result.family, ProbeFamily::Tcp);
        assert!(matches!(result.outcome, ProbeOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn test_connect_refused_is_failure() {
        // bind then drop to find a port with nothing listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let (tx, mut rx) = mpsc::channel(1);
        probe(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            0,
            Duration::from_millis(1000),
            tx,
        )
        .await;

        let result = rx.recv().await.unwrap();
        assert_eq!(result.outcome, ProbeOutcome::Failure);
    }

    #[tokio::test]
    async fn test_exactly_one_result_per_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, mut rx) = mpsc::channel(4);
        probe(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            0,
            Duration::from_millis(1000),
            tx,
        )
        .await;

        assert!(rx.recv().await.is_some());
        // channel closed after the single send
        assert!(rx.recv().await.is_none());
    }
}
