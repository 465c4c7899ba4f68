//! Upstream resolver contracts
//!
//! The engine talks to upstream DNS servers through the [`Upstream`] trait
//! and gathers their answers with [`exchange_all`], which queries every
//! upstream in parallel and keeps every successful response. A plain UDP
//! transport is provided; richer transports implement the trait outside
//! this crate.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Default exchange timeout for the UDP transport
const UDP_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum UDP DNS response size
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// An upstream DNS resolver
#[async_trait]
pub trait Upstream: Send + Sync + std::fmt::Debug {
    /// Send a request and await the response
    async fn exchange(&self, request: &Message) -> Result<Message>;

    /// Human-readable address of this upstream, for logs
    fn address(&self) -> String;
}

/// One successful upstream response together with the upstream it came from
#[derive(Debug)]
pub struct ExchangeResult {
    /// The response message
    pub reply: Message,
    /// The upstream that produced it
    pub upstream: Arc<dyn Upstream>,
}

/// Query every upstream in parallel and collect all successful responses
///
/// Results are returned in upstream order. Errors only when no upstream
/// produced a response; at least one success means `Ok` with that response
/// included.
pub async fn exchange_all(
    upstreams: &[Arc<dyn Upstream>],
    request: &Message,
) -> Result<Vec<ExchangeResult>> {
    if upstreams.is_empty() {
        return Err(Error::Upstream("no upstreams configured".into()));
    }

    let (tx, mut rx) = mpsc::channel::<(usize, Result<Message>)>(upstreams.len());

    for (idx, upstream) in upstreams.iter().enumerate() {
        let upstream = upstream.clone();
        let request = request.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let result = upstream.exchange(&request).await;
            let _ = tx.send((idx, result)).await;
        });
    }

    // close the channel once every task has reported
    drop(tx);

    let mut replies = Vec::new();
    let mut errors = Vec::new();

    while let Some((idx, result)) = rx.recv().await {
        match result {
            Ok(reply) => replies.push((idx, reply)),
            Err(e) => {
                log::debug!("upstream {} failed: {}", upstreams[idx].address(), e);
                errors.push(e);
            }
        }
    }

    if replies.is_empty() {
        return Err(Error::Upstream(format!(
            "all {} upstreams failed: {}",
            errors.len(),
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        )));
    }

    replies.sort_by_key(|(idx, _)| *idx);

    Ok(replies
        .into_iter()
        .map(|(idx, reply)| ExchangeResult {
            reply,
            upstream: upstreams[idx].clone(),
        })
        .collect())
}

/// Plain UDP upstream transport
#[derive(Debug)]
pub struct UdpUpstream {
    addr: SocketAddr,
    timeout: Duration,
}

impl UdpUpstream {
    /// Create a UDP upstream with the default timeout
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: UDP_TIMEOUT,
        }
    }

    /// Create a UDP upstream with a custom exchange timeout
    pub fn with_timeout(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }
}

#[async_trait]
impl Upstream for UdpUpstream {
    async fn exchange(&self, request: &Message) -> Result<Message> {
        let query = request
            .to_vec()
            .map_err(|e| Error::Dns(format!("failed to encode DNS query: {}", e)))?;

        // bind the unspecified address of the matching family
        let bind_addr = if self.addr.is_ipv6() {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
        } else {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        socket.send_to(&query, self.addr).await?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let (len, _) = tokio::time::timeout(self.timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| Error::Upstream(format!("{}: query timed out", self.addr)))??;
        buf.truncate(len);

        Message::from_vec(&buf).map_err(|e| Error::Dns(format!("invalid DNS response: {}", e)))
    }

    fn address(&self) -> String {
        self.addr.to_string()
    }
}
