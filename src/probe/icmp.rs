//! ICMP echo probe
//!
//! Sends a single echo request and waits for the matching reply. Raw
//! sockets are tried first, then unprivileged ICMP datagram sockets; when
//! neither can be created the probe reports failure and the race carries
//! on with TCP. The blocking socket work runs on the blocking thread pool
//! so the latency window covers only the echo exchange itself.

use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::sync::mpsc;

use super::{clamp_latency_ms, ProbeFamily, ProbeOutcome, ProbeResult};

/// Whether this process can create ICMP sockets at all
///
/// Checked once; when unavailable the engine skips launching echo probes
/// and races on TCP alone.
pub(crate) fn available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        let ok = open_socket(Domain::IPV4, Protocol::ICMPV4).is_ok();
        if !ok {
            log::info!("icmp echo sockets unavailable, races will use tcp connect only");
        }
        ok
    })
}

/// Probe one candidate with a single echo request, emitting exactly one
/// result on `tx`
pub(crate) async fn probe(
    ip: IpAddr,
    reply_idx: usize,
    timeout: Duration,
    tx: mpsc::Sender<ProbeResult>,
) {
    log::debug!("sending icmp echo to {}", ip);

    let outcome = match tokio::task::spawn_blocking(move || echo(ip, timeout)).await {
        Ok(Ok(latency_ms)) => ProbeOutcome::Success { latency_ms },
        Ok(Err(e)) => {
            log::debug!("icmp echo to {} failed: {}", ip, e);
            ProbeOutcome::Failure
        }
        Err(e) => {
            log::debug!("icmp echo task for {} failed: {}", ip, e);
            ProbeOutcome::Failure
        }
    };

    let _ = tx
        .send(ProbeResult {
            ip,
            reply_idx,
            family: ProbeFamily::Icmp,
            outcome,
        })
        .await;
}

/// Try a raw socket first, then the unprivileged datagram flavor
fn open_socket(domain: Domain, protocol: Protocol) -> io::Result<Socket> {
    Socket::new(domain, Type::RAW, Some(protocol))
        .or_else(|_| Socket::new(domain, Type::DGRAM, Some(protocol)))
}

/// Blocking echo exchange; returns the round-trip latency in milliseconds
fn echo(ip: IpAddr, timeout: Duration) -> io::Result<u16> {
    let (domain, protocol) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
    };

    let socket = open_socket(domain, protocol)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.set_write_timeout(Some(timeout))?;
    socket.connect(&SocketAddr::new(ip, 0).into())?;

    let identifier: u16 = rand::random();
    let sequence: u16 = 1;
    let packet = match ip {
        IpAddr::V4(_) => echo_request(ECHO_REQUEST_V4, identifier, sequence, true),
        IpAddr::V6(_) => echo_request(ECHO_REQUEST_V6, identifier, sequence, false),
    };

    let start = Instant::now();
    socket.send(&packet)?;

    // consume replies until ours shows up or the deadline passes
    loop {
        let mut buf = [MaybeUninit::<u8>::uninit(); 512];
        let len = socket.recv(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut {
                io::Error::new(io::ErrorKind::TimedOut, "no echo reply")
            } else {
                e
            }
        })?;
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no echo reply"));
        }

        // SAFETY: recv initialized the first `len` bytes
        let data: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };

        if is_matching_reply(ip, data, identifier, sequence) {
            return Ok(clamp_latency_ms(elapsed));
        }
    }
}

const ECHO_REQUEST_V4: u8 = 8;
const ECHO_REPLY_V4: u8 = 0;
const ECHO_REQUEST_V6: u8 = 128;
const ECHO_REPLY_V6: u8 = 129;

/// Build an echo request: 8-byte header plus a zeroed payload
///
/// The ICMPv6 checksum is filled in by the kernel, so it is only computed
/// for IPv4.
fn echo_request(msg_type: u8, identifier: u16, sequence: u16, checksummed: bool) -> Vec<u8> {
    let mut packet = vec![0u8; 64];
    packet[0] = msg_type;
    packet[1] = 0;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    if checksummed {
        let checksum = icmp_checksum(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    }

    packet
}

/// Check a received datagram for our echo reply
///
/// Raw IPv4 sockets hand back the IP header as well; datagram sockets
/// deliver the bare ICMP message.
fn is_matching_reply(ip: IpAddr, data: &[u8], identifier: u16, sequence: u16) -> bool {
    let (offset, reply_type) = match ip {
        IpAddr::V4(_) => {
            let offset = if data.first().map(|b| b >> 4) == Some(4) {
                20
            } else {
                0
            };
            (offset, ECHO_REPLY_V4)
        }
        IpAddr::V6(_) => (0, ECHO_REPLY_V6),
    };

    if data.len() < offset + 8 {
        return false;
    }
    data[offset] == reply_type
        && u16::from_be_bytes([data[offset + 4], data[offset + 5]]) == identifier
        && u16::from_be_bytes([data[offset + 6], data[offset + 7]]) == sequence
}

/// RFC 1071 internet checksum
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let Some(&b) = chunks.remainder().first() {
        sum += u32::from(b) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_echo_request_layout() {
        let packet = echo_request(ECHO_REQUEST_V4, 0x1234, 0x0001, true);
        assert_eq!(packet.len(), 64);
        assert_eq!(packet[0], 8);
        assert_eq!(packet[1], 0);
        assert_eq!(&packet[4..6], &[0x12, 0x34]);
        assert_eq!(&packet[6..8], &[0x00, 0x01]);
        assert_ne!(u16::from_be_bytes([packet[2], packet[3]]), 0);
    }

    #[test]
    fn test_checksum_validates_to_zero() {
        // summing a packet over its own checksum folds to 0xffff
        let packet = echo_request(ECHO_REQUEST_V4, 0xbeef, 7, true);
        let mut sum: u32 = 0;
        for chunk in packet.chunks_exact(2) {
            sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
        }
        while sum >> 16 != 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        assert_eq!(sum, 0xffff);
    }

    #[test]
    fn test_v6_request_leaves_checksum_to_kernel() {
        let packet = echo_request(ECHO_REQUEST_V6, 1, 1, false);
        assert_eq!(packet[0], 128);
        assert_eq!(&packet[2..4], &[0, 0]);
    }

    #[test]
    fn test_reply_matching() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut reply = vec![0u8; 8];
        reply[0] = ECHO_REPLY_V4;
        reply[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
        reply[6..8].copy_from_slice(&0x0001u16.to_be_bytes());

        assert!(is_matching_reply(ip, &reply, 0x1234, 0x0001));
        assert!(!is_matching_reply(ip, &reply, 0x4321, 0x0001));

        // wrong message type
        reply[0] = ECHO_REQUEST_V4;
        assert!(!is_matching_reply(ip, &reply, 0x1234, 0x0001));
    }

    #[test]
    fn test_reply_matching_skips_ip_header() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut datagram = vec![0u8; 28];
        datagram[0] = 0x45; // IPv4, 20-byte header
        datagram[20] = ECHO_REPLY_V4;
        datagram[24..26].copy_from_slice(&7u16.to_be_bytes());
        datagram[26..28].copy_from_slice(&1u16.to_be_bytes());

        assert!(is_matching_reply(ip, &datagram, 7, 1));
    }

    #[test]
    fn test_truncated_reply_ignored() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(!is_matching_reply(ip, &[0u8; 4], 1, 1));
        assert!(!is_matching_reply(ip, &[], 1, 1));
    }
}
