//! Engine configuration
//!
//! Defaults mirror the values the module has always shipped with: both probe
//! families enabled, TCP dialing port 80, a 1 MiB reachability cache, and
//! ten-minute entries.

use std::time::Duration;

/// Default reachability cache budget in bytes
pub const DEFAULT_CACHE_SIZE_BYTES: u32 = 1024 * 1024;

/// Default TTL for reachability entries, in seconds
pub const DEFAULT_TTL_SECS: u32 = 600;

/// Default port used by the TCP connect probe
pub const DEFAULT_TCP_PORT: u16 = 80;

/// Default per-probe deadline (ICMP echo and TCP connect)
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Configuration for the fastest-address engine
#[derive(Debug, Clone)]
pub struct FastestAddrConfig {
    /// Probe candidates with ICMP echo requests
    pub allow_icmp: bool,

    /// Probe candidates with TCP connection attempts
    pub allow_tcp: bool,

    /// Port the TCP connect probe dials
    pub tcp_port: u16,

    /// Memory budget for the reachability cache
    pub cache_size_bytes: u32,

    /// TTL for cached successful probes, in seconds
    pub ttl_secs: u32,

    /// TTL for cached failed probes, in seconds
    ///
    /// Failed probes are cached with the same TTL as successes by default;
    /// lower this to retry unreachable addresses sooner.
    pub failure_ttl_secs: u32,

    /// Deadline applied to every individual probe
    pub probe_timeout: Duration,
}

impl Default for FastestAddrConfig {
    fn default() -> Self {
        Self {
            allow_icmp: true,
            allow_tcp: true,
            tcp_port: DEFAULT_TCP_PORT,
            cache_size_bytes: DEFAULT_CACHE_SIZE_BYTES,
            ttl_secs: DEFAULT_TTL_SECS,
            failure_ttl_secs: DEFAULT_TTL_SECS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FastestAddrConfig::default();
        assert!(config.allow_icmp);
        assert!(config.allow_tcp);
        assert_eq!(config.tcp_port, 80);
        assert_eq!(config.cache_size_bytes, 1024 * 1024);
        assert_eq!(config.ttl_secs, 600);
        assert_eq!(config.failure_ttl_secs, 600);
        assert_eq!(config.probe_timeout, Duration::from_millis(1000));
    }
}
