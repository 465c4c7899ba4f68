//! Probe race coordination
//!
//! Launches probes for every candidate handed to it, consumes their results
//! as they complete, and settles on the first success. Each result is
//! recorded into the reachability cache as it is consumed; when a winner is
//! found early, a detached task keeps draining the channel so late results
//! still warm the cache.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::{CacheEntry, ReachabilityCache};
use crate::candidate::Candidate;
use crate::config::FastestAddrConfig;
use crate::probe::{self, ProbeFamily, ProbeOutcome, ProbeResult};

/// First successful probe of a race
#[derive(Debug, Clone, Copy)]
pub(crate) struct RaceWinner {
    pub ip: IpAddr,
    pub reply_idx: usize,
    pub latency_ms: u16,
    pub family: ProbeFamily,
}

/// Race every candidate's enabled probe families against each other
///
/// Returns the number of probes launched and the first success, if any.
/// Termination is bounded: every launched probe emits exactly one result
/// within its deadline, and the consumer reads at most `launched` of them.
pub(crate) async fn run(
    cache: &Arc<ReachabilityCache>,
    candidates: &[Candidate],
    config: &FastestAddrConfig,
) -> (usize, Option<RaceWinner>) {
    let allow_icmp = config.allow_icmp && probe::icmp::available();
    let allow_tcp = config.allow_tcp;

    let families = usize::from(allow_icmp) + usize::from(allow_tcp);
    let launched = candidates.len() * families;
    if launched == 0 {
        return (0, None);
    }

    // sized so no probe ever blocks on emit
    let (tx, mut rx) = mpsc::channel::<ProbeResult>(launched);

    for candidate in candidates {
        if allow_icmp {
            tokio::spawn(probe::icmp::probe(
                candidate.ip,
                candidate.reply_idx,
                config.probe_timeout,
                tx.clone(),
            ));
        }
        if allow_tcp {
            tokio::spawn(probe::tcp::probe(
                candidate.ip,
                config.tcp_port,
                candidate.reply_idx,
                config.probe_timeout,
                tx.clone(),
            ));
        }
    }
    drop(tx);

    for _ in 0..launched {
        let Some(result) = rx.recv().await else {
            break;
        };
        record(cache, &result);

        if let ProbeOutcome::Success { latency_ms } = result.outcome {
            let winner = RaceWinner {
                ip: result.ip,
                reply_idx: result.reply_idx,
                latency_ms,
                family: result.family,
            };

            // losers run to completion; cache their results in the background
            let cache = cache.clone();
            tokio::spawn(async move {
                while let Some(result) = rx.recv().await {
                    record(&cache, &result);
                }
            });

            return (launched, Some(winner));
        }
    }

    (launched, None)
}

fn record(cache: &ReachabilityCache, result: &ProbeResult) {
    match result.outcome {
        ProbeOutcome::Success { latency_ms } => {
            cache.put(result.ip, CacheEntry::reachable(latency_ms));
        }
        ProbeOutcome::Failure => {
            // one family failing must not erase fresh proof of reachability:
            // a host with ICMP filtered still answers on TCP, and its slow
            // echo timeout lands after the connect succeeded
            if cache.get(result.ip).map_or(true, |entry| !entry.reachable) {
                cache.put(result.ip, CacheEntry::unreachable());
            }
        }
    }
}
