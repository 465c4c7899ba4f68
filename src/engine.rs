//! Fastest-address selection driver
//!
//! Queries every upstream in parallel, checks the reachability cache for
//! each candidate address, races probes for the rest, and rewrites the
//! winning response so it carries only the fastest address.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hickory_proto::op::Message;
use hickory_proto::rr::RData;

use crate::cache::{canonical_ip, ReachabilityCache};
use crate::candidate::{extract_candidates, Candidate};
use crate::config::FastestAddrConfig;
use crate::error::Result;
use crate::race::{self, RaceWinner};
use crate::upstream::{exchange_all, ExchangeResult, Upstream};

/// A selected address together with the response it came from
#[derive(Debug, Clone, Copy)]
struct Winner {
    ip: IpAddr,
    reply_idx: usize,
    latency_ms: u16,
}

/// Fastest-address selection engine
///
/// Construct once and share; the reachability cache inside is the only
/// state carried across queries.
pub struct FastestAddr {
    config: FastestAddrConfig,
    cache: Arc<ReachabilityCache>,
    probes_launched: AtomicUsize,
}

impl FastestAddr {
    /// Create an engine with the given configuration
    pub fn new(config: FastestAddrConfig) -> Self {
        let cache = Arc::new(ReachabilityCache::new(
            config.cache_size_bytes,
            config.ttl_secs,
            config.failure_ttl_secs,
        ));
        Self {
            config,
            cache,
            probes_launched: AtomicUsize::new(0),
        }
    }

    /// The engine's reachability cache
    pub fn cache(&self) -> &ReachabilityCache {
        &self.cache
    }

    /// Total probes launched over the engine's lifetime
    pub fn probes_launched(&self) -> usize {
        self.probes_launched.load(Ordering::Relaxed)
    }

    /// Resolve a query through all upstreams and answer with the response
    /// that carries the fastest reachable address
    ///
    /// Cached observations decide without probing when they cover every
    /// candidate; otherwise the uncovered candidates are probed and the
    /// cached and probed winners compete on latency. Errors only when no
    /// upstream responded; every lower-level failure degrades to returning
    /// the first upstream response unchanged.
    pub async fn exchange_fastest(
        &self,
        request: &Message,
        upstreams: &[Arc<dyn Upstream>],
    ) -> Result<(Message, Arc<dyn Upstream>)> {
        let replies = exchange_all(upstreams, request).await?;

        let host = request
            .queries()
            .first()
            .map(|q| q.name().to_string().to_lowercase())
            .unwrap_or_default();

        let candidates = extract_candidates(&replies);
        if candidates.len() <= 1 {
            return Ok(first_reply(&replies));
        }

        // cache-only pass: count hits and remember the fastest fresh success
        let mut n_cached = 0;
        let mut cached: Option<Winner> = None;
        let mut uncached: Vec<Candidate> = Vec::new();

        for candidate in &candidates {
            match self.cache.get(candidate.ip) {
                Some(entry) => {
                    n_cached += 1;
                    if entry.reachable
                        && cached.map_or(true, |best| entry.latency_ms < best.latency_ms)
                    {
                        cached = Some(Winner {
                            ip: candidate.ip,
                            reply_idx: candidate.reply_idx,
                            latency_ms: entry.latency_ms,
                        });
                    }
                }
                None => uncached.push(*candidate),
            }
        }

        if n_cached == candidates.len() {
            if let Some(winner) = cached {
                log::debug!(
                    "{}: using {} as the fastest address (cached, {} ms)",
                    host,
                    winner.ip,
                    winner.latency_ms
                );
                return Ok(rewrite(&replies, winner));
            }
        }

        let (launched, raced) = race::run(&self.cache, &uncached, &self.config).await;
        self.probes_launched.fetch_add(launched, Ordering::Relaxed);

        match pick_winner(cached, raced) {
            Some(winner) => {
                log::debug!(
                    "{}: using {} as the fastest address ({} ms)",
                    host,
                    winner.ip,
                    winner.latency_ms
                );
                Ok(rewrite(&replies, winner))
            }
            None => Ok(first_reply(&replies)),
        }
    }
}

fn first_reply(replies: &[ExchangeResult]) -> (Message, Arc<dyn Upstream>) {
    (replies[0].reply.clone(), replies[0].upstream.clone())
}

fn rewrite(replies: &[ExchangeResult], winner: Winner) -> (Message, Arc<dyn Upstream>) {
    let result = &replies[winner.reply_idx];
    (
        prepare_reply(&result.reply, winner.ip),
        result.upstream.clone(),
    )
}

/// Choose between the cached and the probed winner on latency; ties go to
/// the probe, which is the fresher observation
fn pick_winner(cached: Option<Winner>, raced: Option<RaceWinner>) -> Option<Winner> {
    let raced = raced.map(|r| {
        log::debug!(
            "{} answered first ({} probe, {} ms)",
            r.ip,
            r.family.as_str(),
            r.latency_ms
        );
        Winner {
            ip: r.ip,
            reply_idx: r.reply_idx,
            latency_ms: r.latency_ms,
        }
    });

    match (cached, raced) {
        (Some(c), Some(r)) => Some(if c.latency_ms < r.latency_ms { c } else { r }),
        (Some(c), None) => Some(c),
        (None, r) => r,
    }
}

/// Strip the Answer section down to the winning address
///
/// A/AAAA records that do not match the winner are removed. Header fields,
/// the Question section, non-address answers, and the authority and
/// additional sections are carried over untouched.
fn prepare_reply(response: &Message, winner: IpAddr) -> Message {
    let winner = canonical_ip(winner);

    let mut reply = Message::new();
    reply.set_id(response.id());
    reply.set_message_type(response.message_type());
    reply.set_op_code(response.op_code());
    reply.set_authoritative(response.authoritative());
    reply.set_truncated(response.truncated());
    reply.set_recursion_desired(response.recursion_desired());
    reply.set_recursion_available(response.recursion_available());
    reply.set_authentic_data(response.authentic_data());
    reply.set_checking_disabled(response.checking_disabled());
    reply.set_response_code(response.response_code());

    for query in response.queries() {
        reply.add_query(query.clone());
    }

    for answer in response.answers() {
        let keep = match answer.data() {
            RData::A(a) => canonical_ip(IpAddr::V4(a.0)) == winner,
            RData::AAAA(aaaa) => canonical_ip(IpAddr::V6(aaaa.0)) == winner,
            _ => true,
        };
        if keep {
            reply.add_answer(answer.clone());
        }
    }

    for record in response.name_servers() {
        reply.add_name_server(record.clone());
    }
    for record in response.additionals() {
        reply.add_additional(record.clone());
    }

    reply
}
