//! Candidate address extraction
//!
//! Walks a set of upstream responses and enumerates every A and AAAA record
//! as a probe candidate, remembering which response each address came from.

use std::net::IpAddr;

use hickory_proto::rr::RData;

use crate::cache::canonical_ip;
use crate::upstream::ExchangeResult;

/// An address pulled from an upstream response, eligible for probing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Candidate {
    /// Canonical candidate address (v4-mapped forms normalized to IPv4)
    pub ip: IpAddr,
    /// Index of the response this address came from
    pub reply_idx: usize,
}

/// Enumerate every A/AAAA record across all responses, in response order
/// then answer order. Non-address records are skipped.
pub(crate) fn extract_candidates(replies: &[ExchangeResult]) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for (reply_idx, result) in replies.iter().enumerate() {
        for answer in result.reply.answers() {
            let ip = match answer.data() {
                RData::A(a) => IpAddr::V4(a.0),
                RData::AAAA(aaaa) => IpAddr::V6(aaaa.0),
                _ => continue,
            };
            candidates.push(Candidate {
                ip: canonical_ip(ip),
                reply_idx,
            });
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{Upstream, UdpUpstream};
    use hickory_proto::op::{Message, MessageType};
    use hickory_proto::rr::rdata::{A, AAAA, CNAME};
    use hickory_proto::rr::{Name, Record};
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::str::FromStr;
    use std::sync::Arc;

    fn make_result(records: Vec<Record>) -> ExchangeResult {
        let mut reply = Message::new();
        reply.set_message_type(MessageType::Response);
        for record in records {
            reply.add_answer(record);
        }
        let upstream: Arc<dyn Upstream> = Arc::new(UdpUpstream::new("127.0.0.1:53".parse().unwrap()));
        ExchangeResult { reply, upstream }
    }

    fn name() -> Name {
        Name::from_str("example.com.").unwrap()
    }

    fn a_record(ip: Ipv4Addr) -> Record {
        Record::from_rdata(name(), 300, RData::A(A(ip)))
    }

    fn aaaa_record(ip: Ipv6Addr) -> Record {
        Record::from_rdata(name(), 300, RData::AAAA(AAAA(ip)))
    }

    #[test]
    fn test_extraction_order() {
        let replies = vec![
            make_result(vec![
                a_record(Ipv4Addr::new(1, 1, 1, 1)),
                a_record(Ipv4Addr::new(2, 2, 2, 2)),
            ]),
            make_result(vec![aaaa_record(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1))]),
        ];

        let candidates = extract_candidates(&replies);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].ip, IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)));
        assert_eq!(candidates[0].reply_idx, 0);
        assert_eq!(candidates[1].ip, IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)));
        assert_eq!(candidates[2].reply_idx, 1);
    }

    #[test]
    fn test_non_address_records_skipped() {
        let cname = Record::from_rdata(
            name(),
            300,
            RData::CNAME(CNAME(Name::from_str("alias.example.com.").unwrap())),
        );
        let replies = vec![make_result(vec![cname, a_record(Ipv4Addr::new(1, 2, 3, 4))])];

        let candidates = extract_candidates(&replies);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].ip, IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_v4_mapped_aaaa_normalized() {
        let mapped = Ipv4Addr::new(9, 9, 9, 9).to_ipv6_mapped();
        let replies = vec![make_result(vec![aaaa_record(mapped)])];

        let candidates = extract_candidates(&replies);
        assert_eq!(candidates[0].ip, IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)));
    }

    #[test]
    fn test_empty_responses() {
        let replies = vec![make_result(vec![])];
        assert!(extract_candidates(&replies).is_empty());
    }
}
