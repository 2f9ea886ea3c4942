/*!
The 16 built-in attack profiles. Each profile is really a pair of
descriptors that share a `defense_no` but serve different purposes: the
flow-key descriptor decides whether a packet feeds this task's counters
(and with which key), while the defense descriptor decides, independently,
whether *this flow* should be checked against the blocklist threshold.

The two sides intentionally key flows differently for some profiles — e.g.
DNS amplification counts by `(src_ip, src_port, dst_ip, dst_port)` on the
flow-key side but checks the threshold by `(dst_ip, dst_port, src_ip,
src_port)` on the defense side, because the attacker spoofs the victim as
the DNS query's source and the real amplification target is the
responses' destination. Preserve these field orders exactly.

Grounded on `flowkey.py::Flowkey` and `defense.py::Defense`.
*/

use crate::cms::Operation;
use crate::error::{CerberusError, Result};
use crate::flowkey::{ConditionRow, FlowKeyDescriptor, Matcher};
use crate::packet::FieldKey;

/// Highest valid `defense_no` (there are 16 built-in profiles, 0 through 15).
pub const MAX_DEFENSE_NO: u32 = 15;

/// The non-functional suggested response for a defense profile. The
/// reference carries `if_action`/`else_action` strings but never acts on
/// them (`update_task` only ever produces a blocklist *request*, which the
/// caller turns into a block); kept here purely as descriptive metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestedAction {
    Pass,
    RateLimit,
    Drop,
    Puzzle,
}

pub struct DefenseDescriptor {
    pub conditions: Vec<ConditionRow>,
    pub task_key: Vec<FieldKey>,
    pub threshold: i64,
    pub if_over_threshold: SuggestedAction,
    pub if_under_threshold: SuggestedAction,
}

/// Build a condition row. Every built-in profile leaves `src_ip`/`dst_ip`
/// as wildcards; only port and protocol narrow the match.
fn row(src_port: Option<u16>, dst_port: Option<u16>, protocol: Option<&'static str>) -> ConditionRow {
    [
        None,
        src_port.map(|p| Matcher::ExactBytes(p.to_be_bytes().to_vec())),
        None,
        dst_port.map(|p| Matcher::ExactBytes(p.to_be_bytes().to_vec())),
        protocol.map(|p| Matcher::ProtocolPrefix(p.to_string())),
    ]
}

/// `defense_no` 0 through 15. An out-of-range id is a configuration error,
/// not a programmer error — `defense_no` comes from untrusted JSON config.
pub fn flowkey_profile(defense_no: u32) -> Result<FlowKeyDescriptor> {
    use FieldKey::*;
    Ok(match defense_no {
        0 => FlowKeyDescriptor {
            conditions: vec![row(None, None, None)],
            task_key: vec![SrcIp, DstIp],
            operations: vec![Operation::Plus],
            value: 1,
            is_bloom_filter: false,
        },
        1 => FlowKeyDescriptor {
            conditions: vec![row(None, None, Some("ICMP"))],
            task_key: vec![SrcIp, DstIp],
            operations: vec![Operation::Plus],
            value: 1,
            is_bloom_filter: false,
        },
        2 => FlowKeyDescriptor {
            conditions: vec![row(None, None, Some("ICMP_request"))],
            task_key: vec![SrcIp, DstIp],
            operations: vec![Operation::SetBitFalse],
            value: 1,
            is_bloom_filter: true,
        },
        3 => FlowKeyDescriptor {
            conditions: vec![row(None, None, None)],
            task_key: vec![SrcIp, DstIp],
            operations: vec![Operation::Plus],
            value: 0,
            is_bloom_filter: false,
        },
        4 => FlowKeyDescriptor {
            conditions: vec![row(None, Some(53), None)],
            task_key: vec![SrcIp, SrcPort, DstIp, DstPort],
            operations: vec![Operation::SetBitFalse],
            value: 1,
            is_bloom_filter: true,
        },
        5 => FlowKeyDescriptor {
            conditions: vec![row(None, None, Some("UDP"))],
            task_key: vec![SrcIp, DstIp],
            operations: vec![Operation::Plus],
            value: 1,
            is_bloom_filter: false,
        },
        6 => FlowKeyDescriptor {
            conditions: vec![row(None, Some(53), None)],
            task_key: vec![SrcIp, DstIp],
            operations: vec![Operation::Plus],
            value: 1,
            is_bloom_filter: false,
        },
        7 => FlowKeyDescriptor {
            conditions: vec![row(None, Some(123), None)],
            task_key: vec![SrcIp, SrcPort, DstIp, DstPort],
            operations: vec![Operation::SetBitFalse],
            value: 1,
            is_bloom_filter: true,
        },
        8 => FlowKeyDescriptor {
            conditions: vec![row(None, Some(1900), None)],
            task_key: vec![SrcIp, SrcPort, DstIp, DstPort],
            operations: vec![Operation::SetBitFalse],
            value: 1,
            is_bloom_filter: true,
        },
        9 => FlowKeyDescriptor {
            conditions: vec![row(None, Some(11211), None)],
            task_key: vec![SrcIp, SrcPort, DstIp, DstPort],
            operations: vec![Operation::SetBitFalse],
            value: 1,
            is_bloom_filter: true,
        },
        10 => FlowKeyDescriptor {
            conditions: vec![
                row(None, Some(80), Some("UDP")),
                row(None, Some(443), Some("UDP")),
            ],
            task_key: vec![SrcIp, SrcPort, DstIp, DstPort],
            operations: vec![Operation::SetBitFalse],
            value: 1,
            is_bloom_filter: true,
        },
        11 => FlowKeyDescriptor {
            conditions: vec![
                row(None, Some(80), Some("TCP")),
                row(None, Some(443), Some("TCP")),
            ],
            task_key: vec![SrcIp, DstIp],
            operations: vec![Operation::Plus],
            value: 1,
            is_bloom_filter: false,
        },
        12 => FlowKeyDescriptor {
            conditions: vec![
                row(None, Some(80), Some("TCP_SYN")),
                row(None, Some(443), Some("TCP_SYN")),
            ],
            task_key: vec![SrcIp, DstIp],
            operations: vec![Operation::Plus],
            value: 1,
            is_bloom_filter: false,
        },
        13 => FlowKeyDescriptor {
            conditions: vec![row(None, None, Some("TCP_SYN"))],
            task_key: vec![SrcIp, DstIp],
            operations: vec![Operation::Plus],
            value: 1,
            is_bloom_filter: false,
        },
        14 => FlowKeyDescriptor {
            conditions: vec![row(None, None, Some("TCP_SYN"))],
            task_key: vec![SrcIp, SrcPort, DstIp, DstPort, ProtocolByte],
            operations: vec![Operation::SetBitFalse],
            value: 1,
            is_bloom_filter: true,
        },
        15 => FlowKeyDescriptor {
            conditions: vec![row(None, None, Some("TCP_SYN"))],
            task_key: vec![SrcIp, SrcPort, DstIp, DstPort, ProtocolByte],
            operations: vec![Operation::SetBitFalse],
            value: 1,
            is_bloom_filter: true,
        },
        other => {
            return Err(CerberusError::Config(format!(
                "defense_no {other} is out of range (must be 0..={MAX_DEFENSE_NO})"
            )))
        }
    })
}

pub fn defense_profile(defense_no: u32) -> Result<DefenseDescriptor> {
    use FieldKey::*;
    use SuggestedAction::*;
    Ok(match defense_no {
        0 => DefenseDescriptor {
            conditions: vec![row(None, None, Some("ASDF"))],
            task_key: vec![SrcIp, DstIp],
            threshold: 0,
            if_over_threshold: Pass,
            if_under_threshold: Pass,
        },
        1 => DefenseDescriptor {
            conditions: vec![row(None, None, Some("ICMP"))],
            task_key: vec![SrcIp, DstIp],
            threshold: 400,
            if_over_threshold: RateLimit,
            if_under_threshold: Pass,
        },
        2 => DefenseDescriptor {
            conditions: vec![row(None, None, Some("ICMP_reply"))],
            task_key: vec![DstIp, SrcIp],
            threshold: 1,
            if_over_threshold: Pass,
            if_under_threshold: Drop,
        },
        3 => DefenseDescriptor {
            conditions: vec![row(None, None, None)],
            task_key: vec![SrcIp, DstIp],
            threshold: 46080,
            if_over_threshold: Drop,
            if_under_threshold: Pass,
        },
        4 => DefenseDescriptor {
            conditions: vec![row(Some(53), None, None)],
            task_key: vec![DstIp, DstPort, SrcIp, SrcPort],
            threshold: 1,
            if_over_threshold: Pass,
            if_under_threshold: Drop,
        },
        5 => DefenseDescriptor {
            conditions: vec![row(None, None, Some("UDP"))],
            task_key: vec![SrcIp, DstIp],
            threshold: 400,
            if_over_threshold: RateLimit,
            if_under_threshold: Pass,
        },
        6 => DefenseDescriptor {
            conditions: vec![row(None, Some(53), None)],
            task_key: vec![SrcIp, DstIp],
            threshold: 150,
            if_over_threshold: RateLimit,
            if_under_threshold: Pass,
        },
        7 => DefenseDescriptor {
            conditions: vec![row(Some(123), None, None)],
            task_key: vec![DstIp, DstPort, SrcIp, SrcPort],
            threshold: 1,
            if_over_threshold: Pass,
            if_under_threshold: Drop,
        },
        8 => DefenseDescriptor {
            conditions: vec![row(Some(1900), None, None)],
            task_key: vec![DstIp, DstPort, SrcIp, SrcPort],
            threshold: 1,
            if_over_threshold: Pass,
            if_under_threshold: Drop,
        },
        9 => DefenseDescriptor {
            conditions: vec![row(Some(11211), None, None)],
            task_key: vec![DstIp, DstPort, SrcIp, SrcPort],
            threshold: 1,
            if_over_threshold: Pass,
            if_under_threshold: Drop,
        },
        10 => DefenseDescriptor {
            conditions: vec![
                row(Some(80), None, Some("UDP")),
                row(Some(443), None, Some("UDP")),
            ],
            task_key: vec![DstIp, DstPort, SrcIp, SrcPort],
            threshold: 1,
            if_over_threshold: Pass,
            if_under_threshold: Drop,
        },
        11 => DefenseDescriptor {
            conditions: vec![
                row(None, Some(80), Some("TCP")),
                row(None, Some(443), Some("TCP")),
            ],
            task_key: vec![SrcIp, DstIp],
            threshold: 150,
            if_over_threshold: Puzzle,
            if_under_threshold: Pass,
        },
        12 => DefenseDescriptor {
            conditions: vec![
                row(None, Some(80), Some("TCP_SYN")),
                row(None, Some(443), Some("TCP_SYN")),
            ],
            task_key: vec![SrcIp, DstIp],
            threshold: 400,
            if_over_threshold: Drop,
            if_under_threshold: Pass,
        },
        13 => DefenseDescriptor {
            conditions: vec![row(None, None, Some("TCP_SYN"))],
            task_key: vec![SrcIp, DstIp],
            threshold: 400,
            if_over_threshold: Drop,
            if_under_threshold: Pass,
        },
        14 => DefenseDescriptor {
            conditions: vec![row(None, None, Some("TCP_ACK"))],
            task_key: vec![SrcIp, SrcPort, DstIp, DstPort, ProtocolByte],
            threshold: 1,
            if_over_threshold: Pass,
            if_under_threshold: Drop,
        },
        15 => DefenseDescriptor {
            conditions: vec![
                row(None, None, Some("TCP_RST")),
                row(None, None, Some("TCP_FIN")),
            ],
            task_key: vec![SrcIp, SrcPort, DstIp, DstPort, ProtocolByte],
            threshold: 1,
            if_over_threshold: Pass,
            if_under_threshold: Drop,
        },
        other => {
            return Err(CerberusError::Config(format!(
                "defense_no {other} is out of range (must be 0..={MAX_DEFENSE_NO})"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_amplification_keys_differ_between_flow_and_defense_side() {
        let fk = flowkey_profile(4).unwrap();
        let df = defense_profile(4).unwrap();
        assert_eq!(fk.task_key, vec![FieldKey::SrcIp, FieldKey::SrcPort, FieldKey::DstIp, FieldKey::DstPort]);
        assert_eq!(df.task_key, vec![FieldKey::DstIp, FieldKey::DstPort, FieldKey::SrcIp, FieldKey::SrcPort]);
    }

    #[test]
    fn all_profiles_are_constructible() {
        for n in 0..16 {
            assert!(flowkey_profile(n).is_ok());
            assert!(defense_profile(n).is_ok());
        }
    }

    #[test]
    fn out_of_range_defense_no_is_a_config_error() {
        assert!(flowkey_profile(16).is_err());
        assert!(defense_profile(16).is_err());
    }
}
