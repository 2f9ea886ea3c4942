/*!
Flow-key matching: deciding whether a packet belongs to a task, and if so,
which bytes identify its flow for that task's counters.

Grounded on `flowkey.py` and `cerberus.py::find_flowkey`/`calculate_flowkey`.
*/

use serde::{Deserialize, Serialize};

use crate::cms::Operation;
use crate::packet::{FieldKey, Packet};

/// One positional slot in a condition row: `SrcIp`, `SrcPort`, `DstIp`,
/// `DstPort`, `Protocol`, in that fixed order (mirrors `key_table` in
/// `cerberus.py`). `None` means "don't care". Owns its bytes/prefix (rather
/// than borrowing `&'static str`) so the same type can deserialize a custom
/// `condition_key`/`defense_condition_key` straight out of JSON config
/// (`config.rs::TaskProfile::Custom`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Matcher {
    /// Exact byte match against an address or port field.
    ExactBytes(Vec<u8>),
    /// Prefix match against the protocol's tag string (the only field this
    /// applies to).
    ProtocolPrefix(String),
}

/// A single condition row: five optional matchers, positionally
/// `[src_ip, src_port, dst_ip, dst_port, protocol]`. A packet satisfies the
/// row iff every present matcher succeeds.
pub type ConditionRow = [Option<Matcher>; 5];

fn row_matches(row: &ConditionRow, p: &Packet) -> bool {
    let fields = [
        FieldKey::SrcIp,
        FieldKey::SrcPort,
        FieldKey::DstIp,
        FieldKey::DstPort,
    ];
    for (i, field) in fields.iter().enumerate() {
        match &row[i] {
            None => continue,
            Some(Matcher::ExactBytes(bytes)) => {
                if p.field_bytes(*field) != *bytes {
                    return false;
                }
            }
            Some(Matcher::ProtocolPrefix(_)) => unreachable!("protocol matcher only valid at index 4"),
        }
    }
    match &row[4] {
        None => true,
        Some(Matcher::ProtocolPrefix(prefix)) => p.protocol.matches_prefix(prefix),
        Some(Matcher::ExactBytes(_)) => unreachable!("field 4 is always a protocol matcher"),
    }
}

/// A disjunction of condition rows (a packet matches if *any* row matches),
/// the fields used to build this task's flow key, the CMS operation(s) to
/// apply, and the fixed per-packet value (`0` means "use the packet size").
pub struct FlowKeyDescriptor {
    pub conditions: Vec<ConditionRow>,
    pub task_key: Vec<FieldKey>,
    pub operations: Vec<Operation>,
    pub value: i64,
    /// `true` when this task's CMS is configured as a 2-bit Bloom filter
    /// rather than a counting sketch (excludes it from adaptive-memory
    /// resizing, matching `task_bf` in `cerberus.py::__init__`).
    pub is_bloom_filter: bool,
}

/// `None` if no row matches; otherwise the concatenated flow-key bytes for
/// `task_key`. Matches `cerberus.py::find_flowkey`.
pub fn find_flowkey(descriptor: &FlowKeyDescriptor, p: &Packet) -> Option<Vec<u8>> {
    find_flowkey_fields(&descriptor.conditions, &descriptor.task_key, p)
}

/// Same as [`find_flowkey`] but over raw condition rows and key fields,
/// for callers (defense profiles) that don't have a full
/// [`FlowKeyDescriptor`] on hand.
pub fn find_flowkey_fields(conditions: &[ConditionRow], task_key: &[FieldKey], p: &Packet) -> Option<Vec<u8>> {
    for row in conditions {
        if row_matches(row, p) {
            return Some(calculate_flowkey(task_key, p));
        }
    }
    None
}

/// Concatenate a packet's fields, in order, into one flow-key byte string.
/// Matches `cerberus.py::calculate_flowkey`.
pub fn calculate_flowkey(task_key: &[FieldKey], p: &Packet) -> Vec<u8> {
    let mut out = Vec::new();
    for key in task_key {
        out.extend(p.field_bytes(*key));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Protocol;

    #[test]
    fn icmp_flood_matches_any_icmp_variant() {
        let descriptor = FlowKeyDescriptor {
            conditions: vec![[None, None, None, None, Some(Matcher::ProtocolPrefix("ICMP".to_string()))]],
            task_key: vec![FieldKey::SrcIp, FieldKey::DstIp],
            operations: vec![Operation::Plus],
            value: 1,
            is_bloom_filter: false,
        };
        let p = Packet::new([1, 1, 1, 1], 0, [2, 2, 2, 2], 0, Protocol::IcmpRequest, 64, 0, 0);
        let key = find_flowkey(&descriptor, &p).unwrap();
        assert_eq!(key, vec![1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn non_matching_protocol_yields_none() {
        let descriptor = FlowKeyDescriptor {
            conditions: vec![[None, None, None, None, Some(Matcher::ProtocolPrefix("UDP".to_string()))]],
            task_key: vec![FieldKey::SrcIp, FieldKey::DstIp],
            operations: vec![Operation::Plus],
            value: 1,
            is_bloom_filter: false,
        };
        let p = Packet::new([1, 1, 1, 1], 0, [2, 2, 2, 2], 0, Protocol::Tcp, 64, 0, 0);
        assert!(find_flowkey(&descriptor, &p).is_none());
    }

    #[test]
    fn exact_port_match_selects_among_disjunct_rows() {
        let descriptor = FlowKeyDescriptor {
            conditions: vec![
                [None, None, None, Some(Matcher::ExactBytes(vec![0, 80])), Some(Matcher::ProtocolPrefix("TCP".to_string()))],
                [None, None, None, Some(Matcher::ExactBytes(vec![1, 187])), Some(Matcher::ProtocolPrefix("TCP".to_string()))],
            ],
            task_key: vec![FieldKey::SrcIp, FieldKey::DstIp],
            operations: vec![Operation::Plus],
            value: 1,
            is_bloom_filter: false,
        };
        let p = Packet::new([1, 1, 1, 1], 9999, [2, 2, 2, 2], 443, Protocol::Tcp, 64, 0, 0);
        assert!(find_flowkey(&descriptor, &p).is_some());
    }
}
