/*!
Packet representation used by the matching engine: fixed-width address and
port fields plus a protocol tag carrying enough detail (SYN/ACK/request vs.
reply) for defense profiles that key off TCP flags or ICMP message type.

Grounded on `packet/packet.py::Packet`.
*/

use serde::{Deserialize, Serialize};

/// A protocol tag. Variants beyond the three wire protocols (`Icmp`, `Tcp`,
/// `Udp`) exist so flow-key/defense profiles can match on TCP flags or ICMP
/// message type without a separate field — the reference encodes this the
/// same way, by storing a more specific protocol *string* per packet
/// (`"TCP_SYN"`, `"ICMP_request"`, ...) and prefix-matching against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Icmp,
    IcmpRequest,
    IcmpReply,
    Tcp,
    TcpSyn,
    TcpSynAck,
    TcpAck,
    TcpFin,
    TcpRst,
    Udp,
}

impl Protocol {
    /// The tag string the reference would have stored, used for the
    /// `str.startswith` style prefix matches in flow-key conditions.
    fn tag(self) -> &'static str {
        match self {
            Protocol::Icmp => "ICMP",
            Protocol::IcmpRequest => "ICMP_request",
            Protocol::IcmpReply => "ICMP_reply",
            Protocol::Tcp => "TCP",
            Protocol::TcpSyn => "TCP_SYN",
            Protocol::TcpSynAck => "TCP_SYNACK",
            Protocol::TcpAck => "TCP_ACK",
            Protocol::TcpFin => "TCP_FIN",
            Protocol::TcpRst => "TCP_RST",
            Protocol::Udp => "UDP",
        }
    }

    pub fn matches_prefix(self, prefix: &str) -> bool {
        self.tag().starts_with(prefix)
    }

    /// IANA protocol number, truncated to a single byte the way
    /// `Packet.protocol_byte` does.
    pub fn protocol_byte(self) -> u8 {
        match self {
            Protocol::Icmp | Protocol::IcmpRequest | Protocol::IcmpReply => 1,
            Protocol::Tcp | Protocol::TcpSyn | Protocol::TcpSynAck | Protocol::TcpAck | Protocol::TcpFin | Protocol::TcpRst => 6,
            Protocol::Udp => 17,
        }
    }
}

/// Which field a flow-key or defense-condition entry reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKey {
    SrcIp,
    SrcPort,
    DstIp,
    DstPort,
    ProtocolByte,
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub src_ip: [u8; 4],
    pub src_port: [u8; 2],
    pub dst_ip: [u8; 4],
    pub dst_port: [u8; 2],
    pub protocol: Protocol,
    pub packet_size: u32,
    /// Subtick this packet arrived on.
    pub tick: u64,
    /// Ground-truth attack label (`0` for benign, `1..=15` matching a
    /// `defense_no`), carried purely for evaluation — the core never reads
    /// this field itself. Mirrors `packet.py::Packet.attack_type`.
    pub attack_label: u32,
}

impl Packet {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        src_ip: [u8; 4],
        src_port: u16,
        dst_ip: [u8; 4],
        dst_port: u16,
        protocol: Protocol,
        packet_size: u32,
        tick: u64,
        attack_label: u32,
    ) -> Self {
        Self {
            src_ip,
            src_port: src_port.to_be_bytes(),
            dst_ip,
            dst_port: dst_port.to_be_bytes(),
            protocol,
            packet_size,
            tick,
            attack_label,
        }
    }

    /// Raw bytes for one of the address/port/protocol-byte fields, the way
    /// `Packet.get` dispatches on a field name.
    pub fn field_bytes(&self, key: FieldKey) -> Vec<u8> {
        match key {
            FieldKey::SrcIp => self.src_ip.to_vec(),
            FieldKey::SrcPort => self.src_port.to_vec(),
            FieldKey::DstIp => self.dst_ip.to_vec(),
            FieldKey::DstPort => self.dst_port.to_vec(),
            FieldKey::ProtocolByte => vec![self.protocol.protocol_byte()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_byte_matches_ip_protocol_numbers() {
        assert_eq!(Protocol::Icmp.protocol_byte(), 1);
        assert_eq!(Protocol::TcpSyn.protocol_byte(), 6);
        assert_eq!(Protocol::Udp.protocol_byte(), 17);
    }

    #[test]
    fn icmp_request_matches_icmp_prefix_but_not_reply() {
        assert!(Protocol::IcmpRequest.matches_prefix("ICMP"));
        assert!(Protocol::IcmpRequest.matches_prefix("ICMP_request"));
        assert!(!Protocol::IcmpRequest.matches_prefix("ICMP_reply"));
    }

    #[test]
    fn field_bytes_round_trip_ports() {
        let p = Packet::new([10, 0, 0, 1], 53, [10, 0, 0, 2], 4444, Protocol::Udp, 512, 0, 0);
        assert_eq!(p.field_bytes(FieldKey::SrcPort), vec![0, 53]);
        assert_eq!(p.field_bytes(FieldKey::ProtocolByte), vec![17]);
    }

    #[test]
    fn attack_label_is_carried_but_not_derived_from_anything_else() {
        let benign = Packet::new([10, 0, 0, 1], 53, [10, 0, 0, 2], 4444, Protocol::Udp, 512, 0, 0);
        let attack = Packet::new([10, 0, 0, 1], 53, [10, 0, 0, 2], 4444, Protocol::Udp, 512, 0, 5);
        assert_eq!(benign.attack_label, 0);
        assert_eq!(attack.attack_label, 5);
    }
}
