use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// IANA protocol numbers carried in the IPv4 header.
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

/// Opaque identifier the flow monitor assigns to each observed flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub u32);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters collected for one flow over a whole run.
///
/// Times are seconds since the start of the simulation. A flow that never
/// delivered a packet keeps `time_last_rx_packet` at zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFlowRecord {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    /// Sum of one-way delays of every received packet, seconds.
    pub delay_sum: f64,
    pub time_first_tx_packet: f64,
    pub time_last_tx_packet: f64,
    pub time_first_rx_packet: f64,
    pub time_last_rx_packet: f64,
}

/// The part of a flow's five-tuple the metrics care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowClassification {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub source_port: u16,
    pub destination_port: u16,
}

impl FlowClassification {
    pub fn label(&self) -> ProtocolLabel {
        ProtocolLabel::from_number(self.protocol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolLabel {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}

impl ProtocolLabel {
    /// Protocol 6 is TCP; anything else is reported as UDP.
    pub fn from_number(protocol: u8) -> Self {
        if protocol == PROTO_TCP {
            ProtocolLabel::Tcp
        } else {
            ProtocolLabel::Udp
        }
    }
}

impl fmt::Display for ProtocolLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolLabel::Tcp => f.write_str("TCP"),
            ProtocolLabel::Udp => f.write_str("UDP"),
        }
    }
}
