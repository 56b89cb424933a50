use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::flow::{FlowClassification, PROTO_TCP, PROTO_UDP};

/// ACK bit of the TCP flags byte.
pub const FLAG_ACK: u8 = 0x10;

/// IPv4 + UDP header bytes.
pub const UDP_OVERHEAD: u32 = 28;
/// IPv4 + TCP header bytes (no options).
pub const TCP_OVERHEAD: u32 = 40;

/// Sequencing information carried by TCP packets. Sequence and
/// acknowledgement numbers count whole segments, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TcpSegment {
    pub seq: u64,
    pub ack: u64,
    pub flags: u8,
}

impl TcpSegment {
    pub fn data(seq: u64) -> Self {
        Self {
            seq,
            ack: 0,
            flags: 0,
        }
    }

    /// Create a pure cumulative ACK
    pub fn ack(ack: u64) -> Self {
        Self {
            seq: 0,
            ack,
            flags: FLAG_ACK,
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags & FLAG_ACK != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Unique per run; the flow monitor uses it to match receptions to transmissions.
    pub uid: u64,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub protocol: u8,
    /// Application payload bytes.
    pub payload: u32,
    pub tcp: Option<TcpSegment>,
}

impl Packet {
    pub fn udp(
        uid: u64,
        source: (Ipv4Addr, u16),
        destination: (Ipv4Addr, u16),
        payload: u32,
    ) -> Self {
        Self {
            uid,
            source: source.0,
            destination: destination.0,
            source_port: source.1,
            destination_port: destination.1,
            protocol: PROTO_UDP,
            payload,
            tcp: None,
        }
    }

    pub fn tcp(
        uid: u64,
        source: (Ipv4Addr, u16),
        destination: (Ipv4Addr, u16),
        payload: u32,
        segment: TcpSegment,
    ) -> Self {
        Self {
            uid,
            source: source.0,
            destination: destination.0,
            source_port: source.1,
            destination_port: destination.1,
            protocol: PROTO_TCP,
            payload,
            tcp: Some(segment),
        }
    }

    /// Size on the wire at the IP layer, the figure flow statistics count.
    pub fn ip_size(&self) -> u32 {
        let overhead = if self.protocol == PROTO_TCP {
            TCP_OVERHEAD
        } else {
            UDP_OVERHEAD
        };
        self.payload + overhead
    }

    pub fn five_tuple(&self) -> FlowClassification {
        FlowClassification {
            source: self.source,
            destination: self.destination,
            protocol: self.protocol,
            source_port: self.source_port,
            destination_port: self.destination_port,
        }
    }
}
