use serde::{Deserialize, Serialize};

/// First destination port; client `i` listens on `BASE_PORT + i`.
pub const BASE_PORT: u16 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// UDP constant bit rate.
    UdpCbr,
    /// TCP bulk transfer.
    TcpBulk,
}

/// Shape of the traffic a sender generates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrafficShape {
    /// Fixed-size datagrams at a fixed rate, always on.
    ConstantRate {
        rate_bps: u64,
        payload_bytes: u32,
        /// Fraction of each on/off cycle spent sending.
        on_fraction: f64,
    },
    /// As much data as the transport allows, written in fixed chunks.
    Bulk {
        /// `None` means unlimited.
        max_bytes: Option<u64>,
        send_size: u32,
    },
}

impl TrafficShape {
    pub fn cbr() -> Self {
        TrafficShape::ConstantRate {
            rate_bps: 512_000,
            payload_bytes: 512,
            on_fraction: 1.0,
        }
    }

    pub fn bulk() -> Self {
        TrafficShape::Bulk {
            max_bytes: None,
            send_size: 1500,
        }
    }
}

/// What one client receives and over which port.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientTrafficAssignment {
    pub client: u32,
    pub transport: TransportKind,
    pub shape: TrafficShape,
}

impl ClientTrafficAssignment {
    /// `None` once the client index runs past the 16-bit port space.
    pub fn port(&self) -> Option<u16> {
        u16::try_from(self.client)
            .ok()
            .and_then(|client| BASE_PORT.checked_add(client))
    }

    /// One-line description used when logging the setup.
    pub fn describe(&self) -> String {
        match self.shape {
            TrafficShape::ConstantRate {
                rate_bps,
                payload_bytes,
                ..
            } => format!(
                "CBR (UDP) - {}kbps, {} bytes",
                rate_bps / 1000,
                payload_bytes
            ),
            TrafficShape::Bulk { send_size, .. } => format!("Bulk (TCP) - {send_size} bytes"),
        }
    }
}
