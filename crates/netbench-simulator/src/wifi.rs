//! Wireless cell: log-distance path loss, OFDM rate selection and a single
//! shared medium.

use crate::time::{SimTime, from_secs, transmission_time};
use netbench_abstract::{Packet, ScenarioParams};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogDistance {
    pub exponent: f64,
    pub reference_distance: f64,
    pub reference_loss_db: f64,
}

impl LogDistance {
    pub fn from_params(params: &ScenarioParams) -> Self {
        Self {
            exponent: params.path_loss_exponent,
            reference_distance: params.reference_distance,
            reference_loss_db: params.reference_loss_db,
        }
    }

    /// `L0 + 10 n log10(d / d0)`; distances inside `d0` count as `d0`.
    pub fn loss_db(&self, distance: f64) -> f64 {
        let d = distance.max(self.reference_distance);
        self.reference_loss_db + 10.0 * self.exponent * (d / self.reference_distance).log10()
    }

    pub fn rx_power_dbm(&self, tx_power_dbm: f64, distance: f64) -> f64 {
        tx_power_dbm - self.loss_db(distance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfdmRate {
    pub mbps: f64,
    pub sensitivity_dbm: f64,
}

/// 802.11a rates with typical receiver sensitivities, slowest first.
pub const OFDM_RATES: [OfdmRate; 8] = [
    OfdmRate { mbps: 6.0, sensitivity_dbm: -82.0 },
    OfdmRate { mbps: 9.0, sensitivity_dbm: -81.0 },
    OfdmRate { mbps: 12.0, sensitivity_dbm: -79.0 },
    OfdmRate { mbps: 18.0, sensitivity_dbm: -77.0 },
    OfdmRate { mbps: 24.0, sensitivity_dbm: -74.0 },
    OfdmRate { mbps: 36.0, sensitivity_dbm: -70.0 },
    OfdmRate { mbps: 48.0, sensitivity_dbm: -66.0 },
    OfdmRate { mbps: 54.0, sensitivity_dbm: -65.0 },
];

/// Headroom over sensitivity the rate controller insists on.
pub const RATE_MARGIN_DB: f64 = 3.0;

/// MAC header, LLC/SNAP and FCS added to every IP packet.
const MAC_OVERHEAD_BYTES: u32 = 36;
/// DIFS, mean backoff, preamble, SIFS and the link-layer ACK.
const ACCESS_OVERHEAD_SECS: f64 = 34e-6 + 67.5e-6 + 20e-6 + 16e-6 + 44e-6;
pub const SLOT_SECS: f64 = 9e-6;

/// Fastest rate whose sensitivity plus margin the signal clears; the
/// slowest rate when none does.
pub fn select_rate(rx_power_dbm: f64) -> OfdmRate {
    OFDM_RATES
        .iter()
        .rev()
        .find(|r| rx_power_dbm >= r.sensitivity_dbm + RATE_MARGIN_DB)
        .copied()
        .unwrap_or(OFDM_RATES[0])
}

/// Probability one attempt at `rate` is lost; 0.5 at sensitivity.
pub fn frame_error_rate(rx_power_dbm: f64, rate: OfdmRate) -> f64 {
    let margin = rx_power_dbm - rate.sensitivity_dbm;
    1.0 / (1.0 + (2.0 * margin).exp())
}

/// Medium occupancy of one attempt.
pub fn airtime(packet_bytes: u32, rate: OfdmRate) -> SimTime {
    from_secs(ACCESS_OVERHEAD_SECS)
        + transmission_time(packet_bytes + MAC_OVERHEAD_BYTES, rate.mbps * 1e6)
}

/// Transmit queue of one wireless interface.
#[derive(Debug, Default)]
pub struct WifiDevice {
    pub queue: VecDeque<Packet>,
    /// Whether a transmit event is already pending for this device.
    pub scheduled: bool,
}

impl WifiDevice {
    /// Hands the packet back when the queue is full.
    pub fn enqueue(&mut self, packet: Packet, limit: usize) -> Result<(), Packet> {
        if self.queue.len() >= limit {
            return Err(packet);
        }
        self.queue.push_back(packet);
        Ok(())
    }
}

/// The one channel every device in the cell shares.
#[derive(Debug, Default)]
pub struct SharedMedium {
    pub busy_until: SimTime,
}

impl SharedMedium {
    pub fn is_idle(&self, now: SimTime) -> bool {
        self.busy_until <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> LogDistance {
        LogDistance::from_params(&ScenarioParams::default())
    }

    #[test]
    fn loss_grows_with_distance() {
        let m = model();
        assert_eq!(m.loss_db(0.0), 46.6777);
        assert_eq!(m.loss_db(1.0), 46.6777);
        assert!((m.loss_db(10.0) - 71.6777).abs() < 1e-9);
        assert!((m.rx_power_dbm(16.0, 100.0) - (16.0 - 96.6777)).abs() < 1e-9);
    }

    #[test]
    fn rate_follows_signal() {
        assert_eq!(select_rate(-30.0).mbps, 54.0);
        assert_eq!(select_rate(-62.5).mbps, 48.0);
        assert_eq!(select_rate(-72.0).mbps, 18.0);
        assert_eq!(select_rate(-90.0).mbps, 6.0);
    }

    #[test]
    fn error_rate_is_a_smooth_cliff() {
        let rate = OFDM_RATES[0];
        assert!((frame_error_rate(-82.0, rate) - 0.5).abs() < 1e-12);
        assert!(frame_error_rate(-70.0, rate) < 1e-9);
        assert!(frame_error_rate(-90.0, rate) > 0.999);
        // the margin the rate controller keeps leaves a small residual error
        assert!(frame_error_rate(-79.0, rate) < 0.003);
    }

    #[test]
    fn airtime_shrinks_with_rate() {
        let slow = airtime(1488, OFDM_RATES[0]);
        let fast = airtime(1488, OFDM_RATES[7]);
        assert!(slow > fast);
        assert!(fast > from_secs(ACCESS_OVERHEAD_SECS));
    }

    #[test]
    fn queue_limit() {
        let mut dev = WifiDevice::default();
        let p = Packet::udp(
            1,
            (std::net::Ipv4Addr::LOCALHOST, 1),
            (std::net::Ipv4Addr::LOCALHOST, 2),
            10,
        );
        assert!(dev.enqueue(p.clone(), 1).is_ok());
        assert!(dev.enqueue(p, 1).is_err());
        assert_eq!(dev.queue.len(), 1);
    }
}
