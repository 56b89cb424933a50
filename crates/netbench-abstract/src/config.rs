use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest number of stations the 192.168.0.0/24 Wi-Fi subnet can address
/// (AP takes .1, broadcast takes .255).
pub const MAX_CLIENTS: u32 = 253;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("client count must be at least 1")]
    NoClients,
    #[error("client count {0} exceeds the 253 stations the Wi-Fi subnet can address")]
    TooManyClients(u32),
    #[error("stop time {stop}s must be after start time {start}s")]
    EmptyWindow { start: f64, stop: f64 },
    #[error("start time must be non-negative, got {0}s")]
    NegativeStart(f64),
    #[error("invalid scenario parameter `{name}`: {reason}")]
    InvalidParam { name: &'static str, reason: String },
    #[error("unknown traffic mode '{0}', expected cbr|bulk|mixed or 0|1|2")]
    UnknownTrafficMode(String),
}

/// Which traffic model every client receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficMode {
    /// Every client gets a UDP constant-bit-rate stream.
    Cbr,
    /// Every client gets a TCP bulk transfer.
    Bulk,
    /// Even client indices get CBR, odd ones get bulk.
    Mixed,
}

impl TrafficMode {
    pub const ALL: [TrafficMode; 3] = [TrafficMode::Cbr, TrafficMode::Bulk, TrafficMode::Mixed];

    /// Label used in console output and report file names.
    pub fn label(&self) -> &'static str {
        match self {
            TrafficMode::Cbr => "CBR",
            TrafficMode::Bulk => "Bulk",
            TrafficMode::Mixed => "CBR-Bulk",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.label() == label)
    }
}

impl fmt::Display for TrafficMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TrafficMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "cbr" => Ok(TrafficMode::Cbr),
            "1" | "bulk" => Ok(TrafficMode::Bulk),
            "2" | "mixed" | "cbr-bulk" => Ok(TrafficMode::Mixed),
            _ => Err(ConfigError::UnknownTrafficMode(s.to_string())),
        }
    }
}

/// Interval (seconds) during which senders are active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementWindow {
    pub start: f64,
    pub stop: f64,
}

impl MeasurementWindow {
    pub fn new(start: f64, stop: f64) -> Self {
        Self { start, stop }
    }

    /// `stop - start`, the denominator of the aggregate throughput.
    pub fn duration(&self) -> f64 {
        self.stop - self.start
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.start >= 0.0) {
            return Err(ConfigError::NegativeStart(self.start));
        }
        if !(self.stop > self.start) {
            return Err(ConfigError::EmptyWindow {
                start: self.start,
                stop: self.stop,
            });
        }
        Ok(())
    }
}

impl Default for MeasurementWindow {
    fn default() -> Self {
        Self {
            start: 1.0,
            stop: 60.0,
        }
    }
}

/// Everything that varies between runs of the experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub clients: u32,
    pub traffic: TrafficMode,
    pub mobility: bool,
    pub seed: u64,
    pub window: MeasurementWindow,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            clients: 1,
            traffic: TrafficMode::Cbr,
            mobility: false,
            seed: 1,
            window: MeasurementWindow::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clients == 0 {
            return Err(ConfigError::NoClients);
        }
        if self.clients > MAX_CLIENTS {
            return Err(ConfigError::TooManyClients(self.clients));
        }
        self.window.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionControl {
    NewReno,
}

/// Transport-layer defaults applied to every socket the simulator creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportDefaults {
    /// TCP maximum segment size in bytes.
    pub segment_size: u32,
    pub congestion_control: CongestionControl,
    /// Lower bound on the retransmission timeout, in seconds.
    pub min_rto: f64,
    pub initial_rto: f64,
    /// Initial congestion window in segments.
    pub initial_cwnd: u32,
}

impl Default for TransportDefaults {
    fn default() -> Self {
        Self {
            segment_size: 1448,
            congestion_control: CongestionControl::NewReno,
            min_rto: 1.0,
            initial_rto: 1.0,
            initial_cwnd: 10,
        }
    }
}

/// Physical parameters of the fixed topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioParams {
    /// Side of the square simulation area, metres.
    pub area_size: f64,
    /// Point-to-point link rate, bits per second.
    pub link_rate_bps: f64,
    /// Point-to-point one-way propagation delay, seconds.
    pub link_delay: f64,
    /// Drop-tail limit of each point-to-point device queue, packets.
    pub link_queue_packets: usize,
    pub tx_power_dbm: f64,
    pub path_loss_exponent: f64,
    pub reference_distance: f64,
    pub reference_loss_db: f64,
    /// Wi-Fi device queue limit, packets.
    pub wifi_queue_packets: usize,
    /// Transmission attempts per frame before the MAC gives up.
    pub wifi_max_attempts: u32,
    pub grid_min_x: f64,
    pub grid_min_y: f64,
    pub grid_delta_x: f64,
    pub grid_delta_y: f64,
    pub grid_width: u32,
    /// Station speed bounds when mobility is enabled, m/s.
    pub min_speed: f64,
    pub max_speed: f64,
    pub ssid: String,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            area_size: 140.0,
            link_rate_bps: 100e6,
            link_delay: 0.002,
            link_queue_packets: 100,
            tx_power_dbm: 16.0,
            path_loss_exponent: 2.5,
            reference_distance: 1.0,
            reference_loss_db: 46.6777,
            wifi_queue_packets: 500,
            wifi_max_attempts: 7,
            grid_min_x: 70.0,
            grid_min_y: 70.0,
            grid_delta_x: 5.0,
            grid_delta_y: 5.0,
            grid_width: 3,
            min_speed: 1.0,
            max_speed: 2.0,
            ssid: "netbench".to_string(),
        }
    }
}

impl ScenarioParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("area_size", self.area_size),
            ("link_rate_bps", self.link_rate_bps),
            ("reference_distance", self.reference_distance),
            ("path_loss_exponent", self.path_loss_exponent),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::InvalidParam {
                    name,
                    reason: format!("must be positive, got {value}"),
                });
            }
        }
        if self.link_delay < 0.0 {
            return Err(ConfigError::InvalidParam {
                name: "link_delay",
                reason: format!("must be non-negative, got {}", self.link_delay),
            });
        }
        if self.grid_width == 0 {
            return Err(ConfigError::InvalidParam {
                name: "grid_width",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.wifi_max_attempts == 0 {
            return Err(ConfigError::InvalidParam {
                name: "wifi_max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.min_speed >= 0.0 && self.max_speed >= self.min_speed) {
            return Err(ConfigError::InvalidParam {
                name: "max_speed",
                reason: format!(
                    "speed range [{}, {}] is empty or negative",
                    self.min_speed, self.max_speed
                ),
            });
        }
        Ok(())
    }

    /// Centre of the area, where the access point sits.
    pub fn ap_position(&self) -> (f64, f64) {
        (self.area_size / 2.0, self.area_size / 2.0)
    }
}
