//! Console and file output of a finished experiment.
//!
//! The file is plain `key: value` text so it can be grepped and re-read by
//! [`ReportRecord::parse`] when summarising a sweep.

use crate::aggregate::{AggregateTotals, FlowAggregation, FlowMetrics};
use crate::reduce::AggregateMetrics;
use netbench_abstract::{ExperimentConfig, TrafficMode};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report is missing key `{0}`")]
    MissingKey(&'static str),
    #[error("report key `{key}` has invalid value '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

pub fn mobility_label(mobility: bool) -> &'static str {
    if mobility { "mobile" } else { "static" }
}

/// `results_<traffic>_<n>clients_<static|mobile>_s<seed>.txt`
pub fn file_name(config: &ExperimentConfig) -> String {
    format!(
        "results_{}_{}clients_{}_s{}.txt",
        config.traffic.label(),
        config.clients,
        mobility_label(config.mobility),
        config.seed
    )
}

/// One console line per flow.
pub fn flow_row(flow: &FlowMetrics) -> String {
    format!(
        "Flow {} [{}] {} -> {} | Throughput: {:.3} Mbps | Delay: {:.2} ms | Loss: {:.2}% | \
         TX: {} RX: {} Lost: {}",
        flow.flow_id,
        flow.protocol,
        flow.source,
        flow.destination,
        flow.throughput_mbps,
        flow.delay_ms,
        flow.loss_percent,
        flow.tx_packets,
        flow.rx_packets,
        flow.lost_packets
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub config: ExperimentConfig,
    pub flows: Vec<FlowMetrics>,
    pub totals: AggregateTotals,
    pub metrics: AggregateMetrics,
}

impl ExperimentReport {
    pub fn new(
        config: ExperimentConfig,
        aggregation: FlowAggregation,
        metrics: AggregateMetrics,
    ) -> Self {
        Self {
            config,
            flows: aggregation.flows,
            totals: aggregation.totals,
            metrics,
        }
    }

    /// Per-flow table followed by the results block.
    pub fn render_console(&self) -> String {
        let mut out = String::from("\n=== PER-FLOW ANALYSIS ===\n");
        for flow in &self.flows {
            out.push_str(&flow_row(flow));
            out.push('\n');
        }
        let _ = write!(
            out,
            "\n==========================================\n\
             FINAL RESULTS\n\
             ------------------------------------------\n\
             Configuration: {} clients, {}, Mobility: {}\n\
             Packets: TX={} | RX={} | Lost={}\n\
             Aggregate throughput: {:.3} Mbps\n\
             Mean delay: {:.2} ms\n\
             Packet loss: {:.2}%\n\
             PDR (Packet Delivery Ratio): {:.2}%\n\
             ==========================================\n",
            self.config.clients,
            self.config.traffic,
            mobility_label(self.config.mobility),
            self.totals.tx_packets,
            self.totals.rx_packets,
            self.totals.lost_packets,
            self.metrics.throughput_mbps,
            self.metrics.mean_delay_ms,
            self.metrics.loss_percent,
            self.metrics.pdr_percent,
        );
        out
    }

    pub fn render_file(&self) -> String {
        format!(
            "NETBENCH WIRELESS EXPERIMENT\n\
             SIMULATION RESULTS\n\
             Clients: {}\n\
             Traffic: {}\n\
             Mobility: {}\n\
             Seed: {}\n\
             Throughput_Mbps: {:.3}\n\
             Delay_ms: {:.2}\n\
             Loss_%: {:.2}\n\
             PDR_%: {:.2}\n\
             Packets_TX: {}\n\
             Packets_RX: {}\n\
             Packets_Lost: {}\n",
            self.config.clients,
            self.config.traffic,
            mobility_label(self.config.mobility),
            self.config.seed,
            self.metrics.throughput_mbps,
            self.metrics.mean_delay_ms,
            self.metrics.loss_percent,
            self.metrics.pdr_percent,
            self.totals.tx_packets,
            self.totals.rx_packets,
            self.totals.lost_packets,
        )
    }

    /// Write the report into `dir` (created if needed) and return its path.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(dir).map_err(|source| ReportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(file_name(&self.config));
        fs::write(&path, self.render_file()).map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

fn value_of<'a>(content: &'a str, key: &'static str) -> Result<&'a str, ReportError> {
    content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim())
        .ok_or(ReportError::MissingKey(key))
}

fn number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ReportError> {
    raw.parse().map_err(|_| ReportError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

/// A report file read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub clients: u32,
    pub traffic: TrafficMode,
    pub mobility: bool,
    pub seed: u64,
    pub metrics: AggregateMetrics,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
}

impl ReportRecord {
    pub fn parse(content: &str) -> Result<Self, ReportError> {
        let lookup = |key: &'static str| value_of(content, key);

        let traffic_raw = lookup("Traffic")?;
        let traffic = TrafficMode::from_label(traffic_raw).ok_or_else(|| {
            ReportError::InvalidValue {
                key: "Traffic",
                value: traffic_raw.to_string(),
            }
        })?;
        let mobility = match lookup("Mobility")? {
            "mobile" => true,
            "static" => false,
            other => {
                return Err(ReportError::InvalidValue {
                    key: "Mobility",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            clients: number("Clients", lookup("Clients")?)?,
            traffic,
            mobility,
            seed: number("Seed", lookup("Seed")?)?,
            metrics: AggregateMetrics {
                throughput_mbps: number("Throughput_Mbps", lookup("Throughput_Mbps")?)?,
                mean_delay_ms: number("Delay_ms", lookup("Delay_ms")?)?,
                loss_percent: number("Loss_%", lookup("Loss_%")?)?,
                pdr_percent: number("PDR_%", lookup("PDR_%")?)?,
            },
            tx_packets: number("Packets_TX", lookup("Packets_TX")?)?,
            rx_packets: number("Packets_RX", lookup("Packets_RX")?)?,
            lost_packets: number("Packets_Lost", lookup("Packets_Lost")?)?,
        })
    }

    pub fn read(path: &Path) -> Result<Self, ReportError> {
        let content = fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netbench_abstract::{FlowId, MeasurementWindow, ProtocolLabel};
    use std::net::Ipv4Addr;

    fn sample() -> ExperimentReport {
        let flow = FlowMetrics {
            flow_id: FlowId(1),
            protocol: ProtocolLabel::Udp,
            source: Ipv4Addr::new(10, 1, 1, 1),
            destination: Ipv4Addr::new(192, 168, 0, 2),
            throughput_mbps: 0.069371,
            delay_ms: 10.0,
            loss_percent: 5.0,
            tx_packets: 1000,
            rx_packets: 950,
            lost_packets: 50,
        };
        let totals = AggregateTotals {
            delay_sum: 9.5,
            tx_packets: 1000,
            rx_packets: 950,
            lost_packets: 50,
            rx_bytes: 485_600,
            delay_weight: 950,
        };
        ExperimentReport::new(
            ExperimentConfig {
                clients: 8,
                traffic: TrafficMode::Mixed,
                mobility: true,
                seed: 3,
                window: MeasurementWindow::default(),
            },
            FlowAggregation {
                flows: vec![flow],
                totals,
            },
            AggregateMetrics {
                throughput_mbps: 0.0658441,
                mean_delay_ms: 10.0,
                loss_percent: 5.0,
                pdr_percent: 95.0,
            },
        )
    }

    #[test]
    fn file_name_encodes_the_run() {
        assert_eq!(
            file_name(&sample().config),
            "results_CBR-Bulk_8clients_mobile_s3.txt"
        );
        let config = ExperimentConfig::default();
        assert_eq!(file_name(&config), "results_CBR_1clients_static_s1.txt");
    }

    #[test]
    fn flow_row_formatting() {
        let report = sample();
        assert_eq!(
            flow_row(&report.flows[0]),
            "Flow 1 [UDP] 10.1.1.1 -> 192.168.0.2 | Throughput: 0.069 Mbps | Delay: 10.00 ms | \
             Loss: 5.00% | TX: 1000 RX: 950 Lost: 50"
        );
        let console = report.render_console();
        assert!(console.contains("Aggregate throughput: 0.066 Mbps"));
        assert!(console.contains("PDR (Packet Delivery Ratio): 95.00%"));
    }

    #[test]
    fn file_round_trips_through_parse() {
        let report = sample();
        let text = report.render_file();
        assert!(text.contains("Throughput_Mbps: 0.066\n"));
        assert!(text.contains("Loss_%: 5.00\n"));

        let record = ReportRecord::parse(&text).unwrap();
        assert_eq!(record.clients, 8);
        assert_eq!(record.traffic, TrafficMode::Mixed);
        assert!(record.mobility);
        assert_eq!(record.seed, 3);
        assert_eq!(record.metrics.throughput_mbps, 0.066);
        assert_eq!(record.metrics.pdr_percent, 95.0);
        assert_eq!(record.lost_packets, 50);
    }

    #[test]
    fn parse_reports_missing_and_bad_keys() {
        let text = sample().render_file();
        let without_seed: String = text
            .lines()
            .filter(|l| !l.starts_with("Seed"))
            .map(|l| format!("{l}\n"))
            .collect();
        assert!(matches!(
            ReportRecord::parse(&without_seed),
            Err(ReportError::MissingKey("Seed"))
        ));

        let bad = text.replace("Delay_ms: 10.00", "Delay_ms: ten");
        assert!(matches!(
            ReportRecord::parse(&bad),
            Err(ReportError::InvalidValue { key: "Delay_ms", .. })
        ));
    }

    #[test]
    fn writes_into_a_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample().write_to_dir(&dir.path().join("nested")).unwrap();
        assert!(path.ends_with("results_CBR-Bulk_8clients_mobile_s3.txt"));
        let record = ReportRecord::read(&path).unwrap();
        assert_eq!(record.tx_packets, 1000);
    }
}
