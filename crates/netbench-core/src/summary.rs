//! Seed-averaged view over a directory of report files.

use crate::reduce::AggregateMetrics;
use crate::report::{ReportError, ReportRecord, mobility_label};
use netbench_abstract::TrafficMode;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub clients: u32,
    pub traffic: TrafficMode,
    pub mobility: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: GroupKey,
    /// Number of seeds averaged.
    pub runs: usize,
    pub mean: AggregateMetrics,
}

/// Average every metric over the seeds of each (clients, traffic, mobility)
/// group. Groups come out sorted by client count, then traffic, then mobility.
pub fn summarize(records: &[ReportRecord]) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<GroupKey, (usize, AggregateMetrics)> = BTreeMap::new();
    for record in records {
        let key = GroupKey {
            clients: record.clients,
            traffic: record.traffic,
            mobility: record.mobility,
        };
        let (runs, sum) = groups.entry(key).or_default();
        *runs += 1;
        sum.throughput_mbps += record.metrics.throughput_mbps;
        sum.mean_delay_ms += record.metrics.mean_delay_ms;
        sum.loss_percent += record.metrics.loss_percent;
        sum.pdr_percent += record.metrics.pdr_percent;
    }

    groups
        .into_iter()
        .map(|(key, (runs, sum))| {
            let n = runs as f64;
            GroupSummary {
                key,
                runs,
                mean: AggregateMetrics {
                    throughput_mbps: sum.throughput_mbps / n,
                    mean_delay_ms: sum.mean_delay_ms / n,
                    loss_percent: sum.loss_percent / n,
                    pdr_percent: sum.pdr_percent / n,
                },
            }
        })
        .collect()
}

/// Read every `*.txt` report in `dir`. Files that do not parse are skipped
/// with a warning; only failing to list the directory is an error.
pub fn load_reports(dir: &Path) -> Result<Vec<ReportRecord>, ReportError> {
    let entries = fs::read_dir(dir).map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        match ReportRecord::read(&path) {
            Ok(record) => records.push(record),
            Err(err) => warn!("Ignoring {}: {}", path.display(), err),
        }
    }
    debug!("Loaded {} reports from {}", records.len(), dir.display());
    Ok(records)
}

pub fn render_table(groups: &[GroupSummary]) -> String {
    let mut out = format!(
        "{:>7}  {:<9} {:<8} {:>4}  {:>15} {:>10} {:>8} {:>8}\n",
        "Clients", "Traffic", "Mobility", "Runs", "Throughput_Mbps", "Delay_ms", "Loss_%", "PDR_%"
    );
    for g in groups {
        let _ = writeln!(
            out,
            "{:>7}  {:<9} {:<8} {:>4}  {:>15.3} {:>10.2} {:>8.2} {:>8.2}",
            g.key.clients,
            g.key.traffic.label(),
            mobility_label(g.key.mobility),
            g.runs,
            g.mean.throughput_mbps,
            g.mean.mean_delay_ms,
            g.mean.loss_percent,
            g.mean.pdr_percent
        );
    }
    out
}

pub fn render_csv(groups: &[GroupSummary]) -> String {
    let mut out = String::from(
        "clients,traffic,mobility,runs,throughput_mbps,delay_ms,loss_percent,pdr_percent\n",
    );
    for g in groups {
        let _ = writeln!(
            out,
            "{},{},{},{},{:.3},{:.2},{:.2},{:.2}",
            g.key.clients,
            g.key.traffic.label(),
            mobility_label(g.key.mobility),
            g.runs,
            g.mean.throughput_mbps,
            g.mean.mean_delay_ms,
            g.mean.loss_percent,
            g.mean.pdr_percent
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        clients: u32,
        traffic: TrafficMode,
        mobility: bool,
        seed: u64,
        tput: f64,
    ) -> ReportRecord {
        ReportRecord {
            clients,
            traffic,
            mobility,
            seed,
            metrics: AggregateMetrics {
                throughput_mbps: tput,
                mean_delay_ms: tput * 10.0,
                loss_percent: 1.0,
                pdr_percent: 99.0,
            },
            tx_packets: 100,
            rx_packets: 99,
            lost_packets: 1,
        }
    }

    #[test]
    fn averages_over_seeds_per_group() {
        let records = vec![
            record(4, TrafficMode::Bulk, false, 1, 10.0),
            record(1, TrafficMode::Cbr, true, 1, 0.5),
            record(4, TrafficMode::Bulk, false, 2, 14.0),
            record(4, TrafficMode::Bulk, true, 1, 6.0),
        ];
        let groups = summarize(&records);
        assert_eq!(groups.len(), 3);

        assert_eq!(groups[0].key.clients, 1);
        let bulk_static = &groups[1];
        assert_eq!(
            bulk_static.key,
            GroupKey {
                clients: 4,
                traffic: TrafficMode::Bulk,
                mobility: false
            }
        );
        assert_eq!(bulk_static.runs, 2);
        assert_eq!(bulk_static.mean.throughput_mbps, 12.0);
        assert_eq!(bulk_static.mean.mean_delay_ms, 120.0);
        assert_eq!(bulk_static.mean.pdr_percent, 99.0);
        assert!(groups[2].key.mobility);
    }

    #[test]
    fn empty_input_gives_no_groups() {
        assert!(summarize(&[]).is_empty());
        assert_eq!(render_csv(&[]).lines().count(), 1);
    }

    #[test]
    fn csv_has_one_row_per_group() {
        let groups = summarize(&[record(2, TrafficMode::Mixed, true, 1, 3.25)]);
        let csv = render_csv(&groups);
        assert_eq!(
            csv.lines().nth(1),
            Some("2,CBR-Bulk,mobile,1,3.250,32.50,1.00,99.00")
        );
        assert!(render_table(&groups).contains("CBR-Bulk"));
    }

    #[test]
    fn load_skips_unparseable_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("junk.txt"), "not a report").unwrap();
        fs::write(dir.join("notes.md"), "ignored").unwrap();
        fs::write(
            dir.join("results_CBR_1clients_static_s1.txt"),
            "Clients: 1\nTraffic: CBR\nMobility: static\nSeed: 1\nThroughput_Mbps: 0.500\n\
             Delay_ms: 3.10\nLoss_%: 0.00\nPDR_%: 100.00\n\
             Packets_TX: 10\nPackets_RX: 10\nPackets_Lost: 0\n",
        )
        .unwrap();

        let records = load_reports(&dir).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metrics.mean_delay_ms, 3.1);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("does-not-exist");
        assert!(matches!(load_reports(&dir), Err(ReportError::Io { .. })));
    }
}
