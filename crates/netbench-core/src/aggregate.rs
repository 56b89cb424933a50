use netbench_abstract::{
    FlowClassifier, FlowId, FlowStatsSource, MeasurementWindow, ProtocolLabel, RawFlowRecord,
};
use serde::Serialize;
use std::iter::Sum;
use std::net::Ipv4Addr;
use std::ops::{Add, AddAssign};
use tracing::debug;

/// Derived metrics for one server-originated flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowMetrics {
    pub flow_id: FlowId,
    pub protocol: ProtocolLabel,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub throughput_mbps: f64,
    pub delay_ms: f64,
    pub loss_percent: f64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
}

/// Running sums over every qualifying flow.
///
/// Combining totals is a plain field-wise sum, so any grouping or order of
/// flows produces the same result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateTotals {
    /// Seconds, summed only over flows that received something.
    pub delay_sum: f64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub rx_bytes: u64,
    /// Received packets of flows with at least one reception; the mean-delay weight.
    pub delay_weight: u64,
}

impl AggregateTotals {
    /// Contribution of a single flow.
    pub fn from_record(record: &RawFlowRecord) -> Self {
        let (delay_sum, delay_weight) = if record.rx_packets > 0 {
            (record.delay_sum, record.rx_packets)
        } else {
            (0.0, 0)
        };
        Self {
            delay_sum,
            tx_packets: record.tx_packets,
            rx_packets: record.rx_packets,
            lost_packets: record.lost_packets,
            rx_bytes: record.rx_bytes,
            delay_weight,
        }
    }
}

impl Add for AggregateTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            delay_sum: self.delay_sum + rhs.delay_sum,
            tx_packets: self.tx_packets + rhs.tx_packets,
            rx_packets: self.rx_packets + rhs.rx_packets,
            lost_packets: self.lost_packets + rhs.lost_packets,
            rx_bytes: self.rx_bytes + rhs.rx_bytes,
            delay_weight: self.delay_weight + rhs.delay_weight,
        }
    }
}

impl AddAssign for AggregateTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for AggregateTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowAggregation {
    /// One row per kept flow, in input order.
    pub flows: Vec<FlowMetrics>,
    pub totals: AggregateTotals,
}

/// Mean one-way delay of a flow in milliseconds, 0 when nothing arrived.
pub fn flow_delay_ms(record: &RawFlowRecord) -> f64 {
    if record.rx_packets > 0 {
        record.delay_sum / record.rx_packets as f64 * 1000.0
    } else {
        0.0
    }
}

/// Active duration of a flow: last reception minus first transmission when
/// that is positive, the configured window otherwise.
pub fn flow_duration(record: &RawFlowRecord, window: MeasurementWindow) -> f64 {
    let observed = record.time_last_rx_packet - record.time_first_tx_packet;
    if observed > 0.0 {
        observed
    } else {
        window.duration()
    }
}

pub fn flow_throughput_mbps(record: &RawFlowRecord, window: MeasurementWindow) -> f64 {
    record.rx_bytes as f64 * 8.0 / flow_duration(record, window) / 1_000_000.0
}

pub fn flow_loss_percent(record: &RawFlowRecord) -> f64 {
    if record.tx_packets > 0 {
        100.0 * record.lost_packets as f64 / record.tx_packets as f64
    } else {
        0.0
    }
}

/// Reduce raw flow records to per-flow metrics and global totals.
///
/// Flows whose classified source is not `server` (reverse-direction ACK flows,
/// or identifiers the classifier does not know) are left out of everything.
pub fn aggregate<'a, I>(
    records: I,
    classifier: &dyn FlowClassifier,
    server: Ipv4Addr,
    window: MeasurementWindow,
) -> FlowAggregation
where
    I: IntoIterator<Item = (FlowId, &'a RawFlowRecord)>,
{
    let mut out = FlowAggregation::default();

    for (flow_id, record) in records {
        let Some(tuple) = classifier.classify(flow_id) else {
            debug!("Flow {} has no classification, skipping", flow_id);
            continue;
        };
        if tuple.source != server {
            debug!(
                "Skipping flow {} ({} -> {}): not sent by the server",
                flow_id, tuple.source, tuple.destination
            );
            continue;
        }

        out.flows.push(FlowMetrics {
            flow_id,
            protocol: tuple.label(),
            source: tuple.source,
            destination: tuple.destination,
            throughput_mbps: flow_throughput_mbps(record, window),
            delay_ms: flow_delay_ms(record),
            loss_percent: flow_loss_percent(record),
            tx_packets: record.tx_packets,
            rx_packets: record.rx_packets,
            lost_packets: record.lost_packets,
        });
        out.totals += AggregateTotals::from_record(record);
    }

    out
}

/// Convenience wrapper over a finished run.
pub fn aggregate_source(
    source: &dyn FlowStatsSource,
    server: Ipv4Addr,
    window: MeasurementWindow,
) -> FlowAggregation {
    aggregate(source.flow_stats(), source.classifier(), server, window)
}
