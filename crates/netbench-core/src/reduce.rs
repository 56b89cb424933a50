use crate::aggregate::AggregateTotals;
use netbench_abstract::MeasurementWindow;
use serde::{Deserialize, Serialize};

/// Headline results of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub throughput_mbps: f64,
    pub mean_delay_ms: f64,
    pub loss_percent: f64,
    pub pdr_percent: f64,
}

/// Turn accumulated totals into the four headline metrics.
///
/// Throughput divides by the configured window rather than by any flow's own
/// duration, so it reads as sustained capacity over the whole interval. Delay
/// is weighted by delivered packets, loss and PDR by transmitted packets.
/// Every zero denominator yields 0.
pub fn reduce(totals: &AggregateTotals, window: MeasurementWindow) -> AggregateMetrics {
    let duration = window.duration();
    let throughput_mbps = if duration > 0.0 {
        totals.rx_bytes as f64 * 8.0 / duration / 1_000_000.0
    } else {
        0.0
    };
    let mean_delay_ms = if totals.delay_weight > 0 {
        totals.delay_sum / totals.delay_weight as f64 * 1000.0
    } else {
        0.0
    };
    let (loss_percent, pdr_percent) = if totals.tx_packets > 0 {
        let tx = totals.tx_packets as f64;
        (
            100.0 * totals.lost_packets as f64 / tx,
            100.0 * totals.rx_packets as f64 / tx,
        )
    } else {
        (0.0, 0.0)
    };

    AggregateMetrics {
        throughput_mbps,
        mean_delay_ms,
        loss_percent,
        pdr_percent,
    }
}
