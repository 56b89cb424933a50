//! Per-flow counters keyed by five-tuple, in the spirit of a flow monitor
//! probing every node's IP layer.

use crate::time::{SimTime, to_secs};
use netbench_abstract::{
    FlowClassification, FlowClassifier, FlowId, FlowStatsSource, Packet, RawFlowRecord,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Assigns a flow id to each distinct five-tuple, starting at 1 in order of
/// first appearance.
#[derive(Debug, Default)]
pub struct Ipv4FlowClassifier {
    ids: HashMap<FlowClassification, FlowId>,
    tuples: BTreeMap<FlowId, FlowClassification>,
}

impl Ipv4FlowClassifier {
    pub fn classify_packet(&mut self, packet: &Packet) -> FlowId {
        let tuple = packet.five_tuple();
        if let Some(id) = self.ids.get(&tuple) {
            return *id;
        }
        let id = FlowId(self.tuples.len() as u32 + 1);
        debug!(
            "New flow {}: {}:{} -> {}:{} proto {}",
            id,
            tuple.source,
            tuple.source_port,
            tuple.destination,
            tuple.destination_port,
            tuple.protocol
        );
        self.ids.insert(tuple, id);
        self.tuples.insert(id, tuple);
        id
    }

    pub fn tuples(&self) -> &BTreeMap<FlowId, FlowClassification> {
        &self.tuples
    }
}

impl FlowClassifier for Ipv4FlowClassifier {
    fn classify(&self, flow: FlowId) -> Option<FlowClassification> {
        self.tuples.get(&flow).copied()
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    flow: FlowId,
    sent_at: SimTime,
}

#[derive(Debug, Default)]
pub struct FlowMonitor {
    classifier: Ipv4FlowClassifier,
    stats: BTreeMap<FlowId, RawFlowRecord>,
    in_flight: HashMap<u64, InFlight>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A packet left its originating node.
    pub fn record_tx(&mut self, packet: &Packet, now: SimTime) {
        let flow = self.classifier.classify_packet(packet);
        let stats = self.stats.entry(flow).or_default();
        let t = to_secs(now);
        if stats.tx_packets == 0 {
            stats.time_first_tx_packet = t;
        }
        stats.time_last_tx_packet = t;
        stats.tx_packets += 1;
        stats.tx_bytes += packet.ip_size() as u64;
        self.in_flight.insert(packet.uid, InFlight { flow, sent_at: now });
    }

    /// A packet reached its destination node.
    pub fn record_rx(&mut self, packet: &Packet, now: SimTime) {
        let Some(sent) = self.in_flight.remove(&packet.uid) else {
            debug!("Reception of untracked packet uid={}", packet.uid);
            return;
        };
        let Some(stats) = self.stats.get_mut(&sent.flow) else {
            return;
        };
        let t = to_secs(now);
        if stats.rx_packets == 0 {
            stats.time_first_rx_packet = t;
        }
        stats.time_last_rx_packet = t;
        stats.rx_packets += 1;
        stats.rx_bytes += packet.ip_size() as u64;
        stats.delay_sum += to_secs(now - sent.sent_at);
    }

    /// A packet was dropped somewhere along its path.
    pub fn record_drop(&mut self, packet: &Packet) {
        if let Some(sent) = self.in_flight.remove(&packet.uid)
            && let Some(stats) = self.stats.get_mut(&sent.flow)
        {
            stats.lost_packets += 1;
        }
    }

    /// Count packets still in flight after `max_delay` as lost.
    pub fn check_for_lost_packets(&mut self, now: SimTime, max_delay: SimTime) {
        let stale: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, f)| now.saturating_sub(f.sent_at) > max_delay)
            .map(|(uid, _)| *uid)
            .collect();
        for uid in stale {
            if let Some(sent) = self.in_flight.remove(&uid)
                && let Some(stats) = self.stats.get_mut(&sent.flow)
            {
                stats.lost_packets += 1;
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn records(&self) -> &BTreeMap<FlowId, RawFlowRecord> {
        &self.stats
    }

    pub fn tuples(&self) -> &BTreeMap<FlowId, FlowClassification> {
        self.classifier.tuples()
    }
}

impl FlowStatsSource for FlowMonitor {
    fn flow_stats(&self) -> Vec<(FlowId, &RawFlowRecord)> {
        self.stats.iter().map(|(id, r)| (*id, r)).collect()
    }

    fn classifier(&self) -> &dyn FlowClassifier {
        &self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::from_secs;
    use netbench_abstract::{PROTO_UDP, TcpSegment};
    use std::net::Ipv4Addr;

    const SERVER: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);
    const STA: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 2);

    fn udp(uid: u64) -> Packet {
        Packet::udp(uid, (SERVER, 49153), (STA, 9), 512)
    }

    #[test]
    fn counts_tx_rx_and_delay() {
        let mut mon = FlowMonitor::new();
        mon.record_tx(&udp(1), from_secs(1.0));
        mon.record_tx(&udp(2), from_secs(1.008));
        mon.record_rx(&udp(1), from_secs(1.004));
        mon.record_drop(&udp(2));

        let rec = &mon.records()[&FlowId(1)];
        assert_eq!(rec.tx_packets, 2);
        assert_eq!(rec.rx_packets, 1);
        assert_eq!(rec.lost_packets, 1);
        assert_eq!(rec.tx_bytes, 1080);
        assert_eq!(rec.rx_bytes, 540);
        assert!((rec.delay_sum - 0.004).abs() < 1e-12);
        assert_eq!(rec.time_first_tx_packet, 1.0);
        assert_eq!(rec.time_last_rx_packet, 1.004);
        assert_eq!(mon.in_flight(), 0);
    }

    #[test]
    fn flow_ids_follow_first_appearance() {
        let mut mon = FlowMonitor::new();
        mon.record_tx(&udp(1), 0);
        let ack = Packet::tcp(2, (STA, 10), (SERVER, 49154), 0, TcpSegment::ack(1));
        mon.record_tx(&ack, 1);
        mon.record_tx(&udp(3), 2);

        let stats = mon.flow_stats();
        assert_eq!(stats.len(), 2);
        let classifier = FlowStatsSource::classifier(&mon);
        assert_eq!(classifier.classify(FlowId(1)).map(|t| t.protocol), Some(PROTO_UDP));
        assert_eq!(classifier.classify(FlowId(2)).map(|t| t.source), Some(STA));
        assert_eq!(classifier.classify(FlowId(3)), None);
    }

    #[test]
    fn stale_packets_become_lost() {
        let mut mon = FlowMonitor::new();
        mon.record_tx(&udp(1), from_secs(1.0));
        mon.record_tx(&udp(2), from_secs(50.0));
        mon.check_for_lost_packets(from_secs(55.0), from_secs(10.0));
        assert_eq!(mon.records()[&FlowId(1)].lost_packets, 1);
        assert_eq!(mon.in_flight(), 1);
        // a late arrival of an already-lost packet is ignored
        mon.record_rx(&udp(1), from_secs(56.0));
        assert_eq!(mon.records()[&FlowId(1)].rx_packets, 0);
    }
}
