//! Traffic sources and sinks installed per client.
//!
//! The TCP endpoints do not touch the event queue themselves: like the
//! protocol callbacks in the engine, they return a list of actions which the
//! simulator then carries out.

use crate::time::{SimTime, from_secs, to_secs};
use netbench_abstract::{TrafficShape, TransportDefaults};
use std::collections::{BTreeMap, BTreeSet};

/// Constant-rate datagram source.
#[derive(Debug, Clone)]
pub struct CbrSource {
    pub payload: u32,
    pub interval: SimTime,
}

impl CbrSource {
    pub fn new(rate_bps: u64, payload: u32) -> Self {
        Self {
            payload,
            interval: from_secs(payload as f64 * 8.0 / rate_bps as f64),
        }
    }

    pub fn from_shape(shape: &TrafficShape) -> Option<Self> {
        match *shape {
            TrafficShape::ConstantRate {
                rate_bps,
                payload_bytes,
                ..
            } => Some(Self::new(rate_bps, payload_bytes)),
            TrafficShape::Bulk { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpAction {
    /// Transmit the segment with this sequence number, carrying `payload` bytes.
    Send { seq: u64, payload: u32 },
    /// (Re)start the retransmission timer.
    ArmRto { delay: SimTime },
    CancelRto,
}

#[derive(Debug, Clone, Copy)]
struct SentSegment {
    at: SimTime,
    retransmitted: bool,
}

/// NewReno sender that always has data to send (up to an optional byte cap).
///
/// Sequence numbers count segments. The application writes `send_size`
/// chunks into the socket buffer; the buffer is drained in `segment_size`
/// segments.
#[derive(Debug, Clone)]
pub struct BulkSender {
    segment_size: u32,
    send_size: u32,
    max_bytes: Option<u64>,
    /// Bytes the application has handed to the socket so far.
    written: u64,
    snd_una: u64,
    snd_nxt: u64,
    high_tx: u64,
    cwnd: f64,
    ssthresh: f64,
    dup_acks: u32,
    recover: Option<u64>,
    srtt: Option<f64>,
    rttvar: f64,
    rto: f64,
    min_rto: f64,
    outstanding: BTreeMap<u64, SentSegment>,
    stop_at: SimTime,
    pub retransmissions: u64,
    pub timeouts: u64,
}

const MAX_RTO_SECS: f64 = 60.0;
const DUP_ACK_THRESHOLD: u32 = 3;

impl BulkSender {
    pub fn new(
        shape: &TrafficShape,
        transport: &TransportDefaults,
        stop_at: SimTime,
    ) -> Option<Self> {
        let TrafficShape::Bulk {
            max_bytes,
            send_size,
        } = *shape
        else {
            return None;
        };
        Some(Self {
            segment_size: transport.segment_size,
            send_size,
            max_bytes,
            written: 0,
            snd_una: 0,
            snd_nxt: 0,
            high_tx: 0,
            cwnd: transport.initial_cwnd.max(1) as f64,
            ssthresh: f64::MAX,
            dup_acks: 0,
            recover: None,
            srtt: None,
            rttvar: 0.0,
            rto: transport.initial_rto,
            min_rto: transport.min_rto,
            outstanding: BTreeMap::new(),
            stop_at,
            retransmissions: 0,
            timeouts: 0,
        })
    }

    pub fn cwnd(&self) -> f64 {
        self.cwnd
    }

    pub fn acked(&self) -> u64 {
        self.snd_una
    }

    fn flight(&self) -> u64 {
        self.high_tx - self.snd_una
    }

    /// Payload of segment `seq`, or `None` past the end of a capped transfer.
    fn payload_of(&mut self, seq: u64) -> Option<u32> {
        let start = seq * self.segment_size as u64;
        let end = start + self.segment_size as u64;
        // the application tops the buffer up one chunk at a time
        while self.written < end {
            let chunk = match self.max_bytes {
                Some(cap) if self.written >= cap => break,
                Some(cap) => (cap - self.written).min(self.send_size as u64),
                None => self.send_size as u64,
            };
            self.written += chunk;
        }
        if self.written <= start {
            return None;
        }
        Some((self.written.min(end) - start) as u32)
    }

    fn transmit(&mut self, seq: u64, now: SimTime, actions: &mut Vec<TcpAction>) -> bool {
        let Some(payload) = self.payload_of(seq) else {
            return false;
        };
        let retransmitted = seq < self.high_tx;
        if retransmitted {
            self.retransmissions += 1;
        }
        self.outstanding.insert(
            seq,
            SentSegment {
                at: now,
                retransmitted,
            },
        );
        self.high_tx = self.high_tx.max(seq + 1);
        actions.push(TcpAction::Send { seq, payload });
        true
    }

    fn fill_window(&mut self, now: SimTime, actions: &mut Vec<TcpAction>) {
        if now >= self.stop_at {
            return;
        }
        let window = self.cwnd.floor().max(1.0) as u64;
        let was_idle = self.flight() == 0;
        while self.snd_nxt < self.snd_una + window {
            if !self.transmit(self.snd_nxt, now, actions) {
                break;
            }
            self.snd_nxt += 1;
        }
        if was_idle && self.flight() > 0 {
            actions.push(TcpAction::ArmRto {
                delay: from_secs(self.rto),
            });
        }
    }

    pub fn start(&mut self, now: SimTime) -> Vec<TcpAction> {
        let mut actions = Vec::new();
        self.fill_window(now, &mut actions);
        actions
    }

    fn update_rtt(&mut self, sample: f64) {
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rttvar = sample / 2.0;
            }
            Some(srtt) => {
                self.rttvar = 0.75 * self.rttvar + 0.25 * (srtt - sample).abs();
                self.srtt = Some(0.875 * srtt + 0.125 * sample);
            }
        }
        let srtt = self.srtt.unwrap_or(sample);
        self.rto = (srtt + 4.0 * self.rttvar).clamp(self.min_rto, MAX_RTO_SECS);
    }

    /// Cumulative acknowledgement: every segment below `ack` arrived.
    pub fn on_ack(&mut self, ack: u64, now: SimTime) -> Vec<TcpAction> {
        let mut actions = Vec::new();
        if now >= self.stop_at {
            return actions;
        }

        if ack > self.snd_una {
            let newly_acked = ack - self.snd_una;
            // Karn: only segments sent exactly once give an RTT sample
            if let Some(seg) = self.outstanding.get(&(ack - 1))
                && !seg.retransmitted
            {
                self.update_rtt(to_secs(now - seg.at));
            }
            self.outstanding = self.outstanding.split_off(&ack);
            self.snd_una = ack;
            self.snd_nxt = self.snd_nxt.max(ack);
            self.dup_acks = 0;

            match self.recover {
                Some(recover) if ack < recover => {
                    // partial ACK: the next hole is lost too
                    self.transmit(ack, now, &mut actions);
                    self.cwnd = (self.cwnd - newly_acked as f64 + 1.0).max(1.0);
                }
                Some(_) => {
                    self.recover = None;
                    self.cwnd = self.ssthresh;
                }
                None if self.cwnd < self.ssthresh => self.cwnd += newly_acked as f64,
                None => self.cwnd += newly_acked as f64 / self.cwnd,
            }

            if self.flight() > 0 {
                actions.push(TcpAction::ArmRto {
                    delay: from_secs(self.rto),
                });
            } else {
                actions.push(TcpAction::CancelRto);
            }
        } else if ack == self.snd_una && self.flight() > 0 {
            self.dup_acks += 1;
            if self.recover.is_some() {
                self.cwnd += 1.0;
            } else if self.dup_acks == DUP_ACK_THRESHOLD {
                self.ssthresh = (self.flight() as f64 / 2.0).max(2.0);
                self.cwnd = self.ssthresh + DUP_ACK_THRESHOLD as f64;
                self.recover = Some(self.high_tx);
                self.transmit(self.snd_una, now, &mut actions);
            }
        }

        self.fill_window(now, &mut actions);
        actions
    }

    /// The retransmission timer fired: collapse the window and go back to
    /// the first unacknowledged segment.
    pub fn on_rto(&mut self, now: SimTime) -> Vec<TcpAction> {
        let mut actions = Vec::new();
        if now >= self.stop_at || self.flight() == 0 {
            return actions;
        }
        self.timeouts += 1;
        self.ssthresh = (self.flight() as f64 / 2.0).max(2.0);
        self.cwnd = 1.0;
        self.dup_acks = 0;
        self.recover = None;
        self.snd_nxt = self.snd_una;
        self.rto = (self.rto * 2.0).min(MAX_RTO_SECS);

        if self.transmit(self.snd_una, now, &mut actions) {
            self.snd_nxt += 1;
        }
        actions.push(TcpAction::ArmRto {
            delay: from_secs(self.rto),
        });
        actions
    }
}

/// Receiving end of a bulk transfer: buffers out-of-order segments and
/// answers every data segment with a cumulative ACK.
#[derive(Debug, Clone, Default)]
pub struct TcpSink {
    rcv_next: u64,
    out_of_order: BTreeSet<u64>,
    pub bytes_received: u64,
}

impl TcpSink {
    /// Returns the acknowledgement number to send back.
    pub fn on_segment(&mut self, seq: u64, payload: u32) -> u64 {
        if seq == self.rcv_next {
            self.bytes_received += payload as u64;
            self.rcv_next += 1;
            while self.out_of_order.remove(&self.rcv_next) {
                self.rcv_next += 1;
            }
        } else if seq > self.rcv_next && self.out_of_order.insert(seq) {
            self.bytes_received += payload as u64;
        }
        self.rcv_next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> BulkSender {
        BulkSender::new(
            &TrafficShape::bulk(),
            &TransportDefaults::default(),
            from_secs(100.0),
        )
        .unwrap()
    }

    fn sends(actions: &[TcpAction]) -> Vec<u64> {
        actions
            .iter()
            .filter_map(|a| match a {
                TcpAction::Send { seq, .. } => Some(*seq),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn cbr_interval_matches_rate() {
        let cbr = CbrSource::from_shape(&TrafficShape::cbr()).unwrap();
        assert_eq!(cbr.interval, from_secs(0.008));
        assert!(CbrSource::from_shape(&TrafficShape::bulk()).is_none());
    }

    #[test]
    fn initial_window_and_slow_start() {
        let mut tx = sender();
        let first = tx.start(0);
        assert_eq!(sends(&first), (0..10).collect::<Vec<_>>());
        assert!(first.contains(&TcpAction::ArmRto { delay: from_secs(1.0) }));

        let more = tx.on_ack(1, from_secs(0.01));
        // one segment acked in slow start: window 11, one slot freed plus one more
        assert_eq!(sends(&more), vec![10, 11]);
        assert_eq!(tx.cwnd(), 11.0);
    }

    #[test]
    fn three_dup_acks_trigger_fast_retransmit() {
        let mut tx = sender();
        tx.start(0);
        tx.on_ack(2, from_secs(0.01));
        let mut retransmitted = Vec::new();
        for i in 0..3 {
            retransmitted.extend(sends(&tx.on_ack(2, from_secs(0.02 + i as f64 * 0.001))));
        }
        assert!(retransmitted.contains(&2));
        assert_eq!(tx.retransmissions, 1);
        assert!(tx.cwnd() < 12.0);
    }

    #[test]
    fn timeout_restarts_from_first_unacked() {
        let mut tx = sender();
        tx.start(0);
        tx.on_ack(4, from_secs(0.01));
        let actions = tx.on_rto(from_secs(1.5));
        assert_eq!(sends(&actions), vec![4]);
        assert_eq!(tx.cwnd(), 1.0);
        assert_eq!(tx.timeouts, 1);
        assert!(actions.iter().any(|a| matches!(a, TcpAction::ArmRto { .. })));
    }

    #[test]
    fn nothing_is_sent_after_stop() {
        let mut tx = BulkSender::new(
            &TrafficShape::bulk(),
            &TransportDefaults::default(),
            from_secs(1.0),
        )
        .unwrap();
        assert!(tx.start(from_secs(2.0)).is_empty());
        assert!(tx.on_rto(from_secs(2.0)).is_empty());
    }

    #[test]
    fn capped_transfer_ends_with_a_short_segment() {
        let shape = TrafficShape::Bulk {
            max_bytes: Some(3000),
            send_size: 1500,
        };
        let mut tx =
            BulkSender::new(&shape, &TransportDefaults::default(), from_secs(10.0)).unwrap();
        let actions = tx.start(0);
        let payloads: Vec<u32> = actions
            .iter()
            .filter_map(|a| match a {
                TcpAction::Send { payload, .. } => Some(*payload),
                _ => None,
            })
            .collect();
        assert_eq!(payloads, vec![1448, 1448, 104]);
    }

    #[test]
    fn sink_reorders_and_acks_cumulatively() {
        let mut sink = TcpSink::default();
        assert_eq!(sink.on_segment(0, 1448), 1);
        assert_eq!(sink.on_segment(2, 1448), 1);
        assert_eq!(sink.on_segment(3, 1448), 1);
        assert_eq!(sink.on_segment(1, 1448), 4);
        // duplicate delivery does not double count
        assert_eq!(sink.on_segment(2, 1448), 4);
        assert_eq!(sink.bytes_received, 4 * 1448);
    }
}
