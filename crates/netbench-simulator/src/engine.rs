use crate::apps::{BulkSender, CbrSource, TcpAction, TcpSink};
use crate::flowmon::FlowMonitor;
use crate::mobility::{MobilityModel, distance, station_models};
use crate::time::{SimTime, from_secs, to_secs, transmission_time};
use crate::topology::{Hop, NodeId, Topology};
use crate::trace::{FlowTrace, SimulationReport, TcpTrace};
use crate::wifi::{
    LogDistance, SLOT_SECS, SharedMedium, WifiDevice, airtime, frame_error_rate, select_rate,
};
use netbench_abstract::{
    ClientTrafficAssignment, ConfigError, ExperimentConfig, Packet, ScenarioParams, TcpSegment,
    TransportDefaults, TransportKind,
};
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use tracing::{debug, info};

/// First ephemeral port the server binds its senders to.
const EPHEMERAL_PORT_BASE: u16 = 49153;
/// In-flight packets older than this when the run ends count as lost.
const MAX_PER_HOP_DELAY_SECS: f64 = 10.0;
/// Random backoff window, in slots, drawn when the medium is found busy.
const CONTENTION_WINDOW_SLOTS: u64 = 16;

#[derive(Debug)]
pub enum EventType {
    /// A packet finished crossing a link and is now at `node`.
    PacketArrival { node: NodeId, packet: Packet },
    /// The wireless interface of `node` tries to transmit its head-of-line frame.
    WifiTransmit { node: NodeId },
    CbrSend { client: u32 },
    BulkStart { client: u32 },
    RtoExpiry { client: u32, generation: u64 },
}

#[derive(Debug)]
struct Event {
    time: SimTime,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Why packets disappeared, for the trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounters {
    pub wired_queue: u64,
    pub wifi_queue: u64,
    pub wifi_retry_limit: u64,
    pub no_route: u64,
}

#[derive(Debug, Default)]
struct WiredDirection {
    busy_until: SimTime,
}

/// Per-client endpoint state.
#[derive(Debug)]
enum ClientApp {
    Cbr(CbrSource),
    Bulk { sender: BulkSender, sink: TcpSink },
}

pub struct Simulator {
    time: SimTime,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,
    events_processed: u64,

    config: ExperimentConfig,
    params: ScenarioParams,
    transport: TransportDefaults,
    rng: rand::rngs::StdRng,

    topology: Topology,
    ap_position: (f64, f64),
    stations: Vec<MobilityModel>,
    propagation: LogDistance,

    wired: HashMap<(NodeId, NodeId), WiredDirection>,
    medium: SharedMedium,
    wifi_devices: HashMap<NodeId, WifiDevice>,

    assignments: Vec<ClientTrafficAssignment>,
    apps: BTreeMap<u32, ClientApp>,
    client_ports: HashMap<u32, u16>,
    /// Timer generations to handle cancellation, keyed by client.
    rto_generations: HashMap<u32, u64>,

    next_uid: u64,
    monitor: FlowMonitor,
    pub drops: DropCounters,
}

impl Simulator {
    /// Build the topology and one application pair per assignment.
    pub fn new(
        config: ExperimentConfig,
        params: ScenarioParams,
        transport: TransportDefaults,
        assignments: Vec<ClientTrafficAssignment>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        params.validate()?;
        if transport.segment_size == 0 {
            return Err(ConfigError::InvalidParam {
                name: "segment_size",
                reason: "must be at least 1 byte".to_string(),
            });
        }
        if let Some(stray) = assignments.iter().find(|a| a.client >= config.clients) {
            return Err(ConfigError::InvalidParam {
                name: "assignments",
                reason: format!(
                    "client index {} outside 0..{}",
                    stray.client, config.clients
                ),
            });
        }

        let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed);
        let topology = Topology::new(config.clients);
        let stations = station_models(&params, config.clients, config.mobility, &mut rng);

        let mut wired = HashMap::new();
        for (a, b) in topology.wired_links() {
            wired.insert((a, b), WiredDirection::default());
            wired.insert((b, a), WiredDirection::default());
        }
        let mut wifi_devices = HashMap::new();
        wifi_devices.insert(NodeId::AccessPoint, WifiDevice::default());
        for i in 0..config.clients {
            wifi_devices.insert(NodeId::Station(i), WifiDevice::default());
        }

        let stop_at = from_secs(config.window.stop);
        let mut apps = BTreeMap::new();
        let mut client_ports = HashMap::new();
        for a in &assignments {
            let Some(port) = a.port() else {
                return Err(ConfigError::InvalidParam {
                    name: "assignments",
                    reason: format!("client {} has no free port", a.client),
                });
            };
            client_ports.insert(a.client, port);
            let app = match a.transport {
                TransportKind::UdpCbr => CbrSource::from_shape(&a.shape).map(ClientApp::Cbr),
                TransportKind::TcpBulk => {
                    BulkSender::new(&a.shape, &transport, stop_at).map(|sender| ClientApp::Bulk {
                        sender,
                        sink: TcpSink::default(),
                    })
                }
            };
            let Some(app) = app else {
                return Err(ConfigError::InvalidParam {
                    name: "assignments",
                    reason: format!(
                        "client {} has a shape that does not match its transport",
                        a.client
                    ),
                });
            };
            apps.insert(a.client, app);
        }

        Ok(Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            events_processed: 0,
            ap_position: params.ap_position(),
            propagation: LogDistance::from_params(&params),
            config,
            params,
            transport,
            rng,
            topology,
            stations,
            wired,
            medium: SharedMedium::default(),
            wifi_devices,
            assignments,
            apps,
            client_ports,
            rto_generations: HashMap::new(),
            next_uid: 0,
            monitor: FlowMonitor::new(),
            drops: DropCounters::default(),
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn server_address(&self) -> std::net::Ipv4Addr {
        self.topology.server_address()
    }

    pub fn flow_monitor(&self) -> &FlowMonitor {
        &self.monitor
    }

    /// Simulation end: two seconds past the sender stop time.
    pub fn end_time(&self) -> SimTime {
        from_secs(self.config.window.stop + 2.0)
    }

    fn push_event(&mut self, time: SimTime, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    fn next_uid(&mut self) -> u64 {
        self.next_uid += 1;
        self.next_uid
    }

    fn sink_stop(&self) -> SimTime {
        from_secs(self.config.window.stop + 1.0)
    }

    fn server_endpoint(&self, client: u32) -> (std::net::Ipv4Addr, u16) {
        (
            self.topology.server_address(),
            EPHEMERAL_PORT_BASE + client as u16,
        )
    }

    fn client_endpoint(&self, client: u32) -> Option<(std::net::Ipv4Addr, u16)> {
        let port = self.client_ports.get(&client)?;
        Some((self.topology.station_address(client), *port))
    }

    /// Log the setup and schedule every sender's first event.
    pub fn init(&mut self) {
        info!(
            "Topology: server -> core -> edge -> AP ({}) with {} stations, {:.0}x{:.0} m area",
            self.params.ssid, self.config.clients, self.params.area_size, self.params.area_size
        );
        for (node, address) in self.topology.interfaces() {
            debug!("Interface {} = {}", node, address);
        }
        info!(
            "Transport defaults: segment size {} bytes, {:?}",
            self.transport.segment_size, self.transport.congestion_control
        );
        if self.config.mobility {
            info!(
                "Mobility: constant velocity {}-{} m/s",
                self.params.min_speed, self.params.max_speed
            );
        } else {
            info!("Mobility: fixed positions");
        }

        let start = from_secs(self.config.window.start);
        let assignments = self.assignments.clone();
        for a in &assignments {
            info!(
                "Client {} ({}): {}",
                a.client,
                self.topology.station_address(a.client),
                a.describe()
            );
            match a.transport {
                TransportKind::UdpCbr => {
                    self.push_event(start, EventType::CbrSend { client: a.client })
                }
                TransportKind::TcpBulk => {
                    self.push_event(start, EventType::BulkStart { client: a.client })
                }
            }
        }
    }

    /// Process the next event. Returns false once the queue is empty or the
    /// next event lies past the end of the run.
    pub fn step(&mut self) -> bool {
        let end = self.end_time();
        match self.event_queue.peek() {
            Some(e) if e.time <= end => {}
            _ => return false,
        }
        let Some(event) = self.event_queue.pop() else {
            return false;
        };
        self.time = event.time;
        self.events_processed += 1;

        match event.event_type {
            EventType::PacketArrival { node, packet } => self.on_arrival(node, packet),
            EventType::WifiTransmit { node } => self.on_wifi_transmit(node),
            EventType::CbrSend { client } => self.on_cbr_send(client),
            EventType::BulkStart { client } => {
                let now = self.time;
                if let Some(ClientApp::Bulk { sender, .. }) = self.apps.get_mut(&client) {
                    let actions = sender.start(now);
                    self.process_tcp_actions(client, actions);
                }
            }
            EventType::RtoExpiry { client, generation } => {
                // Check if this timer event is still valid by comparing generations
                if self.rto_generations.get(&client) != Some(&generation) {
                    return true;
                }
                let now = self.time;
                if let Some(ClientApp::Bulk { sender, .. }) = self.apps.get_mut(&client) {
                    debug!("RTO expired for client {} at {:.3}s", client, to_secs(now));
                    let actions = sender.on_rto(now);
                    self.process_tcp_actions(client, actions);
                }
            }
        }
        true
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        info!("Starting simulation…");
        while self.step() {}
        self.time = self.time.max(self.end_time());
        self.monitor
            .check_for_lost_packets(self.time, from_secs(MAX_PER_HOP_DELAY_SECS));
        info!(
            "Simulation complete at {:.1}s: {} events, {} flows, drops {:?}",
            to_secs(self.time),
            self.events_processed,
            self.monitor.records().len(),
            self.drops
        );
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        let tuples = self.monitor.tuples();
        SimulationReport {
            config: self.config.clone(),
            params: self.params.clone(),
            transport: self.transport.clone(),
            duration_s: to_secs(self.time),
            events_processed: self.events_processed,
            server_address: self.topology.server_address(),
            stations: self.stations.clone(),
            drops: self.drops,
            flows: self
                .monitor
                .records()
                .iter()
                .filter_map(|(id, record)| {
                    tuples.get(id).map(|tuple| FlowTrace {
                        flow_id: *id,
                        classification: *tuple,
                        record: record.clone(),
                    })
                })
                .collect(),
            tcp: self
                .apps
                .iter()
                .filter_map(|(client, app)| match app {
                    ClientApp::Bulk { sender, sink } => Some(TcpTrace {
                        client: *client,
                        segments_acked: sender.acked(),
                        retransmissions: sender.retransmissions,
                        timeouts: sender.timeouts,
                        final_cwnd: sender.cwnd(),
                        bytes_received: sink.bytes_received,
                    }),
                    ClientApp::Cbr(_) => None,
                })
                .collect(),
        }
    }

    fn on_cbr_send(&mut self, client: u32) {
        let now = self.time;
        let Some(ClientApp::Cbr(cbr)) = self.apps.get_mut(&client) else {
            return;
        };
        let (payload, interval) = (cbr.payload, cbr.interval);
        let Some(destination) = self.client_endpoint(client) else {
            return;
        };

        let uid = self.next_uid();
        let packet = Packet::udp(uid, self.server_endpoint(client), destination, payload);
        self.originate(NodeId::Server, packet);

        let next = now + interval;
        if next < from_secs(self.config.window.stop) {
            self.push_event(next, EventType::CbrSend { client });
        }
    }

    fn process_tcp_actions(&mut self, client: u32, actions: Vec<TcpAction>) {
        for action in actions {
            match action {
                TcpAction::Send { seq, payload } => {
                    let Some(destination) = self.client_endpoint(client) else {
                        continue;
                    };
                    let uid = self.next_uid();
                    let packet = Packet::tcp(
                        uid,
                        self.server_endpoint(client),
                        destination,
                        payload,
                        TcpSegment::data(seq),
                    );
                    self.originate(NodeId::Server, packet);
                }
                TcpAction::ArmRto { delay } => {
                    let generation = self.rto_generations.entry(client).or_insert(0);
                    *generation += 1;
                    let generation = *generation;
                    self.push_event(
                        self.time + delay,
                        EventType::RtoExpiry { client, generation },
                    );
                }
                TcpAction::CancelRto => {
                    // Increment the generation to invalidate the pending expiry
                    *self.rto_generations.entry(client).or_insert(0) += 1;
                }
            }
        }
    }

    /// A packet is created at `node`: count it and send it on its way.
    fn originate(&mut self, node: NodeId, packet: Packet) {
        self.monitor.record_tx(&packet, self.time);
        self.forward(node, packet);
    }

    fn drop_packet(&mut self, packet: &Packet, reason: &str) {
        debug!(
            "Drop ({}) uid={} {} -> {} at {:.6}s",
            reason,
            packet.uid,
            packet.source,
            packet.destination,
            to_secs(self.time)
        );
        self.monitor.record_drop(packet);
    }

    fn forward(&mut self, at: NodeId, packet: Packet) {
        let Some(destination) = self.topology.node_for_address(packet.destination) else {
            self.drops.no_route += 1;
            self.drop_packet(&packet, "no route");
            return;
        };
        match self.topology.next_hop(at, destination) {
            None => self.deliver(at, packet),
            Some(Hop::Wired { to }) => self.send_wired(at, to, packet),
            Some(Hop::Wireless { .. }) => self.enqueue_wifi(at, packet),
        }
    }

    fn send_wired(&mut self, from: NodeId, to: NodeId, packet: Packet) {
        let tx_time = transmission_time(packet.ip_size(), self.params.link_rate_bps);
        let now = self.time;
        let limit = self.params.link_queue_packets as u64;
        let Some(link) = self.wired.get_mut(&(from, to)) else {
            self.drops.no_route += 1;
            self.drop_packet(&packet, "no link");
            return;
        };
        let backlog = link.busy_until.saturating_sub(now);
        if tx_time > 0 && backlog / tx_time >= limit {
            self.drops.wired_queue += 1;
            self.drop_packet(&packet, "wired queue full");
            return;
        }
        let start = link.busy_until.max(now);
        link.busy_until = start + tx_time;
        let arrival = link.busy_until + from_secs(self.params.link_delay);
        self.push_event(arrival, EventType::PacketArrival { node: to, packet });
    }

    fn enqueue_wifi(&mut self, node: NodeId, packet: Packet) {
        let limit = self.params.wifi_queue_packets;
        let Some(device) = self.wifi_devices.get_mut(&node) else {
            self.drops.no_route += 1;
            self.drop_packet(&packet, "no wireless interface");
            return;
        };
        if let Err(packet) = device.enqueue(packet, limit) {
            self.drops.wifi_queue += 1;
            self.drop_packet(&packet, "wifi queue full");
            return;
        }
        if !device.scheduled {
            device.scheduled = true;
            self.push_event(self.time, EventType::WifiTransmit { node });
        }
    }

    fn position_of(&self, node: NodeId) -> (f64, f64) {
        match node {
            NodeId::Station(i) => self
                .stations
                .get(i as usize)
                .map(|m| m.position_at(to_secs(self.time)))
                .unwrap_or(self.ap_position),
            _ => self.ap_position,
        }
    }

    fn on_wifi_transmit(&mut self, node: NodeId) {
        let now = self.time;

        if !self.medium.is_idle(now) {
            let backoff = self.rng.random_range(0..CONTENTION_WINDOW_SLOTS);
            let retry_at = self.medium.busy_until + backoff * from_secs(SLOT_SECS);
            self.push_event(retry_at, EventType::WifiTransmit { node });
            return;
        }

        let Some(packet) = self
            .wifi_devices
            .get_mut(&node)
            .and_then(|d| d.queue.pop_front())
        else {
            if let Some(device) = self.wifi_devices.get_mut(&node) {
                device.scheduled = false;
            }
            return;
        };

        let receiver = match node {
            NodeId::Station(_) => Some(NodeId::AccessPoint),
            _ => self.topology.node_for_address(packet.destination),
        };
        let Some(receiver) = receiver else {
            self.drops.no_route += 1;
            self.drop_packet(&packet, "unknown wireless receiver");
            self.reschedule_wifi(node, now);
            return;
        };

        let d = distance(self.position_of(node), self.position_of(receiver));
        let rx_power = self.propagation.rx_power_dbm(self.params.tx_power_dbm, d);
        let rate = select_rate(rx_power);
        let error_rate = frame_error_rate(rx_power, rate);
        let per_attempt = airtime(packet.ip_size(), rate);

        let mut elapsed = 0;
        let mut delivered = false;
        for _ in 0..self.params.wifi_max_attempts {
            elapsed += per_attempt;
            if self.rng.random::<f64>() >= error_rate {
                delivered = true;
                break;
            }
        }
        self.medium.busy_until = now + elapsed;

        if delivered {
            self.push_event(
                self.medium.busy_until,
                EventType::PacketArrival {
                    node: receiver,
                    packet,
                },
            );
        } else {
            self.drops.wifi_retry_limit += 1;
            self.drop_packet(&packet, "wifi retry limit");
        }
        self.reschedule_wifi(node, self.medium.busy_until);
    }

    fn reschedule_wifi(&mut self, node: NodeId, at: SimTime) {
        let Some(device) = self.wifi_devices.get_mut(&node) else {
            return;
        };
        if device.queue.is_empty() {
            device.scheduled = false;
        } else {
            self.push_event(at, EventType::WifiTransmit { node });
        }
    }

    fn on_arrival(&mut self, node: NodeId, packet: Packet) {
        self.forward(node, packet);
    }

    /// The packet reached the node owning its destination address.
    fn deliver(&mut self, node: NodeId, packet: Packet) {
        let now = self.time;
        self.monitor.record_rx(&packet, now);

        let Some(segment) = packet.tcp else {
            return;
        };
        match node {
            NodeId::Station(client) => {
                if now > self.sink_stop() {
                    return;
                }
                let Some(ClientApp::Bulk { sink, .. }) = self.apps.get_mut(&client) else {
                    return;
                };
                let ack = sink.on_segment(segment.seq, packet.payload);
                let uid = self.next_uid();
                let reply = Packet::tcp(
                    uid,
                    (packet.destination, packet.destination_port),
                    (packet.source, packet.source_port),
                    0,
                    TcpSegment::ack(ack),
                );
                self.originate(node, reply);
            }
            NodeId::Server if segment.is_ack() => {
                let Some(client) = packet.destination_port.checked_sub(EPHEMERAL_PORT_BASE) else {
                    return;
                };
                let client = client as u32;
                if let Some(ClientApp::Bulk { sender, .. }) = self.apps.get_mut(&client) {
                    let actions = sender.on_ack(segment.ack, now);
                    self.process_tcp_actions(client, actions);
                }
            }
            _ => {}
        }
    }
}
