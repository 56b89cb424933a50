use crate::engine::DropCounters;
use crate::mobility::MobilityModel;
use netbench_abstract::{
    ExperimentConfig, FlowClassification, FlowId, RawFlowRecord, ScenarioParams,
    TransportDefaults,
};
use serde::Serialize;
use std::net::Ipv4Addr;

/// One monitored flow as it stood when the run ended.
#[derive(Debug, Clone, Serialize)]
pub struct FlowTrace {
    pub flow_id: FlowId,
    pub classification: FlowClassification,
    pub record: RawFlowRecord,
}

/// Sender and sink counters of one bulk-transfer client.
#[derive(Debug, Clone, Serialize)]
pub struct TcpTrace {
    pub client: u32,
    pub segments_acked: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub final_cwnd: f64,
    pub bytes_received: u64,
}

/// Everything a finished run knows, dumped as JSON by `--trace-out`.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: ExperimentConfig,
    pub params: ScenarioParams,
    pub transport: TransportDefaults,
    pub duration_s: f64,
    pub events_processed: u64,
    pub server_address: Ipv4Addr,
    pub stations: Vec<MobilityModel>,
    pub drops: DropCounters,
    pub flows: Vec<FlowTrace>,
    pub tcp: Vec<TcpTrace>,
}
