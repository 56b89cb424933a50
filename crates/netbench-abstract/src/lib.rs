pub mod config;
pub mod flow;
pub mod interface;
pub mod packet;
pub mod scenario;
pub mod traffic;

pub use config::{
    ConfigError, CongestionControl, ExperimentConfig, MeasurementWindow, ScenarioParams,
    TrafficMode, TransportDefaults,
};
pub use flow::{FlowClassification, FlowId, PROTO_TCP, PROTO_UDP, ProtocolLabel, RawFlowRecord};
pub use interface::{FlowClassifier, FlowStatsSource};
pub use packet::{Packet, TcpSegment};
pub use scenario::{ExperimentOverride, Scenario, ScenarioError, SweepMatrix};
pub use traffic::{ClientTrafficAssignment, TrafficShape, TransportKind};
