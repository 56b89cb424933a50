pub mod apps;
pub mod engine;
pub mod flowmon;
pub mod mobility;
pub mod time;
pub mod topology;
pub mod trace;
pub mod wifi;

pub use engine::{DropCounters, Simulator};
pub use flowmon::FlowMonitor;
pub use topology::{NodeId, Topology};
pub use trace::SimulationReport;
