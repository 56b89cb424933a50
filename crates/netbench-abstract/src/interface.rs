use crate::flow::{FlowClassification, FlowId, RawFlowRecord};

/// Maps a flow identifier back to the addresses and protocol it was created for.
///
/// Any backend that tracks flows can implement this; closures work too, which is
/// handy for tests.
pub trait FlowClassifier {
    /// Returns `None` when the identifier is unknown to the classifier.
    fn classify(&self, flow: FlowId) -> Option<FlowClassification>;
}

impl<F> FlowClassifier for F
where
    F: Fn(FlowId) -> Option<FlowClassification>,
{
    fn classify(&self, flow: FlowId) -> Option<FlowClassification> {
        self(flow)
    }
}

/// Read-only view of the per-flow counters a finished run produced.
pub trait FlowStatsSource {
    /// Every observed flow with its counters, in ascending flow id order.
    fn flow_stats(&self) -> Vec<(FlowId, &RawFlowRecord)>;

    /// The classifier that knows the five-tuples of the flows above.
    fn classifier(&self) -> &dyn FlowClassifier;
}
