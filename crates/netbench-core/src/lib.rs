//! Traffic assignment and flow statistics reduction.
//!
//! The pipeline after a run is `aggregate` (per-flow metrics and running
//! totals), then `reduce` (headline metrics), then `report`.

pub mod aggregate;
pub mod assignment;
pub mod reduce;
pub mod report;
pub mod summary;

pub use aggregate::{AggregateTotals, FlowAggregation, FlowMetrics, aggregate};
pub use assignment::{assign, assign_all};
pub use reduce::{AggregateMetrics, reduce};
pub use report::{ExperimentReport, ReportError, ReportRecord};
pub use summary::{GroupKey, GroupSummary, summarize};
