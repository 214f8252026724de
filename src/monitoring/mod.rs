//! Monitoring Module
//!
//! Audit trail and execution timeline of workflow runs.
//!
//! # Components
//!
//! - [`AuditSink`]: Append-only record of every decision point
//! - [`ExecutionTimeline`]: Step start/end timing for Gantt charts

pub mod audit;
pub mod timeline;

pub use audit::{AuditEntry, AuditSink, JsonLinesAuditSink, MemoryAuditSink};
pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
