//! Observability for agents and the orchestrator.
//!
//! An [`ObservabilitySink`] is injected into every component that emits
//! traces, metrics or logs. Nothing here is process-global: two sinks never
//! share buffers, and log entries are also forwarded to `tracing` for whatever
//! subscriber the application installs.
//!
//! # Example
//!
//! ```
//! use agentmesh::observability::{LogLevel, ObservabilitySink};
//!
//! let sink = ObservabilitySink::new(LogLevel::Info);
//! sink.trace("crop_agent", "process_start", None, None);
//! sink.record_metric("response_time_ms", 42.0, None);
//!
//! let dashboard = sink.dashboard();
//! assert_eq!(dashboard.traces_count, 1);
//! assert_eq!(dashboard.aggregate["response_time_ms"].count, 1);
//! ```

pub mod records;
pub mod sink;

pub use records::{Dashboard, LogEntry, LogLevel, MetricPoint, MetricSummary, TraceEvent};
pub use sink::{ObservabilitySink, Span};
