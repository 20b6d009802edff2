//! Telemetry sink interface and in-memory collector
//!
//! The execution engine emits one record per tool invocation. The sink is a
//! fire-and-forget collaborator: recording must never block or fail tool
//! execution, and records arrive pre-sanitized.

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One structured execution record
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// Tool name
    pub tool: String,

    /// Whether the invocation succeeded
    pub success: bool,

    /// Execution duration
    pub duration: Duration,
}

/// Sink for pre-sanitized structured events. Storage and formatting live
/// outside the core.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, record: ExecutionRecord);
}

/// Sink that drops every record
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _record: ExecutionRecord) {}
}

/// Aggregate statistics over recorded executions
#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_duration_ms: u64,
}

impl TelemetryStats {
    pub fn success_rate(&self) -> f64 {
        if self.executed == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.executed as f64
        }
    }
}

/// In-memory collector, cloneable across tasks
#[derive(Clone, Default)]
pub struct TelemetryCollector {
    records: Arc<Mutex<Vec<ExecutionRecord>>>,
    stats: Arc<Mutex<TelemetryStats>>,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TelemetryStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Most recent `n` records
    pub fn recent(&self, n: usize) -> Vec<ExecutionRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let start = records.len().saturating_sub(n);
        records[start..].to_vec()
    }
}

impl TelemetrySink for TelemetryCollector {
    fn record(&self, record: ExecutionRecord) {
        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.executed += 1;
            if record.success {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
            stats.total_duration_ms += record.duration.as_millis() as u64;
        }

        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(record);
    }
}
