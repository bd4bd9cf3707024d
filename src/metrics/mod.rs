//! Prometheus metrics for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Connect attempts, successful or not
    pub connect_attempts: AtomicU64,
    /// Connect attempts that failed
    pub connect_failures: AtomicU64,
    /// Tool calls forwarded to MCP servers
    pub remote_tool_calls: AtomicU64,
    /// Forwarded tool calls that failed
    pub remote_tool_failures: AtomicU64,
    /// Built-in tool calls
    pub local_tool_calls: AtomicU64,
    /// Built-in tool calls that failed
    pub local_tool_failures: AtomicU64,
    /// Cumulative time spent in forwarded tool calls
    pub remote_tool_millis: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_connect_attempts(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_connect_failures(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one forwarded tool call.
    pub fn record_remote_call(&self, timer: &Timer, ok: bool) {
        self.remote_tool_calls.fetch_add(1, Ordering::Relaxed);
        self.remote_tool_millis
            .fetch_add(timer.elapsed_ms(), Ordering::Relaxed);
        if !ok {
            self.remote_tool_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one built-in tool call.
    pub fn record_local_call(&self, ok: bool) {
        self.local_tool_calls.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.local_tool_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get all counters as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            remote_tool_calls: self.remote_tool_calls.load(Ordering::Relaxed),
            remote_tool_failures: self.remote_tool_failures.load(Ordering::Relaxed),
            local_tool_calls: self.local_tool_calls.load(Ordering::Relaxed),
            local_tool_failures: self.local_tool_failures.load(Ordering::Relaxed),
            remote_tool_millis: self.remote_tool_millis.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    ///
    /// Gauges describing the registry are sampled by the caller and passed in.
    pub fn to_prometheus(&self, registered_servers: usize, connected_servers: usize) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP mcp_hub_connect_attempts_total Connect attempts
# TYPE mcp_hub_connect_attempts_total counter
mcp_hub_connect_attempts_total {}

# HELP mcp_hub_connect_failures_total Failed connect attempts
# TYPE mcp_hub_connect_failures_total counter
mcp_hub_connect_failures_total {}

# HELP mcp_hub_remote_tool_calls_total Tool calls forwarded to MCP servers
# TYPE mcp_hub_remote_tool_calls_total counter
mcp_hub_remote_tool_calls_total {}

# HELP mcp_hub_remote_tool_failures_total Forwarded tool calls that failed
# TYPE mcp_hub_remote_tool_failures_total counter
mcp_hub_remote_tool_failures_total {}

# HELP mcp_hub_remote_tool_duration_ms_total Time spent in forwarded tool calls
# TYPE mcp_hub_remote_tool_duration_ms_total counter
mcp_hub_remote_tool_duration_ms_total {}

# HELP mcp_hub_local_tool_calls_total Built-in tool calls
# TYPE mcp_hub_local_tool_calls_total counter
mcp_hub_local_tool_calls_total {}

# HELP mcp_hub_local_tool_failures_total Built-in tool calls that failed
# TYPE mcp_hub_local_tool_failures_total counter
mcp_hub_local_tool_failures_total {}

# HELP mcp_hub_registered_servers Registered MCP servers
# TYPE mcp_hub_registered_servers gauge
mcp_hub_registered_servers {}

# HELP mcp_hub_connected_servers Connected MCP servers
# TYPE mcp_hub_connected_servers gauge
mcp_hub_connected_servers {}
"#,
            s.connect_attempts,
            s.connect_failures,
            s.remote_tool_calls,
            s.remote_tool_failures,
            s.remote_tool_millis,
            s.local_tool_calls,
            s.local_tool_failures,
            registered_servers,
            connected_servers
        )
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub remote_tool_calls: u64,
    pub remote_tool_failures: u64,
    pub local_tool_calls: u64,
    pub local_tool_failures: u64,
    pub remote_tool_millis: u64,
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
