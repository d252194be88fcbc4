/// Per-agent connection counters
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the hijacking connector on every new connection
#[derive(Debug, Default)]
pub struct AgentStats {
    /// Connection attempts seen by the connector
    connections: AtomicU64,
    /// Connections redirected to a replacement host
    hijacked: AtomicU64,
    /// Connections made to the requested host
    passthrough: AtomicU64,
    /// Connection attempts aborted by the resolver
    resolver_errors: AtomicU64,
}

impl AgentStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection redirected to a replacement host
    pub fn record_hijacked(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.hijacked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection left untouched
    pub fn record_passthrough(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.passthrough.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a resolver failure
    pub fn record_resolver_error(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.resolver_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        let connections = self.connections.load(Ordering::Relaxed);
        let hijacked = self.hijacked.load(Ordering::Relaxed);

        StatsSnapshot {
            connections,
            hijacked,
            passthrough: self.passthrough.load(Ordering::Relaxed),
            resolver_errors: self.resolver_errors.load(Ordering::Relaxed),
            hijack_rate: if connections > 0 {
                (hijacked as f64 / connections as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}

/// Snapshot of agent counters
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub connections: u64,
    pub hijacked: u64,
    pub passthrough: u64,
    pub resolver_errors: u64,
    pub hijack_rate: f64,
}
