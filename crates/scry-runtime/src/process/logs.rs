//! Recent child output kept in memory.
//!
//! An owned ring buffer per source, so a front end can show the tail of a
//! service's output after it failed. Implements [`ServerLogSinkPort`] and
//! is handed to supervisors at construction.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use scry_core::ports::ServerLogSinkPort;

/// Lines kept per source.
pub const DEFAULT_CAPACITY: usize = 2000;

/// One captured line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLogEntry {
    pub timestamp: DateTime<Utc>,
    pub stream: String,
    pub line: String,
}

pub struct ServerLogBuffer {
    capacity: usize,
    buffers: RwLock<HashMap<String, VecDeque<ServerLogEntry>>>,
}

impl ServerLogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Up to `limit` most recent lines of `source`, oldest first.
    pub fn recent(&self, source: &str, limit: usize) -> Vec<ServerLogEntry> {
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        buffers
            .get(source)
            .map(|lines| {
                let skip = lines.len().saturating_sub(limit);
                lines.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn sources(&self) -> Vec<String> {
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        let mut sources: Vec<String> = buffers.keys().cloned().collect();
        sources.sort();
        sources
    }

    pub fn clear(&self, source: &str) {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source);
    }
}

impl Default for ServerLogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerLogSinkPort for ServerLogBuffer {
    fn append(&self, source: &str, stream_type: &str, line: String) {
        let entry = ServerLogEntry {
            timestamp: Utc::now(),
            stream: stream_type.to_string(),
            line,
        };
        let mut buffers = self.buffers.write().unwrap_or_else(PoisonError::into_inner);
        let lines = buffers.entry(source.to_string()).or_default();
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_tail() {
        let logs = ServerLogBuffer::with_capacity(3);
        for i in 0..5 {
            logs.append("inference", "stdout", format!("line {i}"));
        }
        let lines: Vec<String> = logs
            .recent("inference", 10)
            .into_iter()
            .map(|e| e.line)
            .collect();
        assert_eq!(lines, ["line 2", "line 3", "line 4"]);
        assert_eq!(logs.recent("inference", 1)[0].line, "line 4");
    }

    #[test]
    fn sources_are_kept_apart() {
        let logs = ServerLogBuffer::new();
        logs.append("control", "stderr", "boom".to_string());
        logs.append("transfer", "stdout", "ok".to_string());

        assert_eq!(logs.sources(), ["control", "transfer"]);
        assert_eq!(logs.recent("control", 5)[0].stream, "stderr");

        logs.clear("control");
        assert!(logs.recent("control", 5).is_empty());
    }
}
