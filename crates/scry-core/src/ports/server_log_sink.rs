//! Log sink port for captured child output.

/// Port for appending child stdout/stderr lines to a sink.
///
/// Implementations should be thread-safe and non-blocking.
pub trait ServerLogSinkPort: Send + Sync {
    /// Append a log line.
    ///
    /// # Arguments
    ///
    /// * `source` - Name of the supervised process
    /// * `stream_type` - Either "stdout" or "stderr"
    /// * `line` - The line content (without trailing newline)
    fn append(&self, source: &str, stream_type: &str, line: String);
}
