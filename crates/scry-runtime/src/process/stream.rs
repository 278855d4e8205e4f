//! Async stream log readers (non-UTF8-safe).
//!
//! Child processes can emit non-UTF8 bytes on stdout/stderr, and
//! `BufReader::lines()` would end the reader task on the first one. Lines
//! are read as bytes and decoded lossily instead. Over-long lines are
//! truncated so a child that never prints a newline cannot grow the buffer
//! without bound.

use std::sync::Arc;

use scry_core::ports::{AppEventEmitter, ServerLogSinkPort};
use scry_core::AppEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Bytes kept per line; the remainder of a longer line is discarded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Where a captured line goes besides `tracing`.
#[derive(Clone, Default)]
pub struct LineTargets {
    pub sink: Option<Arc<dyn ServerLogSinkPort>>,
    /// Each line is re-emitted as a prompt-less `error` event.
    pub forward_as_error: Option<Arc<dyn AppEventEmitter>>,
}

pub fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    source: Arc<str>,
    stream_type: &'static str,
    targets: LineTargets,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match read_line_capped(&mut reader, &mut buf, MAX_LINE_BYTES).await {
                Ok(0) => break, // EOF
                Ok(read) => {
                    if read > buf.len() {
                        debug!(source = %source, %stream_type, bytes = read, "Truncated over-long line");
                    }
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    if buf.is_empty() {
                        continue;
                    }

                    let line = String::from_utf8_lossy(&buf).to_string();
                    debug!(source = %source, %stream_type, "{}: {}", stream_type, line);
                    if let Some(ref emitter) = targets.forward_as_error {
                        emitter.emit(AppEvent::Error {
                            prompt_id: None,
                            error: line.clone(),
                        });
                    }
                    if let Some(ref s) = targets.sink {
                        s.append(&source, stream_type, line);
                    }
                }
                Err(e) => {
                    debug!(source = %source, %stream_type, error = %e, "log stream reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(source = %source, %stream_type, "log stream reader task exiting");
    });
}

/// Like `read_until(b'\n')`, but keeps at most `max` bytes of the line in
/// `buf`. Returns the number of bytes consumed from the reader.
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(consumed);
        }
        let (len, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        let room = max.saturating_sub(buf.len());
        buf.extend_from_slice(&available[..len.min(room)]);
        reader.consume(len);
        consumed += len;
        if done {
            return Ok(consumed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CollectSink(Mutex<Vec<(String, String, String)>>);

    impl ServerLogSinkPort for CollectSink {
        fn append(&self, source: &str, stream_type: &str, line: String) {
            self.0
                .lock()
                .unwrap()
                .push((source.to_string(), stream_type.to_string(), line));
        }
    }

    #[tokio::test]
    async fn lines_reach_the_sink_lossily_decoded() {
        let sink = Arc::new(CollectSink::default());
        let input: &[u8] = b"first\r\nsec\xffond\n\nlast";

        spawn_stream_reader(
            input,
            Arc::from("inference"),
            "stderr",
            LineTargets {
                sink: Some(sink.clone()),
                forward_as_error: None,
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        let lines = sink.0.lock().unwrap().clone();
        let text: Vec<&str> = lines.iter().map(|(_, _, l)| l.as_str()).collect();
        assert_eq!(text, vec!["first", "sec\u{fffd}ond", "last"]);
        assert!(lines.iter().all(|(s, t, _)| s == "inference" && t == "stderr"));
    }

    #[tokio::test]
    async fn over_long_lines_are_truncated() {
        let sink = Arc::new(CollectSink::default());
        let mut input = vec![b'a'; MAX_LINE_BYTES + 500];
        input.extend_from_slice(b"\nnext\n");

        spawn_stream_reader(
            std::io::Cursor::new(input),
            Arc::from("control"),
            "stdout",
            LineTargets {
                sink: Some(sink.clone()),
                forward_as_error: None,
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        let lines = sink.0.lock().unwrap().clone();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].2.len(), MAX_LINE_BYTES);
        assert_eq!(lines[1].2, "next");
    }
}
