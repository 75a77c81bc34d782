//! The debug-message listener loop.
//!
//! Waits for a matching device, streams its input reports as text until it
//! disconnects, then goes back to waiting. Output goes through a
//! [`ListenSink`] so the loop can drive a console, a log, or a test.
//!
//! Device text is sent zero-padded to the report size, so every `0x00` byte
//! is dropped before a payload reaches the sink.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ListenConfig;
use crate::device::{Connection, HidBackend};
use crate::error::HidError;
use crate::matching::MatchCriteria;
use crate::metadata::DeviceAttributes;
use crate::{DEFAULT_REPORT_SIZE, DEBUG_USAGE, DEBUG_USAGE_PAGE};

/// Longest uninterrupted sleep while waiting, so a stop request is noticed promptly.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Drops every `0x00` byte, keeping the rest in order.
pub fn strip_nulls(data: &[u8]) -> Vec<u8> {
    data.iter().copied().filter(|&b| b != 0).collect()
}

/// Receives listener progress.
pub trait ListenSink {
    /// Once, before the first open attempt.
    fn started(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// After every open attempt that found nothing.
    fn waiting(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn connected(&mut self, _attrs: &DeviceAttributes) -> io::Result<()> {
        Ok(())
    }

    /// Null-stripped report text. Never empty.
    fn payload(&mut self, data: &[u8]) -> io::Result<()>;

    /// After the connection has been closed.
    fn disconnected(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// How [`Listener::stream`] finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    Disconnected,
    Stopped,
}

#[derive(Debug)]
pub struct Listener<B> {
    backend: B,
    criteria: MatchCriteria,
    read_timeout: Duration,
    poll_interval: Duration,
    report_size: usize,
}

impl<B: HidBackend> Listener<B> {
    /// A listener for the PJRC debug interface with the stock timings.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            criteria: MatchCriteria::any()
                .usage_page(DEBUG_USAGE_PAGE)
                .usage(DEBUG_USAGE),
            read_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_secs(1),
            report_size: DEFAULT_REPORT_SIZE,
        }
    }

    pub fn from_config(backend: B, config: &ListenConfig) -> Self {
        Self::new(backend)
            .criteria(config.criteria())
            .read_timeout(config.read_timeout())
            .poll_interval(config.poll_interval())
            .report_size(config.report_size)
    }

    pub fn criteria(mut self, criteria: MatchCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Buffer capacity per read. Clamped to at least one byte.
    pub fn report_size(mut self, size: usize) -> Self {
        self.report_size = size.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Tries to open a matching device every `poll_interval` until one opens
    /// or `stop` is set. Returns `None` when stopped.
    pub fn wait_for_device<S: ListenSink + ?Sized>(
        &self,
        sink: &mut S,
        stop: &AtomicBool,
    ) -> io::Result<Option<B::Connection>> {
        loop {
            if stop.load(Ordering::Relaxed) {
                return Ok(None);
            }
            match self.backend.open_first_match(&self.criteria) {
                Ok(conn) => return Ok(Some(conn)),
                Err(HidError::NotFound) => debug!("no device yet"),
                Err(e) => warn!("open failed: {e}"),
            }
            sink.waiting()?;
            pause(self.poll_interval, stop);
        }
    }

    /// Forwards reports from `conn` to `sink` until the device disconnects
    /// or `stop` is set. The connection is closed either way.
    pub fn stream<S: ListenSink + ?Sized>(
        &self,
        mut conn: B::Connection,
        sink: &mut S,
        stop: &AtomicBool,
    ) -> io::Result<StreamEnd> {
        sink.connected(conn.attributes())?;
        let mut buf = vec![0u8; self.report_size];
        loop {
            if stop.load(Ordering::Relaxed) {
                conn.close();
                return Ok(StreamEnd::Stopped);
            }
            match conn.read(&mut buf, self.read_timeout) {
                Ok(0) => {}
                Ok(n) => {
                    let text = strip_nulls(&buf[..n]);
                    if !text.is_empty() {
                        sink.payload(&text)?;
                    }
                }
                Err(e) => {
                    if !e.is_disconnect() {
                        warn!("read failed: {e}");
                    }
                    conn.close();
                    sink.disconnected()?;
                    return Ok(StreamEnd::Disconnected);
                }
            }
        }
    }

    /// Waits, streams, and waits again, until `stop` is set.
    pub fn run<S: ListenSink + ?Sized>(&self, sink: &mut S, stop: &AtomicBool) -> io::Result<()> {
        sink.started()?;
        while let Some(conn) = self.wait_for_device(sink, stop)? {
            info!("listening to {}", conn.attributes());
            if self.stream(conn, sink, stop)? == StreamEnd::Stopped {
                break;
            }
        }
        Ok(())
    }
}

/// Sleeps for `d`, waking early once `stop` is set.
fn pause(d: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + d;
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(STOP_CHECK_INTERVAL));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nulls_are_dropped() {
        assert_eq!(strip_nulls(b"A\0B\0\0C"), b"ABC");
        assert_eq!(strip_nulls(b"\0\0\0"), b"");
        assert_eq!(strip_nulls(b""), b"");
        assert_eq!(strip_nulls(b"plain text\n"), b"plain text\n");
    }

    #[test]
    fn pause_returns_early_when_stopped() {
        let stop = AtomicBool::new(true);
        let start = Instant::now();
        pause(Duration::from_secs(10), &stop);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
