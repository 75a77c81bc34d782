//! The capability interface every backend implements.
//!
//! A [`HidBackend`] finds and opens the first device matching some
//! [`MatchCriteria`]; the [`Connection`] it returns owns the OS resource until
//! it is closed or dropped.
//!
//! ## Contract
//! - [`Connection::read`] returns `Ok(n)` with `n > 0` for one report, `Ok(0)`
//!   when the timeout elapsed with no data, or `Err(HidError::Disconnected)`.
//!   Reports are never split across reads: a report larger than the buffer is
//!   truncated and the remainder discarded.
//! - Disconnection is one-way. After `Disconnected`, every later `read` and
//!   `write` on the same connection returns `Disconnected` without touching
//!   the device again.
//! - [`Connection::write`] sends one output report, `data[0]` being the report
//!   ID (`0` when reports are not numbered). Anything short of the whole
//!   report is an error.
//! - Nothing here is synchronised. A connection belongs to one caller and is
//!   used from one thread at a time.

use crate::error::{HidError, Result};
use crate::matching::MatchCriteria;
use crate::metadata::DeviceAttributes;
use std::time::Duration;

/// Outcome of a best-effort liveness probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Online,
    /// Removed, failed, or (on some backends) not determinable.
    Offline,
}

/// Host-specific device discovery.
pub trait HidBackend {
    type Connection: Connection;

    /// Scans the present HID devices and opens the first one that satisfies
    /// `criteria`.
    ///
    /// Candidates that cannot be probed or opened are skipped. Returns
    /// [`HidError::NotFound`] once the scan is exhausted without a match, or
    /// [`HidError::Unavailable`] when a matching device was found but the host
    /// ran out of resources opening it.
    fn open_first_match(&self, criteria: &MatchCriteria) -> Result<Self::Connection>;
}

/// An open, exclusively owned device.
///
/// Dropping a connection releases the OS resource; [`Connection::close`] is
/// the explicit spelling of that and consumes the connection, so a second
/// close cannot be written.
pub trait Connection {
    /// Attributes of the device this connection was opened on.
    fn attributes(&self) -> &DeviceAttributes;

    /// Waits up to `timeout` for one input report and copies it into `buf`.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Sends one output report, all or nothing.
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<()>;

    /// Best-effort liveness probe. Never fails.
    fn status(&mut self) -> Status;

    /// Releases the device.
    fn close(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// Why a scan ended without a connection.
///
/// Backends note resource failures on matching candidates as they go and keep
/// scanning; whatever was noted last becomes the scan's error.
#[derive(Debug, Default)]
pub(crate) struct ScanMiss {
    exhausted: Option<HidError>,
}

impl ScanMiss {
    pub(crate) fn exhausted(&mut self, e: HidError) {
        self.exhausted = Some(e);
    }

    pub(crate) fn into_error(self) -> HidError {
        self.exhausted.unwrap_or(HidError::NotFound)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scan_miss() {
        assert_eq!(ScanMiss::default().into_error(), HidError::NotFound);

        let mut miss = ScanMiss::default();
        miss.exhausted(HidError::Unavailable("no event handles".into()));
        let e = miss.into_error();
        assert_eq!(e, HidError::Unavailable("no event handles".into()));
        assert!(e.is_not_found());
    }
}
