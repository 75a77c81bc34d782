//! Portable backend over the [`hidapi`] crate (cargo feature `hidapi`).
//!
//! Replaces the native backend for the build when enabled. hidapi offers no
//! liveness probe, so status is "online until a read fails". A failed write
//! is reported as [`HidError::Io`] and leaves the connection usable.
//! `hid_write` has no timeout either; the `timeout` passed to
//! [`Connection::write`] is not applied.

use hidapi::{DeviceInfo, HidApi, HidDevice};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::device::{Connection, HidBackend, Status};
use crate::error::{HidError, Result};
use crate::matching::MatchCriteria;
use crate::metadata::DeviceAttributes;

fn attributes(info: &DeviceInfo) -> DeviceAttributes {
    DeviceAttributes::new(info.vendor_id(), info.product_id())
        .with_usage(Some(info.usage_page()), Some(info.usage()))
        .with_path(info.path().to_string_lossy())
}

/// hidapi-backed discovery. The library context is created on first use and
/// its device list refreshed on every scan.
#[derive(Default)]
pub struct HidApiBackend {
    api: Mutex<Option<HidApi>>,
}

impl HidApiBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HidBackend for HidApiBackend {
    type Connection = HidApiConnection;

    fn open_first_match(&self, criteria: &MatchCriteria) -> Result<HidApiConnection> {
        let mut guard = self.api.lock();
        match guard.as_mut() {
            Some(api) => api.refresh_devices().map_err(|e| {
                warn!("hidapi refresh failed: {e}");
                HidError::Unavailable(e.to_string())
            })?,
            None => {
                *guard = Some(HidApi::new().map_err(|e| {
                    warn!("hidapi init failed: {e}");
                    HidError::Unavailable(e.to_string())
                })?)
            }
        }
        let Some(api) = guard.as_ref() else {
            return Err(HidError::NotFound);
        };

        for info in api.device_list() {
            let attrs = attributes(info);
            trace!("candidate {attrs}");
            if !criteria.matches(&attrs) {
                continue;
            }
            match info.open_device(api) {
                Ok(raw) => {
                    info!("opened {attrs}");
                    return Ok(HidApiConnection {
                        raw,
                        attrs,
                        alive: true,
                    });
                }
                Err(e) => debug!("skipping {attrs}: {e}"),
            }
        }
        Err(HidError::NotFound)
    }
}

fn write_error(e: &hidapi::HidError) -> HidError {
    warn!("write failed: {e}");
    HidError::Io(e.to_string())
}

pub struct HidApiConnection {
    raw: HidDevice,
    attrs: DeviceAttributes,
    alive: bool,
}

impl HidApiConnection {
    fn lost(&mut self, why: &hidapi::HidError) -> HidError {
        if self.alive {
            info!("{} disconnected: {why}", self.attrs);
        }
        self.alive = false;
        HidError::Disconnected
    }
}

impl Connection for HidApiConnection {
    fn attributes(&self) -> &DeviceAttributes {
        &self.attrs
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.alive {
            return Err(HidError::Disconnected);
        }
        let ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        match self.raw.read_timeout(buf, ms) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.lost(&e)),
        }
    }

    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<()> {
        if !self.alive {
            return Err(HidError::Disconnected);
        }
        match self.raw.write(data) {
            Ok(n) if n >= data.len() => Ok(()),
            Ok(n) => {
                warn!("incomplete write: wrote {n} of {} bytes", data.len());
                Err(HidError::ShortWrite {
                    written: n,
                    expected: data.len(),
                })
            }
            // hidapi does not tell a rejected report from a vanished device;
            // the next read settles which it was.
            Err(e) => Err(write_error(&e)),
        }
    }

    fn status(&mut self) -> Status {
        if self.alive {
            Status::Online
        } else {
            Status::Offline
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejected_write_is_not_a_disconnect() {
        let e = write_error(&hidapi::HidError::InvalidZeroSizeData);
        assert!(matches!(e, HidError::Io(_)), "got {e:?}");
        assert!(!e.is_disconnect());
    }
}
