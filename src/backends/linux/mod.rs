//! Linux [hidraw] backend.
//!
//! Every `/dev/hidrawN` node is opened in turn and interrogated with ioctls:
//! `HIDIOCGRAWINFO` for vendor/product, and (only when the criteria ask about
//! usage) `HIDIOCGRDESCSIZE` + `HIDIOCGRDESC` for the report descriptor, whose
//! leading usage items stand in for the capability data hidraw does not
//! expose. The first node that matches keeps its descriptor as the connection.
//!
//! hidraw has no exclusive-open mode; access control is whatever the node's
//! permissions (usually set by udev rules) allow.
//!
//! Reads and writes run on a non-blocking descriptor and wait in `poll(2)`,
//! so every call is bounded by its timeout. `EINTR`/`EAGAIN` are retried.
//!
//! Status policy: re-issue `HIDIOCGRAWINFO` on the open descriptor; the kernel
//! fails it with `ENODEV` once the device is gone.
//!
//! [hidraw]: https://www.kernel.org/doc/Documentation/hid/hidraw.txt

mod ioctl;

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Write},
    os::{
        fd::{AsFd, AsRawFd},
        unix::fs::OpenOptionsExt,
    },
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    libc,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};
use tracing::{debug, info, trace, warn};

use self::ioctl::{
    hid_ioc_raw_info, hid_ioc_rd_desc, hid_ioc_rd_desc_size, hidraw_devinfo,
    hidraw_report_descriptor, HID_MAX_DESCRIPTOR_SIZE,
};
use crate::{
    descriptor::leading_usage,
    device::{Connection, HidBackend, Status},
    error::{HidError, Result},
    matching::MatchCriteria,
    metadata::DeviceAttributes,
};

const DEV_DIR: &str = "/dev";

/// Parses the minor number out of a `hidrawN` node name.
fn hidraw_index(name: &str) -> Option<u32> {
    name.strip_prefix("hidraw")?.parse().ok()
}

/// Errors after which the descriptor will never work again.
fn is_gone(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::ENODEV | libc::EIO | libc::ENXIO | libc::ESHUTDOWN | libc::EPIPE)
    )
}

#[derive(Debug, Default)]
pub struct HidrawBackend;

impl HidrawBackend {
    pub fn new() -> Self {
        Self
    }

    fn nodes(&self) -> io::Result<Vec<PathBuf>> {
        let mut nodes: Vec<(u32, PathBuf)> = fs::read_dir(DEV_DIR)?
            .flatten()
            .filter_map(|entry| {
                let index = hidraw_index(entry.file_name().to_str()?)?;
                Some((index, entry.path()))
            })
            .collect();
        nodes.sort_by_key(|(index, _)| *index);
        Ok(nodes.into_iter().map(|(_, path)| path).collect())
    }

    /// Opens `path` and checks it against `criteria`.
    ///
    /// Returns `None` on any failure or mismatch. The probe descriptor is
    /// dropped (closed) on every such path.
    fn probe(path: &Path, criteria: &MatchCriteria) -> Option<(File, DeviceAttributes)> {
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
        {
            Ok(f) => f,
            Err(e) => {
                // Usually other input devices we have no permission for.
                debug!("cannot open {path:?}: {e}");
                return None;
            }
        };

        let mut info = hidraw_devinfo::default();
        if let Err(e) = unsafe { hid_ioc_raw_info(file.as_raw_fd(), &mut info) } {
            debug!("{path:?}: HIDIOCGRAWINFO failed: {e}");
            return None;
        }

        // The userspace API declares these signed.
        let mut attrs =
            DeviceAttributes::new(info.vendor as u16, info.product as u16).with_path(path.to_string_lossy());
        trace!("candidate {attrs}");
        if !criteria.matches_ids(attrs.vendor_id, attrs.product_id) {
            return None;
        }

        if criteria.wants_usage() {
            let descriptor = Self::read_descriptor(&file, path)?;
            let (usage_page, usage) = leading_usage(descriptor.get_value());
            attrs.usage_page = usage_page;
            attrs.usage = usage;
            if !criteria.matches_usage(usage_page, usage) {
                return None;
            }
        }

        Some((file, attrs))
    }

    fn read_descriptor(file: &File, path: &Path) -> Option<Box<hidraw_report_descriptor>> {
        let mut size: libc::c_int = 0;
        if let Err(e) = unsafe { hid_ioc_rd_desc_size(file.as_raw_fd(), &mut size) } {
            debug!("{path:?}: HIDIOCGRDESCSIZE failed: {e}");
            return None;
        }
        if size < 1 {
            return None;
        }

        let mut descriptor = Box::<hidraw_report_descriptor>::default();
        descriptor.size = (size as u32).min(HID_MAX_DESCRIPTOR_SIZE as u32);
        if let Err(e) = unsafe { hid_ioc_rd_desc(file.as_raw_fd(), &mut *descriptor) } {
            debug!("{path:?}: HIDIOCGRDESC failed: {e}");
            return None;
        }
        Some(descriptor)
    }
}

impl HidBackend for HidrawBackend {
    type Connection = HidrawConnection;

    fn open_first_match(&self, criteria: &MatchCriteria) -> Result<HidrawConnection> {
        let nodes = self.nodes().map_err(|e| {
            warn!("cannot list {DEV_DIR}: {e}");
            HidError::Unavailable(e.to_string())
        })?;

        for path in nodes {
            if let Some((file, attrs)) = Self::probe(&path, criteria) {
                info!("opened {attrs}");
                return Ok(HidrawConnection {
                    file,
                    attrs,
                    alive: true,
                });
            }
        }
        Err(HidError::NotFound)
    }
}

#[derive(Debug)]
pub struct HidrawConnection {
    file: File,
    attrs: DeviceAttributes,
    alive: bool,
}

enum Readiness {
    Ready,
    TimedOut,
}

impl HidrawConnection {
    fn lost(&mut self, why: &dyn std::fmt::Display) -> HidError {
        if self.alive {
            info!("{} disconnected: {why}", self.attrs);
        }
        self.alive = false;
        HidError::Disconnected
    }

    /// Waits for `events` on the descriptor for at most `timeout`.
    fn wait(&mut self, events: PollFlags, timeout: Duration) -> Result<Readiness> {
        // Round up so a sub-millisecond remainder does not spin.
        let ms = timeout
            .as_micros()
            .div_ceil(1000)
            .min(libc::c_int::MAX as u128) as libc::c_int;
        let timeout = PollTimeout::try_from(ms).unwrap_or(PollTimeout::NONE);

        let polled = {
            let mut fds = [PollFd::new(self.file.as_fd(), events)];
            poll(&mut fds, timeout).map(|n| (n, fds[0].revents().unwrap_or(PollFlags::empty())))
        };
        match polled {
            // The caller recomputes the remaining time and retries.
            Err(Errno::EINTR) => Ok(Readiness::Ready),
            Err(e) => Err(self.lost(&e)),
            Ok((0, _)) => Ok(Readiness::TimedOut),
            Ok((_, revents)) => {
                let broken = PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL;
                if revents.intersects(broken) && !revents.intersects(events) {
                    return Err(self.lost(&"hangup"));
                }
                Ok(Readiness::Ready)
            }
        }
    }
}

impl Connection for HidrawConnection {
    fn attributes(&self) -> &DeviceAttributes {
        &self.attrs
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.alive {
            return Err(HidError::Disconnected);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let deadline = Instant::now() + timeout;
        loop {
            // hidraw hands out one whole report per read() and drops whatever
            // did not fit in `buf`.
            match self.file.read(buf) {
                Ok(0) => return Err(self.lost(&"end of file")),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(self.lost(&e)),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(0);
            }
            if let Readiness::TimedOut = self.wait(PollFlags::POLLIN, remaining)? {
                return Ok(0);
            }
        }
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        if !self.alive {
            return Err(HidError::Disconnected);
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.file.write(data) {
                Ok(n) if n == data.len() => return Ok(()),
                Ok(n) => {
                    warn!("incomplete write: wrote {n} of {} bytes", data.len());
                    return Err(HidError::ShortWrite {
                        written: n,
                        expected: data.len(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if is_gone(&e) => return Err(self.lost(&e)),
                Err(e) => return Err(HidError::Io(e.to_string())),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(HidError::Timeout);
            }
            if let Readiness::TimedOut = self.wait(PollFlags::POLLOUT, remaining)? {
                return Err(HidError::Timeout);
            }
        }
    }

    fn status(&mut self) -> Status {
        if !self.alive {
            return Status::Offline;
        }
        let mut info = hidraw_devinfo::default();
        match unsafe { hid_ioc_raw_info(self.file.as_raw_fd(), &mut info) } {
            Ok(_) => Status::Online,
            Err(e) => {
                self.lost(&e);
                Status::Offline
            }
        }
    }
}

impl Drop for HidrawConnection {
    fn drop(&mut self) {
        trace!("closing {}", self.attrs);
    }
}
