#![cfg(target_os = "windows")]

//! Windows HID connection.
//!
//! [`WinHidConnection`] owns the overlapped device handle plus one
//! manual-reset event. It is responsible for:
//! - bounding each `ReadFile`/`WriteFile` by the caller's timeout
//! - cancelling a timed-out transfer and waiting for the cancellation to land,
//!   so no I/O is ever left in flight against a buffer we no longer own
//! - splitting off the `[report_id]` byte Windows always prepends, when it is 0
//! - padding output reports to the length the device declared
//!
//! This module does **not** parse report contents.

use std::ptr::{null, null_mut};
use std::time::Duration;

use tracing::{info, trace, warn};
use windows_sys::Win32::Foundation::{
    GetLastError, BOOL, ERROR_BAD_COMMAND, ERROR_DEVICE_NOT_CONNECTED, ERROR_DEVICE_REMOVED,
    ERROR_FILE_NOT_FOUND, ERROR_GEN_FAILURE, ERROR_INVALID_HANDLE, ERROR_IO_PENDING,
    ERROR_NO_SUCH_DEVICE, ERROR_OPERATION_ABORTED, FALSE, TRUE, WAIT_OBJECT_0,
};
use windows_sys::Win32::Storage::FileSystem::{ReadFile, WriteFile};
use windows_sys::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};
use windows_sys::Win32::System::Threading::{CreateEventW, ResetEvent, WaitForSingleObject};

use super::discovery::ReportLengths;
use super::{OwnedHandle, PreparsedData};
use crate::device::{Connection, Status};
use crate::error::{HidError, Result};
use crate::metadata::DeviceAttributes;

/// Removes the leading report ID when it is 0 (unnumbered reports).
///
/// Numbered reports keep their ID byte, as they do on hidraw and IOKit.
#[inline]
fn strip_report_id(report: &[u8]) -> &[u8] {
    match report.split_first() {
        Some((0, payload)) => payload,
        _ => report,
    }
}

/// Errors the class driver returns once the device is gone.
fn is_gone(code: u32) -> bool {
    matches!(
        code,
        ERROR_DEVICE_NOT_CONNECTED
            | ERROR_DEVICE_REMOVED
            | ERROR_NO_SUCH_DEVICE
            | ERROR_FILE_NOT_FOUND
            | ERROR_INVALID_HANDLE
            | ERROR_BAD_COMMAND
            | ERROR_GEN_FAILURE
    )
}

/// Milliseconds for `WaitForSingleObject`, rounded up and kept below `INFINITE`.
fn wait_ms(timeout: Duration) -> u32 {
    timeout.as_micros().div_ceil(1000).min(u128::from(u32::MAX - 1)) as u32
}

enum Completion {
    Done(usize),
    TimedOut,
}

pub struct WinHidConnection {
    handle: OwnedHandle,
    event: OwnedHandle,
    overlapped: Box<OVERLAPPED>,
    /// Exactly the declared input report length (including the ID byte).
    input: Vec<u8>,
    output_len: usize,
    attrs: DeviceAttributes,
    alive: bool,
}

// SAFETY: kernel handles are not tied to the thread that opened them, and the
// OVERLAPPED block is never shared outside `&mut self` calls.
unsafe impl Send for WinHidConnection {}

impl WinHidConnection {
    pub(crate) fn new(
        handle: OwnedHandle,
        attrs: DeviceAttributes,
        lengths: ReportLengths,
    ) -> Result<Self> {
        let event = unsafe { CreateEventW(null(), TRUE, FALSE, null()) };
        let event = OwnedHandle::new(event).ok_or_else(|| {
            HidError::Unavailable(format!("CreateEventW failed: error {}", unsafe {
                GetLastError()
            }))
        })?;

        Ok(Self {
            handle,
            event,
            overlapped: Box::new(unsafe { std::mem::zeroed() }),
            input: vec![0u8; lengths.input],
            output_len: lengths.output,
            attrs,
            alive: true,
        })
    }

    fn lost(&mut self, code: u32) -> HidError {
        if self.alive {
            info!("{} disconnected: error {code}", self.attrs);
        }
        self.alive = false;
        HidError::Disconnected
    }

    /// Resets the event and the OVERLAPPED block for a new transfer.
    fn arm(&mut self) {
        unsafe { ResetEvent(self.event.raw()) };
        *self.overlapped = unsafe { std::mem::zeroed() };
        self.overlapped.hEvent = self.event.raw();
    }

    /// Waits for the transfer started with result `started` to finish.
    ///
    /// On timeout the transfer is cancelled and awaited. A transfer that
    /// completed in the race with the cancel still counts as done.
    fn complete(&mut self, started: BOOL, timeout: Duration) -> std::result::Result<Completion, u32> {
        if started == 0 {
            let code = unsafe { GetLastError() };
            if code != ERROR_IO_PENDING {
                return Err(code);
            }
        }

        let waited = unsafe { WaitForSingleObject(self.event.raw(), wait_ms(timeout)) };
        if waited != WAIT_OBJECT_0 {
            unsafe { CancelIoEx(self.handle.raw(), &*self.overlapped) };
        }

        let mut transferred = 0u32;
        let ok = unsafe {
            GetOverlappedResult(self.handle.raw(), &*self.overlapped, &mut transferred, TRUE)
        };
        if ok != 0 {
            return Ok(Completion::Done(transferred as usize));
        }
        match unsafe { GetLastError() } {
            ERROR_OPERATION_ABORTED if waited != WAIT_OBJECT_0 => Ok(Completion::TimedOut),
            code => Err(code),
        }
    }
}

impl Connection for WinHidConnection {
    fn attributes(&self) -> &DeviceAttributes {
        &self.attrs
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.alive {
            return Err(HidError::Disconnected);
        }
        if self.input.is_empty() {
            // The device declares no input reports; nothing will ever arrive.
            std::thread::sleep(timeout);
            return Ok(0);
        }

        self.arm();
        let started = unsafe {
            ReadFile(
                self.handle.raw(),
                self.input.as_mut_ptr(),
                self.input.len() as u32,
                null_mut(),
                &mut *self.overlapped,
            )
        };
        match self.complete(started, timeout) {
            Ok(Completion::Done(n)) => {
                let payload = strip_report_id(&self.input[..n.min(self.input.len())]);
                let n = payload.len().min(buf.len());
                buf[..n].copy_from_slice(&payload[..n]);
                Ok(n)
            }
            Ok(Completion::TimedOut) => Ok(0),
            Err(code) => Err(self.lost(code)),
        }
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        if !self.alive {
            return Err(HidError::Disconnected);
        }
        if data.is_empty() {
            return Err(HidError::Io("output report needs a report ID byte".into()));
        }

        // The class driver rejects reports shorter than the declared length.
        let mut report = data.to_vec();
        if report.len() < self.output_len {
            report.resize(self.output_len, 0);
        }

        self.arm();
        let started = unsafe {
            WriteFile(
                self.handle.raw(),
                report.as_ptr(),
                report.len() as u32,
                null_mut(),
                &mut *self.overlapped,
            )
        };
        match self.complete(started, timeout) {
            Ok(Completion::Done(n)) if n == report.len() => Ok(()),
            Ok(Completion::Done(n)) => {
                warn!("incomplete write: wrote {n} of {} bytes", report.len());
                Err(HidError::ShortWrite {
                    written: n.min(data.len()),
                    expected: data.len(),
                })
            }
            Ok(Completion::TimedOut) => Err(HidError::Timeout),
            Err(code) if is_gone(code) => Err(self.lost(code)),
            Err(code) => Err(HidError::Io(format!("WriteFile failed: error {code}"))),
        }
    }

    fn status(&mut self) -> Status {
        if !self.alive {
            return Status::Offline;
        }
        if PreparsedData::get(self.handle.raw()).is_some() {
            Status::Online
        } else {
            self.lost(unsafe { GetLastError() });
            Status::Offline
        }
    }
}

impl Drop for WinHidConnection {
    fn drop(&mut self) {
        // Every transfer has completed or been cancelled by the time its call
        // returned, so the handles can go.
        trace!("closing {}", self.attrs);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unnumbered_reports_lose_their_id() {
        assert_eq!(strip_report_id(&[0, 1, 2, 3]), &[1, 2, 3]);
        assert_eq!(strip_report_id(&[0]), &[] as &[u8]);
    }

    #[test]
    fn numbered_reports_keep_their_id() {
        assert_eq!(strip_report_id(&[4, 1, 2]), &[4, 1, 2]);
        assert_eq!(strip_report_id(&[]), &[] as &[u8]);
    }

    #[test]
    fn wait_rounds_up() {
        assert_eq!(wait_ms(Duration::ZERO), 0);
        assert_eq!(wait_ms(Duration::from_micros(1)), 1);
        assert_eq!(wait_ms(Duration::from_millis(200)), 200);
        assert_eq!(wait_ms(Duration::MAX), u32::MAX - 1);
    }
}
