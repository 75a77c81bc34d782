//! macOS / IOKit HID backend.
//!
//! ## Overview
//!
//! Discovery hands an `IOHIDManager` a matching dictionary holding only the
//! criteria that were specified (`VendorID`, `ProductID`, `PrimaryUsagePage`,
//! `PrimaryUsage`) and opens the first device it returns that will open.
//!
//! IOKit delivers input reports through a callback driven by a [`CFRunLoop`].
//! There is no background thread here: the device is scheduled on the run
//! loop of the thread that opened it, and [`Connection::read`] pumps that run
//! loop until a report lands in the connection's single-slot mailbox, the
//! removal callback fires, or the timeout elapses. A report that arrives
//! before the previous one was read replaces it.
//!
//! Because of that, an [`IOKitConnection`] is tied to the thread that opened
//! it and is not `Send`.
//!
//! Status policy: run pending run-loop sources without blocking, then report
//! whether the removal callback has fired.
//!
//! [`CFRunLoop`]: core_foundation::runloop::CFRunLoop

mod iokit;

use core_foundation::{
    base::CFIndex,
    runloop::{
        kCFRunLoopDefaultMode, kCFRunLoopRunFinished, kCFRunLoopRunStopped, CFRunLoop,
        CFRunLoopRunInMode,
    },
};
use std::{
    ffi::c_void,
    rc::Rc,
    slice::from_raw_parts,
    time::{Duration, Instant},
};
use tracing::{debug, info, trace, warn};

use self::iokit::{
    kIOHIDPrimaryUsageKey, kIOHIDPrimaryUsagePageKey, kIOHIDProductIDKey, kIOHIDVendorIDKey,
    IOHIDDevice, IOHIDDeviceMatcher, IOHIDDeviceRef, IOHIDManager, IOHIDReportType, IOReturn,
};
use crate::{
    device::{Connection, HidBackend, Status},
    error::{HidError, Result},
    matching::MatchCriteria,
    metadata::DeviceAttributes,
};

/// Size of the buffer IOKit writes each input report into.
const REPORT_BUFFER_SIZE: usize = 0x1000;

fn matcher(criteria: &MatchCriteria) -> IOHIDDeviceMatcher {
    let pairs: Vec<(&'static str, u16)> = [
        (kIOHIDVendorIDKey, criteria.vendor_id),
        (kIOHIDProductIDKey, criteria.product_id),
        (kIOHIDPrimaryUsagePageKey, criteria.usage_page),
        (kIOHIDPrimaryUsageKey, criteria.usage),
    ]
    .into_iter()
    .filter_map(|(key, value)| Some((key, value?)))
    .collect();
    IOHIDDeviceMatcher::new(&pairs)
}

fn attributes_of(device: &IOHIDDevice) -> DeviceAttributes {
    let u16_property = |key| device.i32_property(key).map(|v| v as u16);
    DeviceAttributes::new(
        u16_property(kIOHIDVendorIDKey).unwrap_or_default(),
        u16_property(kIOHIDProductIDKey).unwrap_or_default(),
    )
    .with_usage(
        u16_property(kIOHIDPrimaryUsagePageKey),
        u16_property(kIOHIDPrimaryUsageKey),
    )
}

/// An opened manager, closed on drop.
#[derive(Debug)]
struct OpenManager(IOHIDManager);

impl Drop for OpenManager {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            debug!("IOHIDManagerClose: {e}");
        }
    }
}

#[derive(Debug, Default)]
pub struct IOKitBackend;

impl IOKitBackend {
    pub fn new() -> Self {
        Self
    }
}

impl HidBackend for IOKitBackend {
    type Connection = IOKitConnection;

    fn open_first_match(&self, criteria: &MatchCriteria) -> Result<IOKitConnection> {
        let manager = IOHIDManager::create();
        manager.set_device_matching(&matcher(criteria));
        manager.open().map_err(|e| {
            warn!("IOHIDManagerOpen: {e}");
            HidError::Unavailable(e.to_string())
        })?;
        let manager = Rc::new(OpenManager(manager));

        for device in manager.0.copy_devices() {
            let attrs = attributes_of(&device);
            trace!("candidate {attrs}");
            if !criteria.matches(&attrs) {
                continue;
            }
            match IOKitConnection::open(device, attrs, manager.clone()) {
                Ok(conn) => {
                    info!("opened {}", conn.attrs);
                    return Ok(conn);
                }
                Err(e) => debug!("skipping candidate: IOHIDDeviceOpen: {e}"),
            }
        }
        Err(HidError::NotFound)
    }
}

/// Written by the IOKit callbacks, read between run-loop pumps.
struct Mailbox {
    buffer: [u8; REPORT_BUFFER_SIZE],
    pending: Option<Vec<u8>>,
    disconnected: bool,
}

pub struct IOKitConnection {
    device: IOHIDDevice,
    runloop: CFRunLoop,
    /// Owned; freed in `Drop` after both callbacks are unregistered.
    mailbox: *mut Mailbox,
    attrs: DeviceAttributes,
    alive: bool,
    /// Kept open for as long as the device it produced.
    _manager: Rc<OpenManager>,
}

impl IOKitConnection {
    fn open(
        device: IOHIDDevice,
        attrs: DeviceAttributes,
        manager: Rc<OpenManager>,
    ) -> std::result::Result<Self, IOReturn> {
        device.open()?;

        let mailbox = Box::into_raw(Box::new(Mailbox {
            buffer: [0; REPORT_BUFFER_SIZE],
            pending: None,
            disconnected: false,
        }));
        let context = mailbox as *const c_void;
        let runloop = CFRunLoop::get_current();
        unsafe {
            device.register_input_report_callback(
                (*mailbox).buffer.as_mut_ptr(),
                REPORT_BUFFER_SIZE,
                Some(Self::on_input_report),
                context,
            );
        }
        device.register_removal_callback(Some(Self::on_removal), context);
        device.schedule_with_run_loop(&runloop);

        Ok(Self {
            device,
            runloop,
            mailbox,
            attrs,
            alive: true,
            _manager: manager,
        })
    }

    extern "C" fn on_input_report(
        context: *mut c_void,
        _: IOReturn,
        _: IOHIDDeviceRef,
        _: IOHIDReportType,
        _: u32,
        report: *mut u8,
        report_len: CFIndex,
    ) {
        if context.is_null() || report.is_null() || report_len <= 0 {
            return;
        }
        let mailbox = unsafe { &mut *(context as *mut Mailbox) };
        let len = (report_len as usize).min(REPORT_BUFFER_SIZE);
        let data = unsafe { from_raw_parts(report, len) };
        mailbox.pending = Some(data.to_vec());
    }

    extern "C" fn on_removal(context: *mut c_void, _: IOReturn, _: *mut c_void) {
        if context.is_null() {
            return;
        }
        let mailbox = unsafe { &mut *(context as *mut Mailbox) };
        mailbox.disconnected = true;
    }

    /// Runs the current thread's run loop for at most `timeout`, returning
    /// after the first handled source.
    fn pump(&self, timeout: Duration) -> i32 {
        unsafe { CFRunLoopRunInMode(kCFRunLoopDefaultMode, timeout.as_secs_f64(), 1) }
    }

    fn removed(&self) -> bool {
        unsafe { (*self.mailbox).disconnected }
    }

    fn take_pending(&mut self) -> Option<Vec<u8>> {
        unsafe { (*self.mailbox).pending.take() }
    }

    fn lost(&mut self) -> HidError {
        if self.alive {
            info!("{} disconnected", self.attrs);
        }
        self.alive = false;
        HidError::Disconnected
    }
}

impl Connection for IOKitConnection {
    fn attributes(&self) -> &DeviceAttributes {
        &self.attrs
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.alive {
            return Err(HidError::Disconnected);
        }

        let deadline = Instant::now() + timeout;
        let mut last_pass = false;
        loop {
            if let Some(report) = self.take_pending() {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                return Ok(n);
            }
            if self.removed() {
                return Err(self.lost());
            }
            if last_pass {
                return Ok(0);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                // One non-blocking pass for anything already queued.
                last_pass = true;
            }
            let result = self.pump(remaining);
            if result == kCFRunLoopRunFinished || result == kCFRunLoopRunStopped {
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                last_pass = true;
            }
        }
    }

    /// Sends the report synchronously. IOKit applies its own timeout here, so
    /// `_timeout` is not used.
    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<()> {
        if !self.alive || self.removed() {
            return Err(self.lost());
        }
        let Some(&report_id) = data.first() else {
            return Err(HidError::Io("output report needs a report ID byte".into()));
        };
        let report = if report_id == 0 { &data[1..] } else { data };

        match self
            .device
            .set_report(IOHIDReportType::Output, CFIndex::from(report_id), report)
        {
            Ok(()) => Ok(()),
            Err(e) if e == IOReturn::kIOReturnTimeout => Err(HidError::Timeout),
            Err(e) if e.is_gone() => Err(self.lost()),
            Err(e) => Err(HidError::Io(format!("IOHIDDeviceSetReport: {e}"))),
        }
    }

    fn status(&mut self) -> Status {
        if !self.alive {
            return Status::Offline;
        }
        self.pump(Duration::ZERO);
        if self.removed() {
            self.lost();
            Status::Offline
        } else {
            Status::Online
        }
    }
}

impl Drop for IOKitConnection {
    fn drop(&mut self) {
        trace!("closing {}", self.attrs);
        self.device
            .register_input_report_callback(std::ptr::null_mut(), 0, None, std::ptr::null());
        self.device.register_removal_callback(None, std::ptr::null());
        self.device.unschedule_from_run_loop(&self.runloop);
        if let Err(e) = self.device.close() {
            // Expected once the device is unplugged.
            debug!("IOHIDDeviceClose: {e}");
        }
        drop(unsafe { Box::from_raw(self.mailbox) });
    }
}
