//! In-memory backend.
//!
//! [`SimulatedBus`] stands in for the host's HID inventory. Devices are plugged
//! in with [`SimulatedBus::plug`], which hands back a [`DeviceHandle`] the test
//! (or demo) side uses to feed input reports, pull the device, and check that
//! the connection released it.
//!
//! The behaviour mirrors the native backends:
//! - input is a single slot; a report sent before the previous one was read
//!   replaces it
//! - a device is opened exclusively; an open device is skipped by later scans
//! - a device built with [`SimulatedDevice::with_descriptor`] has no usage
//!   capability data and is matched on its descriptor signature instead
//!
//! Handles are `Send`, so a report or an unplug can arrive from another thread
//! while a read is blocked.

use crate::descriptor::leading_usage;
use crate::device::{Connection, HidBackend, ScanMiss, Status};
use crate::error::{HidError, Result};
use crate::matching::MatchCriteria;
use crate::metadata::DeviceAttributes;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Description of a device to plug into a [`SimulatedBus`].
#[derive(Clone, Debug)]
pub struct SimulatedDevice {
    attrs: DeviceAttributes,
    write_limit: Option<usize>,
    fail_open: bool,
    exhaust_open: bool,
}

impl SimulatedDevice {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            attrs: DeviceAttributes::new(vendor_id, product_id),
            write_limit: None,
            fail_open: false,
            exhaust_open: false,
        }
    }

    /// Usage page and usage reported as capability data.
    pub fn with_usage(mut self, usage_page: u16, usage: u16) -> Self {
        self.attrs.usage_page = Some(usage_page);
        self.attrs.usage = Some(usage);
        self
    }

    /// No capability data; usage is recovered from the descriptor signature.
    pub fn with_descriptor(mut self, descriptor: &[u8]) -> Self {
        let (usage_page, usage) = leading_usage(descriptor);
        self.attrs.usage_page = usage_page;
        self.attrs.usage = usage;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.attrs.path = Some(path.into());
        self
    }

    /// Writes accept at most `n` bytes of each report.
    pub fn accepting_at_most(mut self, n: usize) -> Self {
        self.write_limit = Some(n);
        self
    }

    /// Every open attempt on this device fails, as if access were denied.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Every open attempt on this device runs out of host resources.
    pub fn exhausting_resources(mut self) -> Self {
        self.exhaust_open = true;
        self
    }
}

#[derive(Debug, Default)]
struct SlotState {
    present: bool,
    open: bool,
    pending: Option<Vec<u8>>,
    releases: usize,
    written: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct Slot {
    device: SimulatedDevice,
    state: Mutex<SlotState>,
    changed: Condvar,
}

/// The simulated host inventory. Cloning shares it.
#[derive(Clone, Debug, Default)]
pub struct SimulatedBus {
    inventory: Arc<Mutex<Vec<Arc<Slot>>>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device to the end of the enumeration order.
    pub fn plug(&self, device: SimulatedDevice) -> DeviceHandle {
        let slot = Arc::new(Slot {
            device,
            state: Mutex::new(SlotState {
                present: true,
                ..Default::default()
            }),
            changed: Condvar::new(),
        });
        self.inventory.lock().push(slot.clone());
        DeviceHandle {
            slot,
            inventory: self.inventory.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.inventory.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HidBackend for SimulatedBus {
    type Connection = SimulatedConnection;

    fn open_first_match(&self, criteria: &MatchCriteria) -> Result<SimulatedConnection> {
        let inventory = self.inventory.lock();
        let mut miss = ScanMiss::default();
        for slot in inventory.iter() {
            let attrs = &slot.device.attrs;
            trace!("candidate {attrs}");
            if !criteria.matches(attrs) {
                continue;
            }

            let mut state = slot.state.lock();
            if slot.device.fail_open {
                debug!("skipping {attrs}: open refused");
                continue;
            }
            if slot.device.exhaust_open {
                warn!("cannot set up {attrs}: out of resources");
                miss.exhausted(HidError::Unavailable(format!("no resources to open {attrs}")));
                continue;
            }
            if state.open {
                debug!("skipping {attrs}: already open");
                continue;
            }
            state.open = true;
            info!("opened {attrs}");
            return Ok(SimulatedConnection {
                slot: slot.clone(),
                attrs: attrs.clone(),
                alive: true,
            });
        }
        Err(miss.into_error())
    }
}

/// Test-side handle to a plugged device.
#[derive(Clone, Debug)]
pub struct DeviceHandle {
    slot: Arc<Slot>,
    inventory: Arc<Mutex<Vec<Arc<Slot>>>>,
}

impl DeviceHandle {
    /// Delivers one input report, replacing any report not yet read.
    /// Empty reports are ignored.
    pub fn send_report(&self, report: &[u8]) {
        if report.is_empty() {
            return;
        }
        let mut state = self.slot.state.lock();
        if !state.present {
            return;
        }
        state.pending = Some(report.to_vec());
        self.slot.changed.notify_all();
    }

    /// Removes the device from the inventory and wakes any blocked read.
    pub fn unplug(&self) {
        self.inventory
            .lock()
            .retain(|slot| !Arc::ptr_eq(slot, &self.slot));
        let mut state = self.slot.state.lock();
        state.present = false;
        state.pending = None;
        self.slot.changed.notify_all();
    }

    pub fn attributes(&self) -> &DeviceAttributes {
        &self.slot.device.attrs
    }

    pub fn is_open(&self) -> bool {
        self.slot.state.lock().open
    }

    /// Number of times a connection to this device has been released.
    pub fn releases(&self) -> usize {
        self.slot.state.lock().releases
    }

    /// Every report (or accepted prefix of one) written to the device.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.slot.state.lock().written.clone()
    }
}

/// Connection to a simulated device.
#[derive(Debug)]
pub struct SimulatedConnection {
    slot: Arc<Slot>,
    attrs: DeviceAttributes,
    alive: bool,
}

impl Connection for SimulatedConnection {
    fn attributes(&self) -> &DeviceAttributes {
        &self.attrs
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.alive {
            return Err(HidError::Disconnected);
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.slot.state.lock();
        let mut timed_out = false;
        loop {
            if !state.present {
                self.alive = false;
                info!("{} disconnected", self.attrs);
                return Err(HidError::Disconnected);
            }
            if let Some(report) = state.pending.take() {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                return Ok(n);
            }
            if timed_out {
                return Ok(0);
            }
            timed_out = self
                .slot
                .changed
                .wait_until(&mut state, deadline)
                .timed_out();
        }
    }

    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<()> {
        if !self.alive {
            return Err(HidError::Disconnected);
        }

        let mut state = self.slot.state.lock();
        if !state.present {
            self.alive = false;
            return Err(HidError::Disconnected);
        }
        let accepted = self
            .slot
            .device
            .write_limit
            .map_or(data.len(), |limit| limit.min(data.len()));
        state.written.push(data[..accepted].to_vec());
        if accepted < data.len() {
            return Err(HidError::ShortWrite {
                written: accepted,
                expected: data.len(),
            });
        }
        Ok(())
    }

    fn status(&mut self) -> Status {
        if self.alive && self.slot.state.lock().present {
            Status::Online
        } else {
            Status::Offline
        }
    }
}

impl Drop for SimulatedConnection {
    fn drop(&mut self) {
        let mut state = self.slot.state.lock();
        state.open = false;
        state.releases += 1;
    }
}
