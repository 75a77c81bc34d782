//! Identifying attributes of a HID device.
//!
//! [`DeviceAttributes`] is what a backend learned about a candidate while
//! scanning: vendor/product IDs always, usage page/usage when the platform
//! exposes them (or when they could be read off the report descriptor
//! signature). Unknown fields stay `None`, and a `None` never satisfies a
//! specified criterion.
//!
//! ## Conventions
//! - `path` is an OS path (`/dev/hidraw3`, a Win32 interface path) when the
//!   backend has one. Treat it as diagnostic, not identity.
//! - `usage_page`/`usage` are the device's *primary* (top-level collection) usage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of what is known about one HID device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAttributes {
    /// USB Vendor ID (VID).
    pub vendor_id: u16,

    /// USB Product ID (PID).
    pub product_id: u16,

    /// Primary HID usage page (e.g. `0xFF31` for the PJRC debug interface), if known.
    pub usage_page: Option<u16>,

    /// Primary HID usage within the page, if known.
    pub usage: Option<u16>,

    /// OS path to the device, if the backend has one.
    pub path: Option<String>,
}

impl DeviceAttributes {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage_page: Option<u16>, usage: Option<u16>) -> Self {
        self.usage_page = usage_page;
        self.usage = usage;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for DeviceAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)?;
        if let (Some(up), Some(u)) = (self.usage_page, self.usage) {
            write!(f, " usage {up:04x}:{u:04x}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " ({path})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        let a = DeviceAttributes::new(0x16c0, 0x0479)
            .with_usage(Some(0xff31), Some(0x74))
            .with_path("/dev/hidraw2");
        assert_eq!(a.to_string(), "16c0:0479 usage ff31:0074 (/dev/hidraw2)");
        assert_eq!(DeviceAttributes::new(1, 2).to_string(), "0001:0002");
    }
}
