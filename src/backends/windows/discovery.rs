//! Windows device discovery.
//!
//! Enumerates present HID interfaces through SetupAPI, in the order the
//! system reports them, and returns the first one that:
//!
//! 1. opens for overlapped read/write,
//! 2. has matching `HidD_GetAttributes` vendor/product IDs, and
//! 3. has matching `HidP_GetCaps` top-level usage page/usage.
//!
//! Every handle, preparsed-data block and the device info set are RAII
//! wrappers, so each rejected candidate releases what it acquired before the
//! scan moves on.

#![cfg(target_os = "windows")]

use std::ffi::OsStr;
use std::mem::{size_of, MaybeUninit};
use std::os::windows::ffi::OsStrExt;
use std::ptr::{null, null_mut};

use tracing::{debug, info, trace, warn};
use windows_sys::core::GUID;
use windows_sys::Win32::Devices::DeviceAndDriverInstallation::{
    SetupDiEnumDeviceInterfaces, SetupDiGetClassDevsW, SetupDiGetDeviceInterfaceDetailW,
    DIGCF_DEVICEINTERFACE, DIGCF_PRESENT, HDEVINFO, SP_DEVICE_INTERFACE_DATA,
    SP_DEVICE_INTERFACE_DETAIL_DATA_W,
};
use windows_sys::Win32::Devices::HumanInterfaceDevice::{
    HidD_GetAttributes, HidD_GetHidGuid, HidP_GetCaps, HIDD_ATTRIBUTES, HIDP_CAPS,
    HIDP_STATUS_SUCCESS,
};
use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_INSUFFICIENT_BUFFER, ERROR_NO_MORE_ITEMS, GENERIC_READ, GENERIC_WRITE,
    INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAG_OVERLAPPED, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};

use super::hid_device::WinHidConnection;
use super::{DeviceInfoList, OwnedHandle, PreparsedData};
use crate::device::{Connection, ScanMiss};
use crate::error::{HidError, Result};
use crate::matching::MatchCriteria;
use crate::metadata::DeviceAttributes;

/// What `HidP_GetCaps` told us about a candidate.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ReportLengths {
    /// Input report length including the report ID byte.
    pub input: usize,
    /// Output report length including the report ID byte.
    pub output: usize,
}

/// Opens the first present HID interface satisfying `criteria`.
pub fn open_first_match(criteria: &MatchCriteria) -> Result<WinHidConnection> {
    let mut guid: GUID = unsafe { std::mem::zeroed() };
    unsafe { HidD_GetHidGuid(&mut guid) };

    let set = unsafe {
        SetupDiGetClassDevsW(&guid, null(), null_mut(), DIGCF_PRESENT | DIGCF_DEVICEINTERFACE)
    };
    if set == INVALID_HANDLE_VALUE as HDEVINFO {
        let code = unsafe { GetLastError() };
        warn!("SetupDiGetClassDevsW failed: error {code}");
        return Err(HidError::Unavailable(format!(
            "cannot enumerate HID interfaces (error {code})"
        )));
    }
    let set = DeviceInfoList(set);

    let mut miss = ScanMiss::default();
    for index in 0.. {
        let mut iface: SP_DEVICE_INTERFACE_DATA = unsafe { std::mem::zeroed() };
        iface.cbSize = size_of::<SP_DEVICE_INTERFACE_DATA>() as u32;
        let ok = unsafe { SetupDiEnumDeviceInterfaces(set.0, null(), &guid, index, &mut iface) };
        if ok == 0 {
            let code = unsafe { GetLastError() };
            if code != ERROR_NO_MORE_ITEMS {
                warn!("SetupDiEnumDeviceInterfaces stopped at {index}: error {code}");
            }
            break;
        }

        let Some(path) = interface_path(&set, &iface) else {
            continue;
        };
        match probe(&path, criteria) {
            Ok(Some(conn)) => return Ok(conn),
            Ok(None) => {}
            Err(e) => miss.exhausted(e),
        }
    }

    Err(miss.into_error())
}

/// Reads the device path for one enumerated interface.
fn interface_path(set: &DeviceInfoList, iface: &SP_DEVICE_INTERFACE_DATA) -> Option<String> {
    let mut required = 0u32;
    let ok = unsafe {
        SetupDiGetDeviceInterfaceDetailW(set.0, iface, null_mut(), 0, &mut required, null_mut())
    };
    if ok == 0 && unsafe { GetLastError() } != ERROR_INSUFFICIENT_BUFFER {
        return None;
    }
    if (required as usize) < size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() {
        return None;
    }

    // u64 backing keeps the detail struct aligned.
    let mut storage = vec![0u64; (required as usize).div_ceil(size_of::<u64>())];
    let detail = storage.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W;
    unsafe { (*detail).cbSize = size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32 };

    let ok = unsafe {
        SetupDiGetDeviceInterfaceDetailW(set.0, iface, detail, required, null_mut(), null_mut())
    };
    if ok == 0 {
        debug!("SetupDiGetDeviceInterfaceDetailW failed: error {}", unsafe {
            GetLastError()
        });
        return None;
    }

    // DevicePath is a NUL-terminated UTF-16 string running past the declared
    // one-element array, up to the end of `required`.
    let offset = std::mem::offset_of!(SP_DEVICE_INTERFACE_DETAIL_DATA_W, DevicePath);
    let max_units = (required as usize).saturating_sub(offset) / size_of::<u16>();
    let wide = unsafe {
        std::slice::from_raw_parts(std::ptr::addr_of!((*detail).DevicePath) as *const u16, max_units)
    };
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    Some(String::from_utf16_lossy(&wide[..len]))
}

/// `Ok(None)` skips the candidate. `Err` means it matched but could not be
/// set up for lack of resources.
fn probe(path: &str, criteria: &MatchCriteria) -> Result<Option<WinHidConnection>> {
    let handle = match open_device_handle(path) {
        Ok(h) => h,
        Err(code) => {
            // Keyboards and mice are held by the system; those fail here.
            debug!("cannot open {path}: error {code}");
            return Ok(None);
        }
    };

    let mut attributes: HIDD_ATTRIBUTES = unsafe { std::mem::zeroed() };
    attributes.Size = size_of::<HIDD_ATTRIBUTES>() as u32;
    if unsafe { HidD_GetAttributes(handle.raw(), &mut attributes) } == 0 {
        debug!("{path}: HidD_GetAttributes failed");
        return Ok(None);
    }

    let mut attrs =
        DeviceAttributes::new(attributes.VendorID, attributes.ProductID).with_path(path);
    trace!("candidate {attrs}");
    if !criteria.matches_ids(attrs.vendor_id, attrs.product_id) {
        return Ok(None);
    }

    let Some(ppd) = PreparsedData::get(handle.raw()) else {
        return Ok(None);
    };
    let mut caps = MaybeUninit::<HIDP_CAPS>::uninit();
    let status = unsafe { HidP_GetCaps(ppd.0, caps.as_mut_ptr()) };
    if status != HIDP_STATUS_SUCCESS {
        debug!("{path}: HidP_GetCaps failed: {status:#x}");
        return Ok(None);
    }
    let caps = unsafe { caps.assume_init() };
    drop(ppd);

    attrs.usage_page = Some(caps.UsagePage);
    attrs.usage = Some(caps.Usage);
    if !criteria.matches_usage(attrs.usage_page, attrs.usage) {
        return Ok(None);
    }

    let lengths = ReportLengths {
        input: usize::from(caps.InputReportByteLength),
        output: usize::from(caps.OutputReportByteLength),
    };
    match WinHidConnection::new(handle, attrs, lengths) {
        Ok(conn) => {
            info!("opened {}", conn.attributes());
            Ok(Some(conn))
        }
        Err(e) => {
            warn!("{path}: {e}");
            Err(e)
        }
    }
}

/// Opens a HID interface path for overlapped read/write.
///
/// ### Errors
/// Returns `Err(GetLastError())` on failure.
fn open_device_handle(path: &str) -> std::result::Result<OwnedHandle, u32> {
    // UTF-16 + NUL
    let wide: Vec<u16> = OsStr::new(path)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let handle = unsafe {
        CreateFileW(
            wide.as_ptr(),
            GENERIC_READ | GENERIC_WRITE,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            null(),
            OPEN_EXISTING,
            FILE_FLAG_OVERLAPPED,
            null_mut(),
        )
    };

    OwnedHandle::new(handle).ok_or_else(|| unsafe { GetLastError() })
}
