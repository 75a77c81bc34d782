#![cfg(target_os = "windows")]

//! Windows HID backend.
//!
//! - **Discovery** walks the HID device-interface class with SetupAPI and
//!   checks each candidate with `HidD_GetAttributes` and `HidP_GetCaps`
//!   (see [`discovery`]).
//! - **I/O** uses overlapped `ReadFile`/`WriteFile` on the opened handle,
//!   waiting on a per-connection event so every call honours its timeout
//!   (see [`hid_device`]).
//!
//! Devices are opened with `FILE_SHARE_READ | FILE_SHARE_WRITE`; the HID class
//! driver does not offer exclusive access to applications, so another process
//! may hold the same interface.
//!
//! Status policy: ask for the preparsed data again; the class driver refuses
//! once the device has been removed.

pub mod discovery;
pub mod hid_device;

use windows_sys::Win32::Devices::DeviceAndDriverInstallation::{
    SetupDiDestroyDeviceInfoList, HDEVINFO,
};
use windows_sys::Win32::Devices::HumanInterfaceDevice::{
    HidD_FreePreparsedData, HidD_GetPreparsedData, PHIDP_PREPARSED_DATA,
};
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};

use crate::device::HidBackend;
use crate::error::Result;
use crate::matching::MatchCriteria;

pub use hid_device::WinHidConnection;

/// Native backend for Windows.
#[derive(Debug, Default)]
pub struct WinHidBackend;

impl WinHidBackend {
    pub fn new() -> Self {
        Self
    }
}

impl HidBackend for WinHidBackend {
    type Connection = WinHidConnection;

    fn open_first_match(&self, criteria: &MatchCriteria) -> Result<WinHidConnection> {
        discovery::open_first_match(criteria)
    }
}

// --------------------- OS handle helpers ---------------------

/// A kernel handle closed on drop.
#[derive(Debug)]
pub(crate) struct OwnedHandle(HANDLE);

impl OwnedHandle {
    /// Takes ownership of `h`, or `None` for the two invalid spellings.
    pub(crate) fn new(h: HANDLE) -> Option<Self> {
        if h.is_null() || h == INVALID_HANDLE_VALUE {
            None
        } else {
            Some(Self(h))
        }
    }

    pub(crate) fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.0) };
    }
}

/// A SetupAPI device information set.
pub(crate) struct DeviceInfoList(pub(crate) HDEVINFO);

impl Drop for DeviceInfoList {
    fn drop(&mut self) {
        unsafe { SetupDiDestroyDeviceInfoList(self.0) };
    }
}

/// Preparsed report descriptor data, freed on drop.
pub(crate) struct PreparsedData(pub(crate) PHIDP_PREPARSED_DATA);

impl PreparsedData {
    pub(crate) fn get(handle: HANDLE) -> Option<Self> {
        let mut ppd: PHIDP_PREPARSED_DATA = 0;
        let ok = unsafe { HidD_GetPreparsedData(handle, &mut ppd) };
        if ok == 0 || ppd == 0 {
            None
        } else {
            Some(Self(ppd))
        }
    }
}

impl Drop for PreparsedData {
    fn drop(&mut self) {
        unsafe { HidD_FreePreparsedData(self.0) };
    }
}
