#![allow(non_snake_case, non_camel_case_types, non_upper_case_globals)]

//! IOKit HID bindings, only as much as the backend needs.

use core_foundation::{
    base::{
        kCFAllocatorDefault, CFAllocatorRef, CFGetTypeID, CFIndex, CFTypeID, CFTypeRef, TCFType,
        TCFTypeRef,
    },
    declare_TCFType,
    dictionary::{CFDictionary, CFDictionaryRef},
    impl_CFTypeDescription, impl_TCFType,
    number::CFNumber,
    runloop::{kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopRef},
    set::{CFSet, CFSetGetValues, CFSetRef},
    string::{CFString, CFStringRef},
};
use mach2::kern_return::{kern_return_t, KERN_SUCCESS};

use std::{
    error::Error,
    ffi::{c_char, CStr},
    fmt::{self, Debug, Display},
    os::raw::{c_int, c_void},
};

pub type IOOptionBits = u32;

/// `kIOHIDOptionsTypeNone`: open without seizing the device.
pub const kIOHIDOptionsTypeNone: IOOptionBits = 0;

pub const kIOHIDVendorIDKey: &str = "VendorID";
pub const kIOHIDProductIDKey: &str = "ProductID";
pub const kIOHIDPrimaryUsagePageKey: &str = "PrimaryUsagePage";
pub const kIOHIDPrimaryUsageKey: &str = "PrimaryUsage";

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IOReturn(kern_return_t);

extern "C" {
    fn mach_error_string(error_value: kern_return_t) -> *const c_char;
}

// iokit_common_err(x) = sys_iokit | sub_iokit_common | x
const fn iokit_common_err(code: u32) -> kern_return_t {
    (0xe000_0000u32 | code) as kern_return_t
}

impl IOReturn {
    const kIOReturnSuccess: kern_return_t = KERN_SUCCESS as c_int;
    pub const kIOReturnNoDevice: Self = Self(iokit_common_err(0x2c0));
    pub const kIOReturnTimeout: Self = Self(iokit_common_err(0x2d6));
    pub const kIOReturnNotAttached: Self = Self(iokit_common_err(0x2d9));
    pub const kIOReturnNotResponding: Self = Self(iokit_common_err(0x2ed));

    pub fn message(&self) -> Option<&'static str> {
        let s = unsafe {
            let p = mach_error_string(self.0);
            if p.is_null() {
                return None;
            }
            CStr::from_ptr(p)
        };

        s.to_str().ok()
    }

    pub fn into_result(self) -> Result<(), Self> {
        match self.0 {
            Self::kIOReturnSuccess => Ok(()),
            _ => Err(self),
        }
    }

    /// The device went away underneath the call.
    pub fn is_gone(&self) -> bool {
        matches!(
            *self,
            Self::kIOReturnNoDevice | Self::kIOReturnNotAttached | Self::kIOReturnNotResponding
        )
    }
}

impl Error for IOReturn {}

impl Display for IOReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)?;
        if let Some(msg) = self.message() {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl Debug for IOReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IOReturn")
            .field("id", &format!("0x{:x}", self.0))
            .field("message", &self.message().unwrap_or_default())
            .finish()
    }
}

pub type IOHIDCallback = extern "C" fn(context: *mut c_void, result: IOReturn, sender: *mut c_void);

pub type IOHIDReportCallback = extern "C" fn(
    context: *mut c_void,
    result: IOReturn,
    sender: IOHIDDeviceRef,
    report_type: IOHIDReportType,
    report_id: u32,
    report: *mut u8,
    report_len: CFIndex,
);

#[repr(u32)]
#[derive(Clone, Copy, Debug)]
pub enum IOHIDReportType {
    Input = 0,
    Output,
    Feature,
    Count,
}

#[repr(C)]
pub struct __IOHIDManager(c_void);
pub type IOHIDManagerRef = *mut __IOHIDManager;
declare_TCFType!(IOHIDManager, IOHIDManagerRef);
impl_TCFType!(IOHIDManager, IOHIDManagerRef, IOHIDManagerGetTypeID);
impl_CFTypeDescription!(IOHIDManager);

#[repr(C)]
pub struct __IOHIDDevice(c_void);
pub type IOHIDDeviceRef = *mut __IOHIDDevice;
declare_TCFType!(IOHIDDevice, IOHIDDeviceRef);
impl_TCFType!(IOHIDDevice, IOHIDDeviceRef, IOHIDDeviceGetTypeID);
impl_CFTypeDescription!(IOHIDDevice);

/// A device matching dictionary. Only the keys that were set take part.
pub struct IOHIDDeviceMatcher {
    dict: CFDictionary<CFString, CFNumber>,
}

impl IOHIDDeviceMatcher {
    pub fn new(pairs: &[(&'static str, u16)]) -> Self {
        let pairs: Vec<(CFString, CFNumber)> = pairs
            .iter()
            .map(|&(key, value)| {
                (
                    CFString::from_static_string(key),
                    CFNumber::from(i32::from(value)),
                )
            })
            .collect();
        Self {
            dict: CFDictionary::from_CFType_pairs(&pairs),
        }
    }
}

impl IOHIDManager {
    pub fn create() -> Self {
        unsafe {
            TCFType::wrap_under_create_rule(IOHIDManagerCreate(
                kCFAllocatorDefault,
                kIOHIDOptionsTypeNone,
            ))
        }
    }

    pub fn copy_devices(&self) -> Vec<IOHIDDevice> {
        unsafe {
            let devices = IOHIDManagerCopyDevices(self.as_concrete_TypeRef());
            if devices.is_null() {
                // No matching devices gives null rather than an empty set.
                return Vec::new();
            }

            let s: CFSet<c_void> = CFSet::wrap_under_create_rule(devices);
            let mut refs: Vec<*const c_void> = Vec::with_capacity(s.len());

            CFSetGetValues(s.as_concrete_TypeRef(), refs.as_mut_ptr());
            refs.set_len(s.len());

            refs.into_iter()
                .map(|ptr| IOHIDDeviceRef::from_void_ptr(ptr).into())
                .collect()
        }
    }

    pub fn set_device_matching(&self, matching: &IOHIDDeviceMatcher) {
        unsafe {
            IOHIDManagerSetDeviceMatching(
                self.as_concrete_TypeRef(),
                matching.dict.as_concrete_TypeRef(),
            )
        }
    }

    pub fn open(&self) -> Result<(), IOReturn> {
        unsafe { IOHIDManagerOpen(self.as_concrete_TypeRef(), kIOHIDOptionsTypeNone) }
            .into_result()
    }

    pub fn close(&self) -> Result<(), IOReturn> {
        unsafe { IOHIDManagerClose(self.as_concrete_TypeRef(), kIOHIDOptionsTypeNone) }
            .into_result()
    }
}

impl IOHIDDevice {
    /// Reads an integer property, `None` when absent or not a number.
    pub fn i32_property(&self, key: &'static str) -> Option<i32> {
        let key = CFString::from_static_string(key);
        unsafe {
            let value = IOHIDDeviceGetProperty(self.as_concrete_TypeRef(), key.as_concrete_TypeRef());
            if value.is_null() || CFGetTypeID(value) != CFNumber::type_id() {
                return None;
            }
            CFNumber::wrap_under_get_rule(value as _).to_i32()
        }
    }

    pub fn register_input_report_callback(
        &self,
        report: *mut u8,
        report_len: usize,
        callback: Option<IOHIDReportCallback>,
        context: *const c_void,
    ) {
        unsafe {
            IOHIDDeviceRegisterInputReportCallback(
                self.as_concrete_TypeRef(),
                report,
                report_len as CFIndex,
                callback,
                context,
            )
        }
    }

    pub fn register_removal_callback(&self, callback: Option<IOHIDCallback>, context: *const c_void) {
        unsafe { IOHIDDeviceRegisterRemovalCallback(self.as_concrete_TypeRef(), callback, context) }
    }

    pub fn set_report(
        &self,
        report_type: IOHIDReportType,
        report_id: CFIndex,
        report: &[u8],
    ) -> Result<(), IOReturn> {
        unsafe {
            IOHIDDeviceSetReport(
                self.as_concrete_TypeRef(),
                report_type,
                report_id,
                report.as_ptr(),
                report.len() as CFIndex,
            )
        }
        .into_result()
    }

    pub fn schedule_with_run_loop(&self, runloop: &CFRunLoop) {
        unsafe {
            IOHIDDeviceScheduleWithRunLoop(
                self.as_concrete_TypeRef(),
                runloop.as_concrete_TypeRef(),
                kCFRunLoopDefaultMode,
            );
        }
    }

    pub fn unschedule_from_run_loop(&self, runloop: &CFRunLoop) {
        unsafe {
            IOHIDDeviceUnscheduleFromRunLoop(
                self.as_concrete_TypeRef(),
                runloop.as_concrete_TypeRef(),
                kCFRunLoopDefaultMode,
            );
        }
    }

    pub fn close(&self) -> Result<(), IOReturn> {
        unsafe { IOHIDDeviceClose(self.as_concrete_TypeRef(), kIOHIDOptionsTypeNone) }.into_result()
    }

    pub fn open(&self) -> Result<(), IOReturn> {
        unsafe { IOHIDDeviceOpen(self.as_concrete_TypeRef(), kIOHIDOptionsTypeNone) }.into_result()
    }
}

impl From<IOHIDDeviceRef> for IOHIDDevice {
    fn from(r: IOHIDDeviceRef) -> Self {
        unsafe { TCFType::wrap_under_get_rule(r) }
    }
}

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    // IOHIDManager
    fn IOHIDManagerGetTypeID() -> CFTypeID;

    fn IOHIDManagerCreate(allocator: CFAllocatorRef, options: IOOptionBits) -> IOHIDManagerRef;
    fn IOHIDManagerCopyDevices(manager: IOHIDManagerRef) -> CFSetRef;
    fn IOHIDManagerSetDeviceMatching(manager: IOHIDManagerRef, matching: CFDictionaryRef);
    fn IOHIDManagerOpen(manager: IOHIDManagerRef, options: IOOptionBits) -> IOReturn;
    fn IOHIDManagerClose(manager: IOHIDManagerRef, options: IOOptionBits) -> IOReturn;

    // IOHIDDevice
    fn IOHIDDeviceGetTypeID() -> CFTypeID;
    fn IOHIDDeviceGetProperty(device: IOHIDDeviceRef, key: CFStringRef) -> CFTypeRef;
    fn IOHIDDeviceSetReport(
        device: IOHIDDeviceRef,
        reportType: IOHIDReportType,
        reportID: CFIndex,
        report: *const u8,
        reportLength: CFIndex,
    ) -> IOReturn;
    fn IOHIDDeviceRegisterInputReportCallback(
        device: IOHIDDeviceRef,
        report: *mut u8,
        reportLength: CFIndex,
        callback: Option<IOHIDReportCallback>,
        context: *const c_void,
    );
    fn IOHIDDeviceRegisterRemovalCallback(
        device: IOHIDDeviceRef,
        callback: Option<IOHIDCallback>,
        context: *const c_void,
    );
    fn IOHIDDeviceScheduleWithRunLoop(
        device: IOHIDDeviceRef,
        runLoop: CFRunLoopRef,
        runLoopMode: CFStringRef,
    );
    fn IOHIDDeviceUnscheduleFromRunLoop(
        device: IOHIDDeviceRef,
        runLoop: CFRunLoopRef,
        runLoopMode: CFStringRef,
    );
    fn IOHIDDeviceClose(device: IOHIDDeviceRef, options: IOOptionBits) -> IOReturn;
    fn IOHIDDeviceOpen(device: IOHIDDeviceRef, options: IOOptionBits) -> IOReturn;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_codes() {
        assert!(IOReturn(0).into_result().is_ok());
        assert!(IOReturn::kIOReturnNoDevice.into_result().is_err());
        assert!(IOReturn::kIOReturnNotAttached.is_gone());
        assert!(!IOReturn::kIOReturnTimeout.is_gone());
        assert_eq!(IOReturn::kIOReturnNoDevice.0 as u32, 0xe00002c0);
    }
}
