//! Backends for `rawhid`.
//!
//! Implementations of [`HidBackend`](crate::device::HidBackend) for each host,
//! plus an in-memory one.
//!
//! # Feature flags
//! - **`hidapi`**: replace the native backend with one built on the `hidapi`
//!   crate. Off by default.
//!
//! Exactly one backend is resolved per build target as [`NativeBackend`].

#[cfg(feature = "hidapi")]
#[cfg_attr(docsrs, doc(cfg(feature = "hidapi")))]
pub mod hid;

#[cfg(all(not(feature = "hidapi"), target_os = "linux"))]
pub mod linux;

#[cfg(all(not(feature = "hidapi"), target_os = "macos"))]
pub mod macos;

#[cfg(all(not(feature = "hidapi"), target_os = "windows"))]
pub mod windows;

pub mod simulated;

#[cfg(feature = "hidapi")]
pub type NativeBackend = hid::HidApiBackend;

#[cfg(all(not(feature = "hidapi"), target_os = "linux"))]
pub type NativeBackend = linux::HidrawBackend;

#[cfg(all(not(feature = "hidapi"), target_os = "macos"))]
pub type NativeBackend = macos::IOKitBackend;

#[cfg(all(not(feature = "hidapi"), target_os = "windows"))]
pub type NativeBackend = windows::WinHidBackend;

#[cfg(not(any(
    feature = "hidapi",
    target_os = "linux",
    target_os = "macos",
    target_os = "windows"
)))]
compile_error!("no native HID backend for this target; enable the `hidapi` feature");
