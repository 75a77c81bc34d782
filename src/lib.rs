//! rawhid: raw USB HID access for Linux, macOS and Windows.
//!
//! Finds the first HID device matching a vendor ID, product ID, usage page and
//! usage (any of which may be "don't care"), opens it, and moves whole
//! reports in and out with bounded timeouts.
//!
//! ```no_run
//! use rawhid::{backends::NativeBackend, Connection, HidBackend, MatchCriteria};
//! use std::time::Duration;
//!
//! let criteria = MatchCriteria::any()
//!     .usage_page(rawhid::DEBUG_USAGE_PAGE)
//!     .usage(rawhid::DEBUG_USAGE);
//! let mut conn = NativeBackend::new().open_first_match(&criteria)?;
//! let mut buf = [0u8; rawhid::DEFAULT_REPORT_SIZE];
//! let n = conn.read(&mut buf, Duration::from_millis(200))?;
//! # Ok::<(), rawhid::HidError>(())
//! ```
//!
//! The [`listener`] module holds the loop behind the `hid_listen` binary.

pub mod backends;
pub mod config;
pub mod console;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod listener;
pub mod matching;
pub mod metadata;

pub use config::{ConfigError, ListenConfig};
pub use console::ConsoleSink;
pub use device::{Connection, HidBackend, Status};
pub use error::{HidError, Result};
pub use listener::{strip_nulls, ListenSink, Listener, StreamEnd};
pub use matching::MatchCriteria;
pub use metadata::DeviceAttributes;

/// Usage page of the PJRC debug interface (vendor-defined).
pub const DEBUG_USAGE_PAGE: u16 = 0xFF31;

/// Usage of the PJRC debug interface within [`DEBUG_USAGE_PAGE`].
pub const DEBUG_USAGE: u16 = 0x0074;

/// Report size the debug interface sends.
pub const DEFAULT_REPORT_SIZE: usize = 64;
