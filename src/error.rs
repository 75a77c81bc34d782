//! Error taxonomy shared by every backend.
//!
//! Backends never hand raw OS error codes to callers. Per-candidate failures
//! during a scan are logged and swallowed; only the final outcome of an open
//! ([`HidError::NotFound`] / [`HidError::Unavailable`]) crosses the boundary.
//! Interrupted or would-block conditions are retried inside `read`/`write`
//! and have no variant here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HidError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HidError {
    /// No present device satisfied the match criteria. Expected while polling.
    #[error("no matching HID device found")]
    NotFound,

    /// The HID subsystem (or memory for the connection) could not be obtained.
    ///
    /// Callers treat this like [`HidError::NotFound`]; it is kept separate so
    /// logs can tell "nothing plugged in" from "could not even look".
    #[error("HID subsystem unavailable: {0}")]
    Unavailable(String),

    /// The device went away or the transport failed. Terminal for the connection.
    #[error("device disconnected")]
    Disconnected,

    /// A write did not complete before its deadline and was cancelled.
    #[error("operation timed out")]
    Timeout,

    /// The transport accepted fewer bytes than the report holds.
    #[error("short write: {written} of {expected} bytes accepted")]
    ShortWrite { written: usize, expected: usize },

    /// Any other transport failure that does not imply the device is gone.
    #[error("I/O error communicating with device: {0}")]
    Io(String),
}

impl HidError {
    /// `true` for the outcomes a polling caller answers with "try again later".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::Unavailable(_))
    }

    /// `true` when the connection must be closed and the device searched for again.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn polling_outcomes() {
        assert!(HidError::NotFound.is_not_found());
        assert!(HidError::Unavailable("no hidraw".into()).is_not_found());
        assert!(!HidError::Disconnected.is_not_found());
        assert!(HidError::Disconnected.is_disconnect());
        assert!(!HidError::Timeout.is_disconnect());
    }

    #[test]
    fn short_write_message() {
        let e = HidError::ShortWrite {
            written: 32,
            expected: 65,
        };
        assert_eq!(e.to_string(), "short write: 32 of 65 bytes accepted");
    }
}
