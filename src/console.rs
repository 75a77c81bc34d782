//! Console output for the listener.

use std::io::{self, Write};

use crate::listener::ListenSink;
use crate::metadata::DeviceAttributes;

/// Writes listener progress and device text to a stream, flushing after
/// every write so text shows up as it arrives.
#[derive(Debug)]
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.out.flush()
    }
}

impl<W: Write> ListenSink for ConsoleSink<W> {
    fn started(&mut self) -> io::Result<()> {
        self.emit(b"Waiting for device:")
    }

    fn waiting(&mut self) -> io::Result<()> {
        self.emit(b".")
    }

    fn connected(&mut self, _attrs: &DeviceAttributes) -> io::Result<()> {
        self.emit(b"\nListening:\n")
    }

    fn payload(&mut self, data: &[u8]) -> io::Result<()> {
        self.emit(data)
    }

    fn disconnected(&mut self) -> io::Result<()> {
        self.emit(b"\nDevice disconnected.\nWaiting for new device:")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn session_transcript() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.started().unwrap();
        sink.waiting().unwrap();
        sink.waiting().unwrap();
        sink.connected(&DeviceAttributes::new(0x16c0, 0x0479)).unwrap();
        sink.payload(b"hello\n").unwrap();
        sink.disconnected().unwrap();
        sink.waiting().unwrap();

        assert_eq!(
            String::from_utf8(sink.into_inner()).unwrap(),
            "Waiting for device:..\nListening:\nhello\n\nDevice disconnected.\nWaiting for new device:."
        );
    }
}
