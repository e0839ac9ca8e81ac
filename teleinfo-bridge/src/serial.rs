//! Serial meter link
//!
//! Opens the Teleinfo port (1200 baud, 7 data bits, even parity, 1 stop
//! bit) and reads it from a dedicated thread so the async pipeline never
//! blocks on the device. Assembled lines cross into the runtime over a
//! bounded channel; a read failure is forwarded once and closes the stream.

use crate::error::Result;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Historic Teleinfo rate, mandated by the protocol.
const BAUD_RATE: u32 = 1200;

/// Read timeout: only bounds how often the reader notices a shutdown
/// request, not how long it will wait for meter data overall.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

const LINE_CHANNEL_CAPACITY: usize = 32;

/// Handle to the open port's reader thread. Dropping it stops the thread,
/// which releases the port within one read timeout.
pub struct SerialLink {
    pub lines: mpsc::Receiver<io::Result<String>>,
    running: Arc<AtomicBool>,
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Open the meter port and start the line reader.
pub fn open(path: &str) -> Result<SerialLink> {
    let mut port = serialport::new(path, BAUD_RATE)
        .data_bits(DataBits::Seven)
        .parity(Parity::Even)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()?;

    debug!(path, baud = BAUD_RATE, "opened serial port");

    let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    let running = Arc::new(AtomicBool::new(true));
    let thread_running = Arc::clone(&running);

    thread::Builder::new()
        .name("serial-reader".to_string())
        .spawn(move || {
            let mut assembler = LineAssembler::default();
            let mut buf = [0u8; 256];
            while thread_running.load(Ordering::Relaxed) {
                match port.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => {
                        for line in assembler.push(&buf[..n]) {
                            if tx.blocking_send(Ok(line)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        return;
                    }
                }
            }
        })?;

    Ok(SerialLink { lines: rx, running })
}

/// Splits an incoming byte stream into `\n`-terminated lines, stripping
/// `\r`/`\n`. Keeps a partial line across reads.
#[derive(Debug, Default)]
pub(crate) struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                let text = String::from_utf8_lossy(&self.pending)
                    .trim_matches(|c| c == '\r' || c == '\n')
                    .to_string();
                lines.push(text);
                self.pending.clear();
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let mut assembler = LineAssembler::default();
        let lines = assembler.push(b"HCHC 040239678 -\r\nIINST 002 Y\r\n");
        assert_eq!(lines, vec!["HCHC 040239678 -", "IINST 002 Y"]);
    }

    #[test]
    fn keeps_partial_lines_across_chunks() {
        let mut assembler = LineAssembler::default();
        assert!(assembler.push(b"HCHC 0402").is_empty());
        assert!(assembler.push(b"39678 -").is_empty());
        let lines = assembler.push(b"\r\nPAPP");
        assert_eq!(lines, vec!["HCHC 040239678 -"]);
        let lines = assembler.push(b" 00460 +\r\n");
        assert_eq!(lines, vec!["PAPP 00460 +"]);
    }

    #[test]
    fn preserves_trailing_space_checksum() {
        // A space checksum byte must survive as a trailing empty token.
        let mut assembler = LineAssembler::default();
        let lines = assembler.push(b"PTEC HP.. \r\n");
        assert_eq!(lines, vec!["PTEC HP.. "]);
        assert_eq!(lines[0].split(' ').count(), 3);
    }

    #[test]
    fn handles_bare_newlines() {
        let mut assembler = LineAssembler::default();
        let lines = assembler.push(b"\n\nIMAX 042 E\n");
        assert_eq!(lines, vec!["", "", "IMAX 042 E"]);
    }
}
