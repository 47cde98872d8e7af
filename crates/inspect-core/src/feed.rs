//! Measurement stream reader.
//!
//! Lines are read on a dedicated thread and handed over through a bounded
//! channel, so the loop can keep watching its stop flag while the producer
//! is idle. Lines are passed on as raw bytes; decoding is the loop's job.

use crate::ramp::STOP_POLL_SLICE;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;

/// Lines read ahead of the loop before the reader blocks.
const FEED_DEPTH: usize = 64;

pub(crate) struct LineFeed {
    rx: Receiver<io::Result<Vec<u8>>>,
}

impl LineFeed {
    pub(crate) fn spawn<R: BufRead + Send + 'static>(mut input: R) -> io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(FEED_DEPTH);
        thread::Builder::new()
            .name("measurement-feed".to_string())
            .spawn(move || loop {
                let mut line = Vec::new();
                match input.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        trim_line_ending(&mut line);
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            })?;
        Ok(Self { rx })
    }

    /// Next line, or `None` at end of stream or once `stop` is raised.
    pub(crate) fn next(&self, stop: &AtomicBool) -> Option<io::Result<Vec<u8>>> {
        loop {
            if stop.load(Ordering::Relaxed) {
                return None;
            }
            match self.rx.recv_timeout(STOP_POLL_SLICE) {
                Ok(line) => return Some(line),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

fn trim_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}
