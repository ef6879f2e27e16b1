//! Scripted in-memory port for unit tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use super::Port;
use crate::error::Result;

type Responder = Box<dyn FnMut(&str) -> Option<String> + Send>;

/// In-memory [`Port`] that records every command line and answers through a
/// responder closure.
pub(crate) struct MockPort {
    rx: VecDeque<u8>,
    partial: Vec<u8>,
    sent: Vec<String>,
    responder: Option<Responder>,
    fail_after: Option<usize>,
    closed: bool,
}

impl MockPort {
    pub(crate) fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            partial: Vec::new(),
            sent: Vec::new(),
            responder: None,
            fail_after: None,
            closed: false,
        }
    }

    /// Answer each complete command line with the closure's output.
    pub(crate) fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Fail every write once `lines` command lines have been sent.
    pub(crate) fn fail_after(mut self, lines: usize) -> Self {
        self.fail_after = Some(lines);
        self
    }

    /// Make bytes readable immediately.
    pub(crate) fn push_reply(&mut self, reply: &str) {
        self.rx
            .extend(reply.as_bytes());
    }

    pub(crate) fn sent_lines(&self) -> Vec<&str> {
        self.sent
            .iter()
            .map(String::as_str)
            .collect()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        if self.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        if self
            .fail_after
            .is_some_and(|limit| self.sent.len() >= limit)
        {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }

        for &byte in buf {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&self.partial).into_owned();
                self.partial.clear();
                if let Some(reply) = self
                    .responder
                    .as_mut()
                    .and_then(|responder| responder(&line))
                {
                    self.rx
                        .extend(reply.into_bytes());
                }
                self.sent.push(line);
            } else {
                self.partial.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn clear_buffers(&mut self) -> Result<()> {
        self.rx.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
