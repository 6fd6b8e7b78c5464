//! Line-oriented output for tracker events.
//!
//! Every tracker formats its event into a [`LineBuf`] on the stack and hands the
//! finished line to a [`LineSink`]. Sinks used by a tracker that is installed as
//! the global allocator must not allocate; [`StderrSink`] is the one that is
//! guaranteed not to.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::fmt;
use std::io::Write;
use std::sync::Mutex;

/// Maximum length of a single formatted event line, in bytes.
pub const LINE_CAPACITY: usize = 256;

/// Destination for formatted tracker lines.
///
/// # Examples
///
/// ```rust
/// use memtrack::sink::{CaptureSink, LineSink};
///
/// let sink = CaptureSink::default();
/// sink.write_line("pool:allocate 100 Bytes");
/// assert_eq!(sink.lines(), vec!["pool:allocate 100 Bytes".to_string()]);
/// ```
pub trait LineSink: Send + Sync {
    /// Writes one line. `line` carries no trailing newline.
    fn write_line(&self, line: &str);
}

impl<T: LineSink + ?Sized> LineSink for &T {
    fn write_line(&self, line: &str) {
        (**self).write_line(line)
    }
}

/// Fixed-capacity `fmt::Write` target living on the stack.
///
/// Output past [`LINE_CAPACITY`] is dropped at the last UTF-8 boundary that fits,
/// so formatting into it never fails and never allocates.
pub struct LineBuf {
    buf: [u8; LINE_CAPACITY],
    len: usize,
    truncated: bool,
}

impl LineBuf {
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_CAPACITY],
            len: 0,
            truncated: false,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl Default for LineBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = LINE_CAPACITY - self.len;
        let mut end = s.len().min(room);
        if end < s.len() {
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            self.truncated = true;
        }

        self.buf[self.len..self.len + end].copy_from_slice(&s.as_bytes()[..end]);
        self.len += end;
        Ok(())
    }
}

/// Unbuffered standard error, written with a single `write(2)` per line.
///
/// Never allocates, which makes it the only sink that is safe for a tracker
/// installed as the global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl LineSink for StderrSink {
    fn write_line(&self, line: &str) {
        let mut out = [0u8; LINE_CAPACITY + 1];
        let len = line.len().min(LINE_CAPACITY);
        out[..len].copy_from_slice(&line.as_bytes()[..len]);
        out[len] = b'\n';
        write_stderr(&out[..=len]);
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn write_stderr(mut bytes: &[u8]) {
            while !bytes.is_empty() {
                let written = unsafe {
                    libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len())
                };
                if written < 0 {
                    if std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                        continue;
                    }
                    return;
                }
                bytes = &bytes[written as usize..];
            }
        }
    } else {
        fn write_stderr(bytes: &[u8]) {
            let _ = std::io::stderr().write_all(bytes);
        }
    }
}

/// Locked standard output, so lines interleave correctly with `println!`.
///
/// The std stdout buffer is allocated on first use. A tracking global
/// allocator counts that allocation unless the line is written from inside a
/// tracker event.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(line.as_bytes());
        let _ = out.write_all(b"\n");
    }
}

/// Collects lines in memory. Allocates on every line.
#[derive(Debug, Default)]
pub struct CaptureSink {
    lines: Mutex<Vec<String>>,
}

impl CaptureSink {
    pub const fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl LineSink for CaptureSink {
    fn write_line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_owned());
        }
    }
}

/// Forwards lines to another thread over a bounded channel.
///
/// Lines are dropped when the channel is full or the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<String>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<String>) {
        let (sender, receiver) = bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl LineSink for ChannelSink {
    fn write_line(&self, line: &str) {
        let _ = self.sender.try_send(line.to_owned());
    }
}
