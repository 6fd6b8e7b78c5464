use super::{default_resource, is_same_object, MemoryResource, ResourceStats};
use crate::error::AllocError;
use crate::sink::{LineBuf, LineSink, StdoutSink};
use std::alloc::Layout;
use std::borrow::Cow;
use std::fmt::Write;
use std::ptr::NonNull;

static STDOUT: StdoutSink = StdoutSink;

/// Memory resource that logs every request before forwarding it upstream.
///
/// Each `allocate` writes `<label>allocate <bytes> Bytes` and each `deallocate`
/// writes `<label>deallocate <bytes> Bytes` to its sink (stdout by default).
/// The upstream resource is borrowed: dropping a tracker releases nothing.
///
/// # Examples
///
/// ```rust
/// use memtrack::resource::{MemoryResource, ResourceTracker, SystemResource};
/// use memtrack::sink::CaptureSink;
///
/// let system = SystemResource;
/// let sink = CaptureSink::default();
/// let tracker = ResourceTracker::with_upstream("pool:", &system).with_sink(&sink);
///
/// let p = tracker.allocate_bytes(100, 8).unwrap();
/// unsafe { tracker.deallocate_bytes(p, 100, 8) };
///
/// assert_eq!(sink.lines(), vec!["pool:allocate 100 Bytes", "pool:deallocate 100 Bytes"]);
/// ```
pub struct ResourceTracker<'a> {
    upstream: &'a dyn MemoryResource,
    label: Cow<'a, str>,
    sink: &'a dyn LineSink,
    stats: Option<&'a ResourceStats>,
}

impl<'a> ResourceTracker<'a> {
    /// Unlabelled tracker over the process default resource.
    pub fn new() -> Self {
        Self::with_upstream("", default_resource())
    }

    /// Labelled tracker over the process default resource.
    pub fn labeled(label: impl Into<Cow<'a, str>>) -> Self {
        Self::with_upstream(label, default_resource())
    }

    pub fn with_upstream(label: impl Into<Cow<'a, str>>, upstream: &'a dyn MemoryResource) -> Self {
        Self {
            upstream,
            label: label.into(),
            sink: &STDOUT,
            stats: None,
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn LineSink) -> Self {
        self.sink = sink;
        self
    }

    /// Also aggregates every request into `stats`.
    pub fn with_stats(mut self, stats: &'a ResourceStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn upstream(&self) -> &'a dyn MemoryResource {
        self.upstream
    }

    /// Formats on the stack, falling back to the heap for long labels.
    fn log(&self, op: &str, bytes: usize) {
        let mut line = LineBuf::new();
        let _ = write!(line, "{}{op} {bytes} Bytes", self.label);
        if line.is_truncated() {
            self.sink.write_line(&format!("{}{op} {bytes} Bytes", self.label));
        } else {
            self.sink.write_line(line.as_str());
        }
    }
}

impl Default for ResourceTracker<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceTracker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("label", &self.label)
            .field("upstream", &self.upstream)
            .finish()
    }
}

impl MemoryResource for ResourceTracker<'_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.log("allocate", layout.size());
        let ptr = self.upstream.allocate(layout)?;

        if let Some(stats) = self.stats {
            stats.record_allocation(layout.size());
        }
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.log("deallocate", layout.size());
        if let Some(stats) = self.stats {
            stats.record_deallocation(layout.size());
        }

        unsafe { self.upstream.deallocate(ptr, layout) }
    }

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        if is_same_object(self, other) {
            return true;
        }

        other.as_resource_tracker().is_some_and(|other| {
            other.label == self.label && self.upstream.is_equal(other.upstream)
        })
    }

    fn as_resource_tracker(&self) -> Option<&ResourceTracker<'_>> {
        Some(self)
    }
}
