use memtrack::collections::{ResourceString, ResourceVec};
use memtrack::output::Summary;
use memtrack::resource::{
    default_resource, null_resource, set_default_resource, system_resource, MemoryResource,
    MonotonicBuffer, PoolOptions, PoolResource, ResourceStats, ResourceTracker,
};
use memtrack::sink::{CaptureSink, ChannelSink};
use memtrack::{AllocError, AllocationTracker};
use std::alloc::Layout;
use std::ptr::NonNull;

#[test]
fn test_tracker_end_to_end() {
    let tracker = AllocationTracker::with_sink(CaptureSink::new());
    tracker.reset();

    let a = tracker.allocate(64, 0, "test").unwrap();
    let b = tracker.allocate(128, 16, "test").unwrap();

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.allocations, 2);
    assert_eq!(snapshot.total_bytes, 192);

    unsafe {
        tracker.deallocate(a, 64, 0);
        tracker.deallocate(b, 128, 16);
    }
    assert_eq!(tracker.snapshot().live_bytes(), 0);
    assert!(tracker.sink().is_empty());
}

#[test]
fn test_reset_then_status() {
    let tracker = AllocationTracker::with_sink(CaptureSink::new());
    let p = tracker.allocate(10, 0, "before").unwrap();

    tracker.reset();
    tracker.status();

    assert_eq!(tracker.sink().lines(), vec!["0 allocations for 0 bytes"]);
    unsafe { tracker.deallocate(p, 10, 0) };
}

#[test]
fn test_trace_lines() {
    let tracker = AllocationTracker::with_sink(CaptureSink::new());
    tracker.trace(true);

    let a = tracker.allocate(77, 0, "operator new").unwrap();
    let b = tracker.allocate(77, 64, "operator new aligned").unwrap();
    tracker.trace(false);
    let c = tracker.allocate(77, 0, "quiet").unwrap();

    let lines = tracker.sink().lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("#1 operator new (77 bytes, default-aligned) => "));
    assert!(lines[0].ends_with("(total: 77 bytes)"));
    assert!(lines[1].starts_with("#2 operator new aligned (77 bytes, 64-byte aligned) => "));
    assert_eq!(b.as_ptr() as usize % 64, 0);

    unsafe {
        tracker.deallocate(a, 77, 0);
        tracker.deallocate(b, 77, 64);
        tracker.deallocate(c, 77, 0);
    }
}

#[test]
fn test_channel_sink_hands_lines_to_another_thread() {
    let (sink, rx) = ChannelSink::bounded(16);
    let tracker = AllocationTracker::with_sink(sink);
    tracker.trace(true);

    let p = tracker.allocate(12, 0, "worker").unwrap();
    tracker.status();

    let collector = std::thread::spawn(move || rx.iter().take(2).collect::<Vec<_>>());
    let lines = collector.join().unwrap();

    assert!(lines[0].contains("(12 bytes, default-aligned)"));
    assert_eq!(lines[1], "1 allocations for 12 bytes");
    unsafe { tracker.deallocate(p, 12, 0) };
}

/// Upstream that always answers with the same address.
struct FixedResource(usize);

impl MemoryResource for FixedResource {
    fn allocate(&self, _layout: Layout) -> Result<NonNull<u8>, AllocError> {
        Ok(NonNull::new(self.0 as *mut u8).unwrap())
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        std::ptr::addr_eq(self, other)
    }
}

#[test]
fn test_resource_tracker_passthrough() {
    let upstream = FixedResource(0xdead0);
    let sink = CaptureSink::new();
    let tracker = ResourceTracker::with_upstream("pool:", &upstream).with_sink(&sink);

    let p = tracker.allocate_bytes(100, 8).unwrap();

    assert_eq!(p.as_ptr() as usize, 0xdead0);
    assert_eq!(sink.lines(), vec!["pool:allocate 100 Bytes"]);
}

#[test]
fn test_resource_tracker_equality() {
    let sink = CaptureSink::new();
    let a = ResourceTracker::with_upstream("a:", system_resource()).with_sink(&sink);
    let b = ResourceTracker::with_upstream("b:", system_resource()).with_sink(&sink);

    assert!(a.is_equal(&a));
    assert!(!a.is_equal(&b));
    assert!(!b.is_equal(&a));
}

#[test]
fn test_null_resource_always_fails() {
    for (bytes, align) in [(0, 0), (1, 1), (4096, 64)] {
        assert!(null_resource().allocate_bytes(bytes, align).is_err());
    }
}

#[test]
fn test_default_resource_can_be_replaced() {
    static NOISY: std::sync::OnceLock<ResourceTracker<'static>> = std::sync::OnceLock::new();
    static SINK: CaptureSink = CaptureSink::new();

    let noisy = NOISY.get_or_init(|| ResourceTracker::labeled("default:").with_sink(&SINK));
    let previous = set_default_resource(noisy);
    assert!(previous.is_equal(system_resource()));

    let p = default_resource().allocate_bytes(24, 8).unwrap();
    unsafe { default_resource().deallocate_bytes(p, 24, 8) };
    set_default_resource(previous);

    assert_eq!(
        SINK.lines(),
        vec!["default:allocate 24 Bytes", "default:deallocate 24 Bytes"]
    );
}

#[test]
fn test_stacked_pool_over_monotonic_buffer() {
    let keep_stats = ResourceStats::new();
    let sync_stats = ResourceStats::new();
    let keep_sink = CaptureSink::new();
    let sync_sink = CaptureSink::new();

    {
        let track1 = ResourceTracker::with_upstream("keeppool:", system_resource())
            .with_sink(&keep_sink)
            .with_stats(&keep_stats);
        let keeppool = MonotonicBuffer::with_capacity(10_000, &track1);
        {
            let track2 = ResourceTracker::with_upstream("  syncpool:", &keeppool)
                .with_sink(&sync_sink)
                .with_stats(&sync_stats);
            let pool = PoolResource::with_options(PoolOptions::default(), &track2);

            for _ in 0..20 {
                let mut coll = ResourceVec::with_capacity_in(100, &pool).unwrap();
                for _ in 0..100 {
                    coll.push(ResourceString::from_str_in("just a non-SSO string", &pool).unwrap());
                }
            }

            // after the first round every block comes back from the free lists
            let settled = sync_stats.snapshot().allocations;
            let mut coll = ResourceVec::with_capacity_in(100, &pool).unwrap();
            coll.push(ResourceString::from_str_in("just another string!!", &pool).unwrap());
            assert_eq!(sync_stats.snapshot().allocations, settled);
        }

        assert_eq!(sync_stats.snapshot().live_bytes, 0);
        assert!(keep_stats.snapshot().allocations >= 1);
        assert_eq!(keep_stats.snapshot().deallocations, 0);
    }

    assert_eq!(keep_stats.snapshot().live_bytes, 0);
    assert!(sync_sink.lines().iter().all(|l| l.starts_with("  syncpool:")));
    assert!(keep_sink.lines().iter().all(|l| l.starts_with("keeppool:")));

    let summary = Summary::new("stacked")
        .with_resource("keeppool:", &keep_stats)
        .with_resource("  syncpool:", &sync_stats);
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["resources"].as_array().unwrap().len(), 2);
}

#[test]
fn test_monotonic_buffer_over_null_resource() {
    let mut buf = [0u8; 4096];
    let pool = MonotonicBuffer::with_buffer(&mut buf, null_resource());
    let mut coll = ResourceVec::new_in(&pool);

    let err = loop {
        let stored = ResourceString::from_str_in("Customer", &pool).and_then(|name| coll.try_push(name));
        if let Err(err) = stored {
            break err;
        }
    };

    assert!(matches!(err, AllocError::Exhausted { .. }));
    assert!(!coll.is_empty());
    assert!(coll.iter().all(|name| name == "Customer"));
}
