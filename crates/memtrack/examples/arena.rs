use memtrack::collections::{ResourceString, ResourceVec};
use memtrack::resource::{default_resource, MemoryResource, MonotonicBuffer};
use memtrack::TrackingAllocator;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::new(&memtrack::TRACKER);

fn fill(buf: &mut [u8], upstream: &dyn MemoryResource, count: usize) -> Result<(), memtrack::AllocError> {
    let pool = MonotonicBuffer::with_buffer(buf, upstream);
    let mut coll = ResourceVec::new_in(&pool);
    for _ in 0..count {
        coll.try_push(ResourceString::from_str_in("just a non-SSO string", &pool)?)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut buf = [0u8; 200_000];
    let upstream = default_resource();

    for count in [1000, 2000, 500, 2000, 3000, 50000, 1000] {
        println!("-- check with {count} elements:");
        memtrack::TRACKER.reset();
        fill(&mut buf, upstream, count)?;
        memtrack::TRACKER.status();
    }

    Ok(())
}
