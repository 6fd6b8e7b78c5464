use super::SAMPLE;
use clap::Parser;
use eyre::Result;
use memtrack::collections::{ResourceString, ResourceVec};
use memtrack::output::Summary;
use memtrack::resource::{MonotonicBuffer, ResourceStats, ResourceTracker};
use memtrack::{Snapshot, TRACKER};

const SWEEP: [usize; 7] = [1000, 2000, 500, 2000, 3000, 50000, 1000];

#[derive(Debug, Parser)]
pub struct ArenaArgs {
    #[arg(long, default_value_t = 1000, help = "Number of strings to push")]
    pub count: usize,

    #[arg(long, default_value_t = 200_000, help = "Size of the initial buffer in bytes")]
    pub buffer: usize,
}

impl ArenaArgs {
    pub fn run(&self) -> Result<Summary> {
        let mut buf = vec![0u8; self.buffer];
        let overflow = ResourceStats::new();

        let snapshot = fill_arena(&mut buf, self.count, &overflow)?;

        Ok(Summary::new("memtrack::arena")
            .with_global(snapshot)
            .with_resource("overflow:", &overflow))
    }
}

#[derive(Debug, Parser)]
pub struct ArenaSweepArgs {
    #[arg(long, default_value_t = 200_000, help = "Size of the initial buffer in bytes")]
    pub buffer: usize,
}

impl ArenaSweepArgs {
    pub fn run(&self) -> Result<Summary> {
        let mut buf = vec![0u8; self.buffer];
        let overflow = ResourceStats::new();

        let mut last = Snapshot::default();
        for count in SWEEP {
            println!("-- check with {count} elements:");
            last = fill_arena(&mut buf, count, &overflow)?;
        }

        Ok(Summary::new("memtrack::arena-sweep")
            .with_global(last)
            .with_resource("overflow:", &overflow))
    }
}

/// Pushes `count` strings into a vector drawing from `buf`, then prints how
/// many global allocations that took. Chunks taken once `buf` is full are
/// logged as `overflow:`.
fn fill_arena(buf: &mut [u8], count: usize, overflow: &ResourceStats) -> Result<Snapshot> {
    let spill = ResourceTracker::labeled("overflow:").with_stats(overflow);

    TRACKER.reset();
    {
        let pool = MonotonicBuffer::with_buffer(buf, &spill);
        let mut coll = ResourceVec::new_in(&pool);
        for _ in 0..count {
            coll.try_push(ResourceString::from_str_in(SAMPLE, &pool)?)?;
        }
    }
    TRACKER.status();

    let snapshot = TRACKER.snapshot();
    tracing::debug!(count, allocations = snapshot.allocations, "arena filled");
    Ok(snapshot)
}
