use memtrack::collections::{ResourceString, ResourceVec};
use memtrack::output::{Summary, TableReporter};
use memtrack::resource::{MonotonicBuffer, PoolResource, ResourceStats, ResourceTracker};
use memtrack::Reporter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let keep_stats = ResourceStats::new();
    let sync_stats = ResourceStats::new();

    {
        let track1 = ResourceTracker::labeled("keeppool:").with_stats(&keep_stats);
        let keeppool = MonotonicBuffer::with_capacity(10_000, &track1);
        {
            let track2 = ResourceTracker::with_upstream("  syncpool:", &keeppool).with_stats(&sync_stats);
            let pool = PoolResource::new(&track2);

            for j in 0..100 {
                let mut coll = ResourceVec::with_capacity_in(100, &pool)?;
                for _ in 0..100 {
                    coll.try_push(ResourceString::from_str_in("just a non-SSO string", &pool)?)?;
                }
                if j == 2 {
                    println!("--- third iteration done");
                }
            }
            println!("--- leave scope of pool");
        }
        println!("--- leave scope of keeppool");
    }

    let summary = Summary::new("pool_tracker")
        .with_resource("keeppool:", &keep_stats)
        .with_resource("  syncpool:", &sync_stats);
    TableReporter.report(&summary)
}
