use super::SAMPLE;
use clap::Parser;
use eyre::Result;
use memtrack::collections::{ResourceString, ResourceVec};
use memtrack::output::Summary;
use memtrack::resource::{
    MonotonicBuffer, PoolOptions, PoolResource, ResourceStats, ResourceTracker,
};

#[derive(Debug, Parser)]
pub struct PoolsArgs {
    #[arg(long, default_value_t = 100, help = "Number of vectors to build and drop")]
    pub rounds: usize,

    #[arg(long, default_value_t = 100, help = "Strings per vector")]
    pub count: usize,

    #[arg(long, default_value_t = 10_000, help = "First chunk size of the keep pool")]
    pub initial: usize,
}

impl PoolsArgs {
    pub fn run(&self) -> Result<Summary> {
        let keep_stats = ResourceStats::new();
        let sync_stats = ResourceStats::new();

        {
            // never frees, grows in chunks starting at `initial` bytes
            let track1 = ResourceTracker::labeled("keeppool:").with_stats(&keep_stats);
            let keeppool = MonotonicBuffer::with_capacity(self.initial, &track1);
            {
                let track2 =
                    ResourceTracker::with_upstream("  syncpool:", &keeppool).with_stats(&sync_stats);
                let pool = PoolResource::with_options(PoolOptions::default(), &track2);

                for round in 0..self.rounds {
                    let mut coll = ResourceVec::with_capacity_in(self.count, &pool)?;
                    for _ in 0..self.count {
                        coll.try_push(ResourceString::from_str_in(SAMPLE, &pool)?)?;
                    }
                    if round == 2 {
                        println!("--- third iteration done");
                    }
                }
                // blocks went back to the pool, nothing went upstream yet
                println!("--- leave scope of pool");
            }
            println!("--- leave scope of keeppool");
        }

        Ok(Summary::new("memtrack::pools")
            .with_resource("keeppool:", &keep_stats)
            .with_resource("  syncpool:", &sync_stats))
    }
}
