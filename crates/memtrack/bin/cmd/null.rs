use clap::Parser;
use eyre::Result;
use memtrack::collections::{ResourceString, ResourceVec};
use memtrack::output::Summary;
use memtrack::resource::{null_resource, MonotonicBuffer, ResourceStats, ResourceTracker};

#[derive(Debug, Parser)]
pub struct NullArgs {
    #[arg(long, default_value_t = 200_000, help = "Size of the only buffer in bytes")]
    pub buffer: usize,
}

impl NullArgs {
    pub fn run(&self) -> Result<Summary> {
        let mut buf = vec![0u8; self.buffer];
        let stats = ResourceStats::new();
        let upstream = ResourceTracker::with_upstream("null:", null_resource()).with_stats(&stats);

        let stored = {
            let pool = MonotonicBuffer::with_buffer(&mut buf, &upstream);
            let mut coll = ResourceVec::new_in(&pool);

            let outcome = (0..self.buffer).try_for_each(|i| {
                let name = ResourceString::from_str_in(&format!("Customer{i}"), &pool)?;
                coll.try_push((i, name))
            });
            if let Err(err) = outcome {
                eprintln!("allocation failed: {err}");
            }
            coll.len()
        };
        println!("size: {stored}");

        Ok(Summary::new("memtrack::null").with_resource("null:", &stats))
    }
}
