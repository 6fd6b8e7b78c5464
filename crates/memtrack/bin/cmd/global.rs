use super::SAMPLE;
use clap::Parser;
use eyre::Result;
use memtrack::output::Summary;
use memtrack::TRACKER;

#[repr(align(64))]
struct CacheLine([String; 4]);

#[derive(Debug, Parser)]
pub struct NewArgs {}

impl NewArgs {
    pub fn run(&self) -> Result<Summary> {
        TRACKER.reset();

        let s = String::from("string value with 26 chars");
        let p1 = Box::new(String::from("an initial value with even 35 chars"));
        let p2 = Box::new(CacheLine(Default::default()));
        let p3: Box<[String]> = vec![
            "7 chars".to_string(),
            "x".to_string(),
            "or 11 chars".to_string(),
            "a string value with 28 chars".to_string(),
        ]
        .into_boxed_slice();

        TRACKER.status();
        let snapshot = TRACKER.snapshot();

        tracing::debug!(
            chars = s.len() + p1.len(),
            slots = p2.0.len() + p3.len(),
            "global demo done"
        );
        Ok(Summary::new("memtrack::new").with_global(snapshot))
    }
}

#[derive(Debug, Parser)]
pub struct VecArgs {
    #[arg(long, default_value_t = 1000, help = "Number of strings to push")]
    pub count: usize,
}

impl VecArgs {
    pub fn run(&self) -> Result<Summary> {
        TRACKER.reset();

        let mut coll = Vec::new();
        for _ in 0..self.count {
            coll.push(SAMPLE.to_string());
        }

        TRACKER.status();
        let snapshot = TRACKER.snapshot();

        drop(coll);
        Ok(Summary::new("memtrack::vec").with_global(snapshot))
    }
}
