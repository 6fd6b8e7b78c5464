mod cmd;
use clap::{Parser, Subcommand};
use cmd::arena::{ArenaArgs, ArenaSweepArgs};
use cmd::global::{NewArgs, VecArgs};
use cmd::null::NullArgs;
use cmd::pools::PoolsArgs;
use eyre::{eyre, Result};
use memtrack::output::Summary;
use memtrack::{Format, StatusGuard, TrackingAllocator, TRACKER};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::new(&TRACKER);

#[derive(Subcommand, Debug)]
pub enum MTSubcommand {
    #[command(about = "Trace strings, boxed slices and an over-aligned box on the global heap")]
    New(NewArgs),
    #[command(about = "Fill a Vec<String> on the global heap")]
    Vec(VecArgs),
    #[command(about = "Fill a resource vector of strings from a monotonic buffer")]
    Arena(ArenaArgs),
    #[command(about = "Repeat the arena demo for a series of element counts")]
    ArenaSweep(ArenaSweepArgs),
    #[command(about = "Log the traffic of a pool stacked on a monotonic buffer")]
    Pools(PoolsArgs),
    #[command(about = "Fill a fixed buffer with no upstream until allocation fails")]
    Null(NullArgs),
}

impl MTSubcommand {
    fn run(&self) -> Result<Summary> {
        match self {
            MTSubcommand::New(args) => args.run(),
            MTSubcommand::Vec(args) => args.run(),
            MTSubcommand::Arena(args) => args.run(),
            MTSubcommand::ArenaSweep(args) => args.run(),
            MTSubcommand::Pools(args) => args.run(),
            MTSubcommand::Null(args) => args.run(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "memtrack CLI: watch where allocations go, on the global heap and through memory resources

https://github.com/pawurb/memtrack"
)]
pub struct MTArgs {
    #[arg(
        long,
        global = true,
        default_value = "table",
        help = "Summary format: table, json or json-pretty"
    )]
    pub format: Format,

    #[arg(long, global = true, help = "Print a line for every global allocation")]
    pub trace: bool,

    #[command(subcommand)]
    pub cmd: MTSubcommand,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("MEMTRACK_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let root_args = MTArgs::parse();

    let summary = {
        let _status = if root_args.trace {
            StatusGuard::traced(&TRACKER)
        } else {
            StatusGuard::new(&TRACKER)
        };
        root_args.cmd.run()?
    };

    root_args
        .format
        .reporter()
        .report(&summary)
        .map_err(|err| eyre!("failed to report summary: {err}"))?;

    Ok(())
}
