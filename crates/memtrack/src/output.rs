use crate::resource::{ResourceStats, StatsSnapshot};
use crate::tracker::Snapshot;
use colored::*;
use prettytable::{color, Attr, Cell, Row, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

const PERCENTILES: [u8; 2] = [50, 99];

/// Output format for allocation summaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Table,
    Json,
    JsonPretty,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown format `{0}`, expected one of: table, json, json-pretty")]
pub struct UnknownFormat(String);

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Format::Table),
            "json" => Ok(Format::Json),
            "json-pretty" | "json_pretty" => Ok(Format::JsonPretty),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl Format {
    pub fn reporter(self) -> Box<dyn Reporter> {
        match self {
            Format::Table => Box::new(TableReporter),
            Format::Json => Box::new(JsonReporter),
            Format::JsonPretty => Box::new(JsonPrettyReporter),
        }
    }
}

/// One [`ResourceTracker`](crate::resource::ResourceTracker) worth of traffic.
#[derive(Serialize, Debug, Clone)]
pub struct ResourceRow {
    pub label: String,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    /// Request sizes keyed by `p50`, `p99`.
    pub percentiles: BTreeMap<String, u64>,
}

impl ResourceRow {
    pub fn new(label: impl Into<String>, stats: &ResourceStats) -> Self {
        let percentiles = PERCENTILES
            .iter()
            .map(|p| (format!("p{p}"), stats.size_percentile(f64::from(*p))))
            .collect();

        Self {
            label: label.into(),
            stats: stats.snapshot(),
            percentiles,
        }
    }
}

/// Everything a [`Reporter`] gets to see at the end of a run.
#[derive(Serialize, Debug, Clone, Default)]
pub struct Summary {
    pub caller_name: String,
    pub global: Option<Snapshot>,
    pub resources: Vec<ResourceRow>,
}

impl Summary {
    pub fn new(caller_name: impl Into<String>) -> Self {
        Self {
            caller_name: caller_name.into(),
            ..Self::default()
        }
    }

    pub fn with_global(mut self, snapshot: Snapshot) -> Self {
        self.global = Some(snapshot);
        self
    }

    pub fn with_resource(mut self, label: impl Into<String>, stats: &ResourceStats) -> Self {
        self.resources.push(ResourceRow::new(label, stats));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.resources.is_empty()
    }

    fn headers() -> [&'static str; 9] {
        [
            "Resource", "Allocs", "Deallocs", "Allocated", "Freed", "Live", "Peak", "P50", "P99",
        ]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        let mut rows = Vec::with_capacity(self.resources.len() + 1);

        if let Some(global) = &self.global {
            rows.push(vec![
                "global".to_string(),
                global.allocations.to_string(),
                global.deallocations.to_string(),
                format_bytes(global.total_bytes as u64),
                format_bytes(global.freed_bytes as u64),
                format_bytes(global.live_bytes() as u64),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
            ]);
        }

        for row in &self.resources {
            let percentile = |key: &str| {
                row.percentiles
                    .get(key)
                    .map(|bytes| format_bytes(*bytes))
                    .unwrap_or_else(|| "-".to_string())
            };
            rows.push(vec![
                row.label.trim().to_string(),
                row.stats.allocations.to_string(),
                row.stats.deallocations.to_string(),
                format_bytes(row.stats.bytes_allocated),
                format_bytes(row.stats.bytes_freed),
                format_bytes(row.stats.live_bytes),
                format_bytes(row.stats.peak_live_bytes),
                percentile("p50"),
                percentile("p99"),
            ]);
        }

        rows
    }

    pub(crate) fn table(&self) -> Table {
        let use_colors = std::env::var("NO_COLOR").is_err();
        let mut table = Table::new();

        let header_cells: Vec<Cell> = Self::headers()
            .into_iter()
            .map(|header| {
                if use_colors {
                    Cell::new(header)
                        .with_style(Attr::Bold)
                        .with_style(Attr::ForegroundColor(color::CYAN))
                } else {
                    Cell::new(header).with_style(Attr::Bold)
                }
            })
            .collect();
        table.add_row(Row::new(header_cells));

        for row in self.rows() {
            table.add_row(Row::new(row.iter().map(|value| Cell::new(value)).collect()));
        }

        table
    }
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log(THRESHOLD).floor() as usize).min(UNITS.len() - 1);
    let unit_value = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", unit_value, UNITS[unit_index])
    }
}

/// Renders a [`Summary`] somewhere.
///
/// # Examples
///
/// ```rust
/// use memtrack::output::Summary;
/// use memtrack::Reporter;
/// use std::error::Error;
///
/// struct OneLiner;
///
/// impl Reporter for OneLiner {
///     fn report(&self, summary: &Summary) -> Result<(), Box<dyn Error>> {
///         println!("{}: {} trackers", summary.caller_name, summary.resources.len());
///         Ok(())
///     }
/// }
///
/// OneLiner.report(&Summary::new("demo")).unwrap();
/// ```
pub trait Reporter {
    fn report(&self, summary: &Summary) -> Result<(), Box<dyn std::error::Error>>;
}

fn display_no_allocations_message(caller_name: &str) {
    println!(
        "{} nothing was tracked in {}",
        "[memtrack]".blue().bold(),
        caller_name.yellow()
    );
}

pub struct TableReporter;

impl Reporter for TableReporter {
    fn report(&self, summary: &Summary) -> Result<(), Box<dyn std::error::Error>> {
        if summary.is_empty() {
            display_no_allocations_message(&summary.caller_name);
            return Ok(());
        }

        println!(
            "{} allocation summary for {}",
            "[memtrack]".blue().bold(),
            summary.caller_name.yellow()
        );
        summary.table().printstd();
        Ok(())
    }
}

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&self, summary: &Summary) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", serde_json::to_string(summary)?);
        Ok(())
    }
}

pub struct JsonPrettyReporter;

impl Reporter for JsonPrettyReporter {
    fn report(&self, summary: &Summary) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", serde_json::to_string_pretty(summary)?);
        Ok(())
    }
}
