use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::info;

use crate::error::MapfResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub costs: usize,
    pub time_ms: usize,
    pub low_level_expand_nodes: usize,
    pub high_level_expand_nodes: usize,
    pub high_level_generate_nodes: usize,
    pub branching_rounds: usize,
    pub branching_timeouts: usize,
}

impl Stats {
    pub(crate) fn merge(&mut self, other: &Stats) {
        self.low_level_expand_nodes += other.low_level_expand_nodes;
        self.high_level_expand_nodes += other.high_level_expand_nodes;
        self.high_level_generate_nodes += other.high_level_generate_nodes;
        self.branching_rounds += other.branching_rounds;
        self.branching_timeouts += other.branching_timeouts;
    }

    pub fn print(&self, solver: &str) {
        info!(
            "{solver}: Cost {:?} Time(milliseconds) {:?} High level expand nodes number: {:?} High level generate nodes number: {:?} Low level expand nodes number {:?} Branching timeouts {:?}",
            self.costs,
            self.time_ms,
            self.high_level_expand_nodes,
            self.high_level_generate_nodes,
            self.low_level_expand_nodes,
            self.branching_timeouts
        );
    }
}

/// One benchmark record.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub algorithm: String,
    pub map: String,
    pub agents: usize,
    pub instance: usize,
    pub success: bool,
    pub optimal: bool,
    pub cost: usize,
    pub runtime_ms: u128,
    pub status: String,
}

/// Appends report rows to a CSV file, writing the header only for a new file.
pub struct ReportWriter {
    writer: csv::Writer<File>,
}

impl ReportWriter {
    pub fn open(path: impl AsRef<Path>) -> MapfResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let is_new = !path.exists() || std::fs::metadata(path)?.len() == 0;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        Ok(ReportWriter { writer })
    }

    pub fn write(&mut self, row: &ReportRow) -> MapfResult<()> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlgorithmSummary {
    pub runs: usize,
    pub successes: usize,
    pub total_runtime_ms: u128,
}

impl AlgorithmSummary {
    /// Percentage of runs that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.runs == 0 {
            return 0.0;
        }
        self.successes as f64 / self.runs as f64 * 100.0
    }

    pub fn average_runtime_ms(&self) -> f64 {
        if self.runs == 0 {
            return 0.0;
        }
        self.total_runtime_ms as f64 / self.runs as f64
    }
}

/// Success rate and average runtime per algorithm over a benchmark run.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    per_algorithm: BTreeMap<String, AlgorithmSummary>,
}

impl Summary {
    pub fn record(&mut self, row: &ReportRow) {
        let entry = self.per_algorithm.entry(row.algorithm.clone()).or_default();
        entry.runs += 1;
        entry.successes += usize::from(row.success);
        entry.total_runtime_ms += row.runtime_ms;
    }

    pub fn get(&self, algorithm: &str) -> Option<&AlgorithmSummary> {
        self.per_algorithm.get(algorithm)
    }

    pub fn print(&self) {
        for (algorithm, summary) in &self.per_algorithm {
            info!(
                "{algorithm}: Success rate {:.1}% Average runtime(milliseconds) {:.0} Runs {}",
                summary.success_rate(),
                summary.average_runtime_ms(),
                summary.runs
            );
        }
    }
}
