use anyhow::{anyhow, Context};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::solver::{Algorithm, SolverSettings};

#[derive(Parser, Debug, Default)]
#[command(
    name = "mapf-acbs",
    about = "Conflict-based search variants for multi-agent path finding.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(long, help = "Path to the map file")]
    pub map_path: Option<String>,

    #[arg(long, help = "Path to a YAML agent list; random agents are generated if absent")]
    pub agents_path: Option<String>,

    #[arg(long, help = "Path to the CSV report")]
    pub output_path: Option<String>,

    #[arg(long, help = "Write the last solution found as JSON to this path")]
    pub solution_path: Option<String>,

    #[arg(long, help = "Number of agents")]
    pub num_agents: Option<usize>,

    #[arg(long, help = "Number of random instances to run")]
    pub instances: Option<usize>,

    #[arg(long, help = "Seed for the random number generator")]
    pub seed: Option<u64>,

    #[arg(long, help = "Solver to use: cbs, ecbs, eecbs, acbs or all")]
    pub solver: Option<String>,

    #[arg(long, help = "Sub-optimality factor w >= 1.0")]
    pub sub_optimal: Option<f64>,

    #[arg(long, help = "Wall-clock budget per solve in milliseconds")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub map_path: String,
    pub agents_path: Option<String>,
    pub output_path: String,
    pub solution_path: Option<String>,
    pub num_agents: usize,
    pub instances: usize,
    pub seed: u64,
    pub solver: String,
    pub sub_optimal: f64,
    pub timeout_ms: u64,

    // Search tuning
    pub iteration_limit: usize,
    pub branching_time_slice_ms: u64,
    pub max_children_per_conflict: usize,
    pub interval_duration: usize,
    pub branching_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        let settings = SolverSettings::default();
        Config {
            map_path: "map_file/empty-16-16/empty-16-16.map".to_string(),
            agents_path: None,
            output_path: "result/result.csv".to_string(),
            solution_path: None,
            num_agents: 10,
            instances: 1,
            seed: 0,
            solver: "all".to_string(),
            sub_optimal: 1.2,
            timeout_ms: 30_000,
            iteration_limit: settings.iteration_limit,
            branching_time_slice_ms: settings.branching_time_slice.as_millis() as u64,
            max_children_per_conflict: settings.max_children_per_conflict,
            interval_duration: settings.interval_duration,
            branching_workers: settings.branching_workers,
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Self> {
        if let Some(map_path) = &cli.map_path {
            self.map_path = map_path.clone();
        }
        if let Some(agents_path) = &cli.agents_path {
            self.agents_path = Some(agents_path.clone());
        }
        if let Some(output_path) = &cli.output_path {
            self.output_path = output_path.clone();
        }
        if let Some(solution_path) = &cli.solution_path {
            self.solution_path = Some(solution_path.clone());
        }
        if let Some(num_agents) = cli.num_agents {
            self.num_agents = num_agents;
        }
        if let Some(instances) = cli.instances {
            self.instances = instances;
        }
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        if let Some(solver) = &cli.solver {
            self.solver = solver.clone();
        }
        if let Some(sub_optimal) = cli.sub_optimal {
            self.sub_optimal = sub_optimal;
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            self.timeout_ms = timeout_ms;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.sub_optimal.is_finite() || self.sub_optimal < 1.0 {
            return Err(anyhow!(
                "Sub-optimal value must be at least 1.0, got {}",
                self.sub_optimal
            ));
        }
        self.algorithms()?;

        for (name, value) in [
            ("branching_workers", self.branching_workers),
            ("max_children_per_conflict", self.max_children_per_conflict),
            ("interval_duration", self.interval_duration),
            ("iteration_limit", self.iteration_limit),
            ("instances", self.instances),
        ] {
            if value == 0 {
                return Err(anyhow!("{name} must be greater than 0"));
            }
        }
        Ok(())
    }

    /// Solvers selected by `solver`; `all` runs every variant.
    pub fn algorithms(&self) -> anyhow::Result<Vec<Algorithm>> {
        if self.solver.eq_ignore_ascii_case("all") {
            return Ok(Algorithm::ALL.to_vec());
        }
        self.solver
            .split(',')
            .map(|name| {
                name.trim()
                    .parse::<Algorithm>()
                    .with_context(|| format!("invalid solver list {:?}", self.solver))
            })
            .collect()
    }

    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            iteration_limit: self.iteration_limit,
            branching_time_slice: Duration::from_millis(self.branching_time_slice_ms),
            max_children_per_conflict: self.max_children_per_conflict,
            interval_duration: self.interval_duration,
            branching_workers: self.branching_workers,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
