use mapf_acbs::common::Solution;
use mapf_acbs::config::{Cli, Config};
use mapf_acbs::map::Map;
use mapf_acbs::scenario::{generate_random_agents, load_agents_from_yaml};
use mapf_acbs::solver::{ConflictBasedSearch, Solver};
use mapf_acbs::stat::{ReportRow, ReportWriter, Summary};

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config = if let Some(config_file) = cli.config.as_ref() {
        let config_str = std::fs::read_to_string(config_file)
            .with_context(|| format!("cannot read config file: {config_file}"))?;
        Config::from_yaml_str(&config_str)
            .with_context(|| format!("error with config file: {config_file}"))?
    } else {
        info!("No config file specified, using default config");
        Config::default()
    }
    .override_from_command_line(&cli)?;

    let map = Map::from_file(&config.map_path)
        .with_context(|| format!("error loading map: {}", config.map_path))?;
    let map_name = Path::new(&config.map_path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| config.map_path.clone());
    let algorithms = config.algorithms()?;
    let mut report = ReportWriter::open(&config.output_path)
        .with_context(|| format!("cannot open report: {}", config.output_path))?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut last_solution: Option<Solution> = None;
    let mut summary = Summary::default();

    for instance in 0..config.instances {
        let agents = match &config.agents_path {
            Some(path) => load_agents_from_yaml(path)
                .with_context(|| format!("error loading agents: {path}"))?,
            None => generate_random_agents(&map, config.num_agents, &mut rng)?,
        };

        for &algorithm in &algorithms {
            let mut solver = ConflictBasedSearch::new(
                &map,
                agents.clone(),
                algorithm,
                config.solver_settings(),
            );
            let result = solver.solve(config.timeout(), config.sub_optimal);

            if let Some(solution) = &result.solution {
                if result.success && !solution.verify(&map, &agents) {
                    warn!("{algorithm} returned a solution that fails verification");
                }
                if result.success {
                    last_solution = Some(solution.clone());
                }
            }

            let row = ReportRow {
                algorithm: result.label().to_string(),
                map: map_name.clone(),
                agents: agents.len(),
                instance,
                success: result.success,
                optimal: result.optimal,
                cost: result.cost,
                runtime_ms: result.runtime.as_millis(),
                status: result.status_label(),
            };
            report.write(&row)?;
            summary.record(&row);
        }
    }
    summary.print();

    if let (Some(path), Some(solution)) = (&config.solution_path, &last_solution) {
        let json = serde_json::to_string_pretty(solution)?;
        std::fs::write(path, json).with_context(|| format!("cannot write solution: {path}"))?;
        info!("Solution written to {path}");
    }

    Ok(())
}
