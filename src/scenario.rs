use rand::prelude::*;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use tracing::info;

use crate::common::Agent;
use crate::error::{MapfError, MapfResult};
use crate::map::Map;

/// Random instance: free cells are shuffled and paired up, so starts and goals
/// are all distinct.
pub fn generate_random_agents<R: Rng + ?Sized>(
    map: &Map,
    num_agents: usize,
    rng: &mut R,
) -> MapfResult<Vec<Agent>> {
    let mut cells = map.free_cells();
    if cells.len() < 2 * num_agents {
        return Err(MapfError::InvalidInstance(format!(
            "{num_agents} agents need {} free cells, map has {}",
            2 * num_agents,
            cells.len()
        )));
    }

    cells.shuffle(rng);
    let agents: Vec<Agent> = cells
        .chunks_exact(2)
        .take(num_agents)
        .enumerate()
        .map(|(id, pair)| Agent {
            id,
            start: pair[0],
            goal: pair[1],
        })
        .collect();

    info!("Generate scen: {agents:?}");
    Ok(agents)
}

pub fn load_agents_from_yaml(path: impl AsRef<Path>) -> MapfResult<Vec<Agent>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    serde_yaml::from_reader(reader).map_err(|error| MapfError::Parse(error.to_string()))
}

pub fn write_agents_to_yaml(path: impl AsRef<Path>, agents: &[Agent]) -> MapfResult<()> {
    let file = File::create(path)?;
    let mut writer = io::BufWriter::new(file);
    let yaml_data =
        serde_yaml::to_string(&agents).map_err(|error| MapfError::Parse(error.to_string()))?;
    writer.write_all(yaml_data.as_bytes())?;

    Ok(())
}
