//! Facade exposed to the request layer: initialise, tick, snapshot.

use ecosystem_core::{
    ConfigError, GridSnapshot, Population, Rules, RulesError, TickReport, DEFAULT_GRID_SIDE,
};
use ecosystem_system_lifecycle::{populate, RandomChance};
use ecosystem_world::{query, GridStore};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{ChanceSource, EntropySource, TickError, TickScheduler};

/// Configuration parameters required to construct a [`Simulation`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Side length of the square grid.
    pub grid_side: u32,
    /// Base seed for placement and per-unit randomness. Runs stay
    /// nondeterministic because units interleave freely.
    pub seed: Option<u64>,
    /// Rule tunables.
    pub rules: Rules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid_side: DEFAULT_GRID_SIDE,
            seed: None,
            rules: Rules::default(),
        }
    }
}

impl Config {
    /// Checks the grid size and every rule tunable.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.grid_side == 0 {
            return Err(ConfigError::EmptyGrid.into());
        }
        self.rules.validate()?;
        Ok(())
    }
}

/// Rejections raised while building or initialising a simulation.
#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    /// Grid or population configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A rule tunable was out of range.
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// The single simulation a request layer drives.
#[derive(Debug)]
pub struct Simulation<S = EntropySource> {
    store: GridStore,
    scheduler: TickScheduler<S>,
    placement: RandomChance<ChaCha8Rng>,
}

impl Simulation<EntropySource> {
    /// Builds a simulation with the default per-unit randomness.
    pub fn new(config: Config) -> Result<Self, SimulationError> {
        let source = EntropySource::from_seed(config.seed);
        Self::with_source(config, source)
    }
}

impl<S: ChanceSource> Simulation<S> {
    /// Builds a simulation drawing per-unit randomness from `source`.
    pub fn with_source(config: Config, source: S) -> Result<Self, SimulationError> {
        config.validate()?;
        let placement = match config.seed {
            Some(seed) => RandomChance::seeded(seed),
            None => RandomChance::from_entropy(),
        };
        Ok(Self {
            store: GridStore::new(config.grid_side),
            scheduler: TickScheduler::new(config.rules, source),
            placement,
        })
    }

    /// Clears the grid and scatters the requested population. Rejected
    /// requests leave the current grid untouched.
    pub fn initialize(&mut self, population: Population) -> Result<(), ConfigError> {
        populate(
            &self.store,
            population,
            self.scheduler.rules(),
            &mut self.placement,
        )?;
        info!(
            plants = population.plants,
            herbivores = population.herbivores,
            carnivores = population.carnivores,
            "simulation initialised"
        );
        Ok(())
    }

    /// Runs exactly one tick.
    pub fn run_tick(&mut self) -> Result<TickReport, TickError> {
        self.scheduler.run_tick(&self.store)
    }

    /// Snapshot of the quiescent grid.
    #[must_use]
    pub fn snapshot(&self) -> GridSnapshot {
        query::snapshot(&self.store)
    }

    /// Entity counts per kind.
    #[must_use]
    pub fn population(&self) -> Population {
        query::population(&self.store)
    }

    /// Grid store backing the simulation.
    #[must_use]
    pub const fn store(&self) -> &GridStore {
        &self.store
    }

    /// Scheduler driving the simulation.
    #[must_use]
    pub const fn scheduler(&self) -> &TickScheduler<S> {
        &self.scheduler
    }
}
