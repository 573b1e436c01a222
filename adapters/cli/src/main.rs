#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that initialises the ecosystem and runs it tick by
//! tick, printing the grid after each one.

use std::{fs, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ecosystem_core::{GridSnapshot, Population, TickReport};
use ecosystem_system_scheduler::{Config, Simulation};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ecosystem",
    version,
    about = "Run the concurrent predator/prey grid ecosystem"
)]
struct Cli {
    /// Plants scattered at initialisation.
    #[arg(long, default_value_t = 30)]
    plants: u32,
    /// Herbivores scattered at initialisation.
    #[arg(long, default_value_t = 15)]
    herbivores: u32,
    /// Carnivores scattered at initialisation.
    #[arg(long, default_value_t = 5)]
    carnivores: u32,
    /// Number of ticks to run.
    #[arg(long, default_value_t = 10)]
    ticks: u64,
    /// TOML file with grid size, seed and rule overrides.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Base seed; overrides the seed in the configuration file.
    #[arg(long)]
    seed: Option<u64>,
    /// Output format for every printed frame.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Text grid followed by a population summary.
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    fn population(&self) -> Population {
        Population::new(self.plants, self.herbivores, self.carnivores)
    }

    fn simulation_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            }
            None => Config::default(),
        };
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }
}

/// Entry point for the ecosystem command-line interface.
fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = cli.simulation_config()?;
    let mut simulation =
        Simulation::new(config).context("invalid simulation configuration")?;
    simulation
        .initialize(cli.population())
        .context("failed to initialise the grid")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_frame(&mut out, cli.format, 0, &simulation.snapshot(), None)?;

    for _ in 0..cli.ticks {
        let report = simulation.run_tick().context("tick failed")?;
        let snapshot = simulation.snapshot();
        write_frame(&mut out, cli.format, report.tick, &snapshot, Some(&report))?;
    }

    info!(
        ticks = simulation.scheduler().ticks(),
        remaining = simulation.population().total(),
        "run finished"
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn write_frame(
    out: &mut impl Write,
    format: OutputFormat,
    tick: u64,
    snapshot: &GridSnapshot,
    report: Option<&TickReport>,
) -> Result<()> {
    let population = snapshot.population();
    match format {
        OutputFormat::Text => {
            writeln!(out, "tick {tick}")?;
            write!(out, "{snapshot}")?;
            write!(
                out,
                "plants {} herbivores {} carnivores {}",
                population.plants, population.herbivores, population.carnivores
            )?;
            if let Some(report) = report {
                write!(
                    out,
                    " (births {}, removals {}, skipped {})",
                    report.births(),
                    report.removals(),
                    report.skipped()
                )?;
            }
            writeln!(out)?;
            writeln!(out)?;
        }
        OutputFormat::Json => {
            let frame = json!({
                "tick": tick,
                "population": population,
                "births": report.map_or(0, TickReport::births),
                "removals": report.map_or(0, TickReport::removals),
                "grid": snapshot,
            });
            writeln!(out, "{frame}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosystem_core::{Cell, CellCoord, CellSnapshot, Entity, EntityKind};

    #[test]
    fn flags_default_to_a_small_population() {
        let cli = Cli::try_parse_from(["ecosystem"]).expect("defaults parse");
        assert_eq!(cli.population(), Population::new(30, 15, 5));
        assert_eq!(cli.ticks, 10);
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(cli.config.is_none());
    }

    #[test]
    fn flags_override_population_seed_and_format() {
        let cli = Cli::try_parse_from([
            "ecosystem",
            "--plants",
            "12",
            "--herbivores",
            "4",
            "--carnivores",
            "1",
            "--ticks",
            "3",
            "--seed",
            "42",
            "--format",
            "json",
        ])
        .expect("flags parse");

        assert_eq!(cli.population(), Population::new(12, 4, 1));
        assert_eq!(cli.ticks, 3);
        assert_eq!(cli.format, OutputFormat::Json);
        let config = cli.simulation_config().expect("no file to read");
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["ecosystem", "--format", "yaml"]).is_err());
    }

    #[test]
    fn missing_config_file_reports_its_path() {
        let cli = Cli::try_parse_from(["ecosystem", "--config", "/nonexistent/rules.toml"])
            .expect("flags parse");
        let error = cli.simulation_config().expect_err("file does not exist");
        assert!(format!("{error:#}").contains("/nonexistent/rules.toml"));
    }

    #[test]
    fn json_frame_is_a_single_line() {
        let cells = [
            Cell::Occupied(Entity::new(EntityKind::Plant, 0, 3, CellCoord::new(0, 0))),
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
        ];
        let snapshot = GridSnapshot::new(2, cells.iter().map(CellSnapshot::from).collect());
        let mut buffer = Vec::new();

        write_frame(&mut buffer, OutputFormat::Json, 0, &snapshot, None).expect("write");

        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value["grid"][0][0]["type"], "P");
        assert_eq!(value["grid"][0][0]["age"], 3);
        assert_eq!(value["population"]["plants"], 1);
    }
}
