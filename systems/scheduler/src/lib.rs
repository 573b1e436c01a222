#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Tick scheduler for the ecosystem.
//!
//! A tick enumerates every occupied cell under the grid lock, captures each
//! entity's identity, releases the lock and launches one scoped thread per
//! identity. Units contend only on the grid lock and resolve in no particular
//! order; the scheduler blocks on a [`Rendezvous`] sized to the captured
//! count and returns once every unit, including those that turned into stale
//! no-ops, has finished. Entities created mid-tick were not captured and do
//! not act until the next tick; the grid carries the open tick's number so
//! that stale units cannot mistake them for the entity they were launched for.
//!
//! The current [`TickPhase`] is published through a [`PhaseMonitor`] that
//! other threads can read while a tick runs.

mod rendezvous;
mod simulation;
mod source;

use std::{
    io,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    thread,
};

use ecosystem_core::{ConsistencyFault, Rules, TickReport};
use ecosystem_system_actions::resolve_unit;
use ecosystem_world::GridStore;
use thiserror::Error;
use tracing::{debug, error, warn};

pub use rendezvous::{Arrival, Rendezvous};
pub use simulation::{Config, Simulation, SimulationError};
pub use source::{ChanceSource, EntropySource};

/// Lifecycle of a single tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TickPhase {
    /// No tick is running.
    #[default]
    Idle,
    /// Units are being launched.
    Dispatching,
    /// Every unit is launched; waiting on the rendezvous.
    AwaitingCompletion,
}

impl TickPhase {
    const fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::Dispatching,
            2 => Self::AwaitingCompletion,
            _ => Self::Idle,
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Dispatching => 1,
            Self::AwaitingCompletion => 2,
        }
    }
}

/// Shared view of a scheduler's current [`TickPhase`].
///
/// Clones observe the same scheduler and may be read from any thread,
/// including from inside a running unit of work.
#[derive(Clone, Debug, Default)]
pub struct PhaseMonitor {
    tag: Arc<AtomicU8>,
}

impl PhaseMonitor {
    /// Creates a monitor reporting [`TickPhase::Idle`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase the observed scheduler is currently in.
    #[must_use]
    pub fn current(&self) -> TickPhase {
        TickPhase::from_tag(self.tag.load(Ordering::Acquire))
    }

    fn enter(&self, phase: TickPhase) {
        self.tag.store(phase.tag(), Ordering::Release);
    }
}

/// Failures surfaced after a tick has fully resolved.
#[derive(Debug, Error)]
pub enum TickError {
    /// The grid violates its invariants. Indicates broken lock discipline.
    #[error("grid invariants violated after tick: {0}")]
    Inconsistent(#[from] ConsistencyFault),
    /// A unit's thread could not be spawned, so that entity did not act.
    #[error("failed to launch a unit of work")]
    Spawn(#[source] io::Error),
    /// One or more units panicked while resolving.
    #[error("{panicked} unit(s) of work panicked")]
    UnitPanicked {
        /// Number of units that panicked.
        panicked: usize,
    },
}

/// Dispatches one concurrent unit of work per entity and waits for all of
/// them.
#[derive(Debug)]
pub struct TickScheduler<S = EntropySource> {
    rules: Rules,
    source: S,
    phase: PhaseMonitor,
    ticks: u64,
}

impl<S: ChanceSource> TickScheduler<S> {
    /// Creates a scheduler applying `rules` with randomness from `source`.
    #[must_use]
    pub fn new(rules: Rules, source: S) -> Self {
        Self::with_monitor(rules, source, PhaseMonitor::new())
    }

    /// Creates a scheduler publishing its phase through `monitor`.
    #[must_use]
    pub fn with_monitor(rules: Rules, source: S, monitor: PhaseMonitor) -> Self {
        monitor.enter(TickPhase::Idle);
        Self {
            rules,
            source,
            phase: monitor,
            ticks: 0,
        }
    }

    /// Rules applied to every unit.
    #[must_use]
    pub const fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Current phase; always [`TickPhase::Idle`] between ticks.
    #[must_use]
    pub fn phase(&self) -> TickPhase {
        self.phase.current()
    }

    /// Monitor other threads can use to follow the phase during a tick.
    #[must_use]
    pub const fn monitor(&self) -> &PhaseMonitor {
        &self.phase
    }

    /// Number of ticks run so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs exactly one tick against `store` and returns once it is fully
    /// resolved.
    ///
    /// The grid is quiescent when this returns, whether or not an error is
    /// reported.
    pub fn run_tick(&mut self, store: &GridStore) -> Result<TickReport, TickError> {
        let tick = self.ticks.saturating_add(1);
        let identities = store.with_grid(|grid| {
            grid.open_tick(tick);
            grid.identities()
        });
        let participants = identities.len();

        self.phase.enter(TickPhase::Dispatching);
        debug!(tick, participants, "dispatching tick");

        let rules = &self.rules;
        let source = &self.source;
        let phase = &self.phase;
        let rendezvous = Rendezvous::new(participants);

        let (results, spawn_failure) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(participants);
            let mut spawn_failure = None;

            for identity in identities {
                let arrival = rendezvous.arrival();
                let mut chance = source.chance_for(identity);
                let cell = identity.cell();
                let spawned = thread::Builder::new()
                    .name(format!("unit-{}-{}", cell.row(), cell.column()))
                    .spawn_scoped(scope, move || {
                        let _arrival = arrival;
                        resolve_unit(store, identity, rules, &mut chance)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(error) => {
                        warn!(%identity, %error, "failed to launch unit of work");
                        spawn_failure = spawn_failure.or(Some(error));
                    }
                }
            }

            phase.enter(TickPhase::AwaitingCompletion);
            debug!(tick, "awaiting unit completion");
            rendezvous.wait();

            let results: Vec<_> = handles.into_iter().map(|handle| handle.join()).collect();
            (results, spawn_failure)
        });

        self.ticks = tick;
        self.phase.enter(TickPhase::Idle);

        let mut events = Vec::with_capacity(results.len());
        let mut panicked = 0;
        for result in results {
            match result {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(_) => panicked += 1,
            }
        }

        let ceiling = self.rules.maximum_energy;
        let consistency = store.with_grid(|grid| {
            grid.close_tick();
            grid.check_consistency(ceiling)
        });
        if let Err(fault) = consistency {
            error!(tick, %fault, "grid left inconsistent");
            return Err(TickError::Inconsistent(fault));
        }
        if let Some(error) = spawn_failure {
            return Err(TickError::Spawn(error));
        }
        if panicked > 0 {
            error!(tick, panicked, "units of work panicked");
            return Err(TickError::UnitPanicked { panicked });
        }

        let report = TickReport {
            tick,
            participants,
            events,
        };
        debug!(
            tick,
            births = report.births(),
            removals = report.removals(),
            skipped = report.skipped(),
            "tick resolved"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosystem_core::{CellCoord, Entity, EntityKind};

    #[test]
    fn empty_grid_resolves_an_empty_tick() {
        let store = GridStore::new(5);
        let mut scheduler = TickScheduler::new(Rules::default(), EntropySource::seeded(1));

        let report = scheduler.run_tick(&store).expect("tick resolves");

        assert_eq!(report.tick, 1);
        assert_eq!(report.participants, 0);
        assert!(report.events.is_empty());
        assert_eq!(scheduler.phase(), TickPhase::Idle);
    }

    #[test]
    fn tick_counter_advances_per_tick() {
        let store = GridStore::new(5);
        let _ = store.with_grid(|grid| {
            grid.place(Entity::new(EntityKind::Plant, 0, 0, CellCoord::new(2, 2)))
        });
        let mut scheduler = TickScheduler::new(Rules::default(), EntropySource::seeded(2));

        for expected in 1..=3 {
            let report = scheduler.run_tick(&store).expect("tick resolves");
            assert_eq!(report.tick, expected);
        }
        assert_eq!(scheduler.ticks(), 3);
    }
}
