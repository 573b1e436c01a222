use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use ecosystem_core::{
    Action, CellCoord, ConfigError, DeathCause, Entity, EntityIdentity, EntityKind, Event,
    Population, Rules,
};
use ecosystem_system_lifecycle::{Chance, ScriptedChance};
use ecosystem_system_scheduler::{
    ChanceSource, Config, EntropySource, PhaseMonitor, Simulation, SimulationError, TickPhase,
    TickScheduler,
};
use ecosystem_world::{query, GridStore};

/// Hands every unit the script registered for its entity kind.
#[derive(Debug)]
struct ScriptedSource {
    plants: ScriptedChance,
    herbivores: ScriptedChance,
    carnivores: ScriptedChance,
}

impl ScriptedSource {
    fn uniform(script: ScriptedChance) -> Self {
        Self {
            plants: script.clone(),
            herbivores: script.clone(),
            carnivores: script,
        }
    }
}

impl ChanceSource for ScriptedSource {
    type Chance = ScriptedChance;

    fn chance_for(&self, identity: EntityIdentity) -> ScriptedChance {
        match identity.kind() {
            EntityKind::Plant => self.plants.clone(),
            EntityKind::Herbivore => self.herbivores.clone(),
            EntityKind::Carnivore => self.carnivores.clone(),
        }
    }
}

fn seed(store: &GridStore, kind: EntityKind, energy: u32, age: u32, row: u32, column: u32) {
    let _ = store.with_grid(|grid| {
        grid.place(Entity::new(kind, energy, age, CellCoord::new(row, column)))
    });
}

fn entity_at(store: &GridStore, row: u32, column: u32) -> Option<Entity> {
    store.with_grid(|grid| grid.entity_at(CellCoord::new(row, column)).copied())
}

#[test]
fn lone_corner_plant_sprouts_once_per_tick() {
    let store = GridStore::new(15);
    seed(&store, EntityKind::Plant, 0, 0, 0, 0);
    let mut scheduler =
        TickScheduler::new(Rules::default(), ScriptedSource::uniform(ScriptedChance::always()));

    let report = scheduler.run_tick(&store).expect("tick resolves");

    assert_eq!(report.participants, 1);
    let [Event::Sprouted { parent, sprout }] = report.events.as_slice() else {
        panic!("expected a single sprout, got {:?}", report.events);
    };
    assert_eq!(parent.cell(), CellCoord::new(0, 0));
    assert!([(0, 1), (1, 0), (1, 1)]
        .iter()
        .any(|&(row, column)| *sprout == CellCoord::new(row, column)));
    assert_eq!(query::population(&store).plants, 2);
    assert_eq!(entity_at(&store, 0, 0).map(|plant| plant.age()), Some(1));
    assert_eq!(entity_at(&store, sprout.row(), sprout.column()).map(|p| p.age()), Some(0));
}

#[test]
fn herbivore_eats_its_neighbouring_plant_whatever_order_units_run_in() {
    let store = GridStore::new(15);
    seed(&store, EntityKind::Herbivore, 100, 0, 5, 5);
    seed(&store, EntityKind::Plant, 0, 0, 5, 6);
    let source = ScriptedSource {
        plants: ScriptedChance::never(),
        herbivores: ScriptedChance::always().then_act(Action::Eat),
        carnivores: ScriptedChance::never(),
    };
    let mut scheduler = TickScheduler::new(Rules::default(), source);

    let report = scheduler.run_tick(&store).expect("tick resolves");

    assert_eq!(report.participants, 2);
    assert!(report.events.contains(&Event::Ate {
        identity: EntityIdentity::new(EntityKind::Herbivore, CellCoord::new(5, 5)),
        prey: EntityIdentity::new(EntityKind::Plant, CellCoord::new(5, 6)),
    }));
    assert!(entity_at(&store, 5, 6).is_none());
    let herbivore = entity_at(&store, 5, 5).expect("herbivore stays in place");
    assert_eq!(herbivore.energy(), 130);
    assert_eq!(herbivore.age(), 1);
    assert_eq!(query::population(&store), Population::new(0, 1, 0));
}

#[test]
fn carnivore_reaching_maximum_age_dies_on_the_following_tick() {
    let store = GridStore::new(15);
    seed(&store, EntityKind::Carnivore, 100, 79, 7, 7);
    let mut scheduler =
        TickScheduler::new(Rules::default(), ScriptedSource::uniform(ScriptedChance::never()));

    let first = scheduler.run_tick(&store).expect("first tick resolves");
    assert!(first.events.is_empty());
    let carnivore = entity_at(&store, 7, 7).expect("carnivore survives the first tick");
    assert_eq!(carnivore.age(), 80);

    let second = scheduler.run_tick(&store).expect("second tick resolves");
    assert_eq!(
        second.events,
        vec![Event::Died {
            identity: EntityIdentity::new(EntityKind::Carnivore, CellCoord::new(7, 7)),
            cause: DeathCause::OldAge,
        }]
    );
    assert_eq!(query::population(&store).total(), 0);
}

#[test]
fn entities_created_mid_tick_wait_for_the_next_tick() {
    let store = GridStore::new(15);
    seed(&store, EntityKind::Herbivore, 100, 0, 7, 7);
    let mut scheduler = TickScheduler::new(
        Rules::default(),
        ScriptedSource::uniform(ScriptedChance::always().then_act(Action::Reproduce)),
    );

    let first = scheduler.run_tick(&store).expect("first tick resolves");
    assert_eq!(first.participants, 1);
    assert_eq!(first.births(), 1);
    let [Event::Reproduced { child, .. }] = first.events.as_slice() else {
        panic!("expected a single birth, got {:?}", first.events);
    };
    let newborn = entity_at(&store, child.row(), child.column()).expect("child placed");
    assert_eq!(newborn.birth_tick(), 1);
    assert_eq!(newborn.age(), 0);
    assert_eq!(store.with_grid(|grid| grid.tick()), 0);

    let second = scheduler.run_tick(&store).expect("second tick resolves");
    assert_eq!(second.participants, 2);
}

#[test]
fn every_entity_acts_at_most_once_per_tick() {
    let mut simulation = Simulation::new(Config {
        seed: Some(0x0b5e_55ed),
        ..Config::default()
    })
    .expect("default config is valid");
    simulation
        .initialize(Population::new(60, 40, 15))
        .expect("population fits");

    for _ in 0..20 {
        let ages_before: u64 = simulation
            .store()
            .with_grid(|grid| grid.occupants().map(|entity| u64::from(entity.age())).sum());
        let report = simulation.run_tick().expect("tick resolves");
        let ages_after: u64 = simulation
            .store()
            .with_grid(|grid| grid.occupants().map(|entity| u64::from(entity.age())).sum());

        // Each surviving participant ages by one; newborns start at zero.
        let survivors = report.participants as u64
            - report
                .events
                .iter()
                .filter(|event| matches!(event, Event::Died { .. } | Event::Skipped { .. }))
                .count() as u64;
        assert!(
            ages_after <= ages_before + survivors,
            "tick {} aged entities more than once",
            report.tick
        );
    }
}

/// Records the phase seen while dispatching and from inside each unit.
#[derive(Debug)]
struct PhaseRecorder {
    monitor: PhaseMonitor,
    seen: Arc<Mutex<Vec<TickPhase>>>,
}

impl ChanceSource for PhaseRecorder {
    type Chance = PhaseWatcher;

    fn chance_for(&self, _identity: EntityIdentity) -> PhaseWatcher {
        self.seen.lock().expect("recorder lock").push(self.monitor.current());
        PhaseWatcher {
            monitor: self.monitor.clone(),
            seen: Arc::clone(&self.seen),
        }
    }
}

/// Waits for dispatch to finish before answering, then records the phase.
struct PhaseWatcher {
    monitor: PhaseMonitor,
    seen: Arc<Mutex<Vec<TickPhase>>>,
}

impl Chance for PhaseWatcher {
    fn roll(&mut self, _probability: f64) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.monitor.current() == TickPhase::Dispatching && Instant::now() < deadline {
            thread::yield_now();
        }
        self.seen.lock().expect("recorder lock").push(self.monitor.current());
        false
    }

    fn pick(&mut self, _len: usize) -> usize {
        0
    }
}

#[test]
fn tick_phase_is_observable_while_units_run() {
    let store = GridStore::new(15);
    seed(&store, EntityKind::Plant, 0, 0, 3, 3);
    let monitor = PhaseMonitor::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = PhaseRecorder {
        monitor: monitor.clone(),
        seen: Arc::clone(&seen),
    };
    let mut scheduler = TickScheduler::with_monitor(Rules::default(), recorder, monitor.clone());
    assert_eq!(monitor.current(), TickPhase::Idle);

    let report = scheduler.run_tick(&store).expect("tick resolves");

    assert!(report.events.is_empty());
    assert_eq!(
        *seen.lock().expect("recorder lock"),
        vec![TickPhase::Dispatching, TickPhase::AwaitingCompletion]
    );
    assert_eq!(monitor.current(), TickPhase::Idle);
    assert_eq!(scheduler.phase(), TickPhase::Idle);
}

#[test]
fn oversized_initialisation_is_rejected_and_leaves_the_grid_unchanged() {
    let config = Config {
        seed: Some(11),
        ..Config::default()
    };
    let mut simulation = Simulation::new(config).expect("default config is valid");
    simulation
        .initialize(Population::new(10, 5, 2))
        .expect("small population fits");
    let before = simulation.snapshot();

    let rejected = simulation.initialize(Population::new(200, 20, 6));

    assert_eq!(
        rejected,
        Err(ConfigError::TooManyEntities {
            requested: 226,
            capacity: 225,
        })
    );
    assert_eq!(simulation.snapshot(), before);
}

#[test]
fn seeded_runs_keep_the_grid_consistent_and_the_books_balanced() {
    let config = Config {
        seed: Some(0x00ec_0575),
        ..Config::default()
    };
    let mut simulation = Simulation::new(config).expect("default config is valid");
    simulation
        .initialize(Population::new(40, 20, 5))
        .expect("population fits");

    for _ in 0..30 {
        let before = simulation.population().total();
        let report = simulation.run_tick().expect("tick resolves consistently");
        let after = simulation.population().total();

        assert_eq!(report.participants as u64, before);
        assert_eq!(
            before + report.births() as u64 - report.removals() as u64,
            after,
            "tick {} does not balance: {:?}",
            report.tick,
            report.events
        );
        assert!(after <= simulation.store().capacity());
        assert_eq!(simulation.scheduler().phase(), TickPhase::Idle);
    }
    assert_eq!(simulation.scheduler().ticks(), 30);
}

#[test]
fn crowded_grid_resolves_every_unit() {
    let store = GridStore::new(6);
    let mut scheduler = TickScheduler::new(Rules::default(), EntropySource::seeded(9));
    let _ = store.with_grid(|grid| {
        for row in 0..6 {
            for column in 0..6 {
                let kind = EntityKind::ALL[((row + column) % 3) as usize];
                let energy = if kind.is_animal() { 100 } else { 0 };
                let _ = grid.place(Entity::new(kind, energy, 0, CellCoord::new(row, column)));
            }
        }
    });

    for _ in 0..10 {
        let report = scheduler.run_tick(&store).expect("tick resolves");
        assert!(report.events.len() <= report.participants);
    }
}

#[test]
fn config_reads_partial_toml() {
    let config: Config = toml::from_str(
        r#"
        grid_side = 10
        seed = 7

        [rules]
        maximum_energy = 150
        carnivore_move_probability = 0.25
        "#,
    )
    .expect("valid toml");

    assert_eq!(config.grid_side, 10);
    assert_eq!(config.seed, Some(7));
    assert_eq!(config.rules.maximum_energy, 150);
    assert_eq!(config.rules.carnivore_move_probability, 0.25);
    assert_eq!(config.rules.initial_energy, Rules::default().initial_energy);
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn invalid_config_is_rejected() {
    let empty = Config {
        grid_side: 0,
        ..Config::default()
    };
    assert_eq!(
        Simulation::new(empty).err(),
        Some(SimulationError::Config(ConfigError::EmptyGrid))
    );

    let mut rules = Rules::default();
    rules.herbivore_eat_probability = 1.5;
    let odd = Config {
        rules,
        ..Config::default()
    };
    assert!(matches!(
        Simulation::new(odd).err(),
        Some(SimulationError::Rules(_))
    ));
}
