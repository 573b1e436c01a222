#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Entity lifecycle system: placement of new entities and their removal.
//!
//! Placement comes in two flavours. [`place_random`] rejection-samples the
//! whole grid and is only used while populating. [`spawn_adjacent`] chooses
//! among the empty neighbours of a parent and backs both plant growth and
//! animal reproduction. Both operate on an already locked [`Grid`], so the
//! scan, the choice and the write form one atomic step.
//!
//! All randomness flows through the [`Chance`] trait so callers can force
//! outcomes.

use ecosystem_core::{
    Action, CellCoord, ConfigError, Entity, EntityIdentity, EntityKind, Population, Rules,
};
use ecosystem_world::{Grid, GridStore};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

#[cfg(any(test, feature = "chance_scaffolding"))]
mod scaffolding;

#[cfg(any(test, feature = "chance_scaffolding"))]
pub use scaffolding::ScriptedChance;

/// Source of every random decision a rule makes.
pub trait Chance {
    /// Returns `true` with the provided probability.
    fn roll(&mut self, probability: f64) -> bool;

    /// Uniformly chooses an index in `0..len`. `len` must be positive.
    fn pick(&mut self, len: usize) -> usize;

    /// Uniformly chooses one of the three animal actions.
    fn choose_action(&mut self) -> Action {
        Action::ALL[self.pick(Action::ALL.len())]
    }
}

impl<C: Chance + ?Sized> Chance for &mut C {
    fn roll(&mut self, probability: f64) -> bool {
        (**self).roll(probability)
    }

    fn pick(&mut self, len: usize) -> usize {
        (**self).pick(len)
    }

    fn choose_action(&mut self) -> Action {
        (**self).choose_action()
    }
}

/// [`Chance`] backed by a `rand` generator.
#[derive(Clone, Debug)]
pub struct RandomChance<R> {
    rng: R,
}

impl<R: Rng> RandomChance<R> {
    /// Wraps the provided generator.
    #[must_use]
    pub const fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomChance<ChaCha8Rng> {
    /// ChaCha-backed chance seeded from a fixed value.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }

    /// ChaCha-backed chance seeded from the thread-local generator.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::seeded(rand::thread_rng().gen())
    }
}

impl<R: Rng> Chance for RandomChance<R> {
    fn roll(&mut self, probability: f64) -> bool {
        if probability.is_nan() || probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.rng.gen_bool(probability)
    }

    fn pick(&mut self, len: usize) -> usize {
        debug_assert!(len > 0, "pick requires at least one candidate");
        if len <= 1 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}

/// Clears the grid and scatters the requested population over random empty
/// cells.
///
/// Rejects the request without touching the grid when the population does
/// not fit. Animals start with the configured initial energy, everything
/// starts at age zero.
pub fn populate(
    store: &GridStore,
    population: Population,
    rules: &Rules,
    chance: &mut impl Chance,
) -> Result<(), ConfigError> {
    let requested = population.total();
    let capacity = store.capacity();
    if requested > capacity {
        return Err(ConfigError::TooManyEntities {
            requested,
            capacity,
        });
    }

    store.with_grid(|grid| {
        grid.clear();
        for kind in EntityKind::ALL {
            for _ in 0..population.count(kind) {
                let placed = place_random(grid, kind, rules.starting_energy(kind), 0, chance);
                debug_assert!(placed.is_some(), "capacity was checked before placement");
            }
        }
    });

    debug!(
        plants = population.plants,
        herbivores = population.herbivores,
        carnivores = population.carnivores,
        "grid populated"
    );
    Ok(())
}

/// Writes a new entity into a uniformly random empty cell.
///
/// Samples whole-grid coordinates until an empty cell turns up. After one
/// miss per cell of the grid the first empty cell in row-major order is
/// taken instead, so a chance that keeps proposing occupied cells cannot
/// stall placement. Returns `None` only when the grid has no empty cell.
pub fn place_random(
    grid: &mut Grid<'_>,
    kind: EntityKind,
    energy: u32,
    age: u32,
    chance: &mut impl Chance,
) -> Option<CellCoord> {
    if grid.vacancies() == 0 {
        return None;
    }

    let side = usize::try_from(grid.side()).ok()?;
    let sampled = (0..grid.capacity()).find_map(|_| {
        let row = chance.pick(side) as u32;
        let column = chance.pick(side) as u32;
        let cell = CellCoord::new(row, column);
        grid.is_vacant(cell).then_some(cell)
    });
    let cell = match sampled {
        Some(cell) => cell,
        None => {
            let cell = grid.vacant_cells().next()?;
            trace!(%cell, %kind, "random placement fell back to the first empty cell");
            cell
        }
    };

    let entity = newborn(grid, kind, energy, age, cell);
    let _ = grid.place(entity);
    Some(cell)
}

/// Writes a new entity into a uniformly chosen empty neighbour of `origin`.
///
/// Returns the chosen cell, or `None` when every neighbour is occupied.
pub fn spawn_adjacent(
    grid: &mut Grid<'_>,
    origin: CellCoord,
    kind: EntityKind,
    energy: u32,
    age: u32,
    chance: &mut impl Chance,
) -> Option<CellCoord> {
    let vacant: Vec<CellCoord> = grid
        .neighbors(origin)
        .filter(|(_, cell)| cell.is_empty())
        .map(|(coord, _)| coord)
        .collect();
    if vacant.is_empty() {
        trace!(%origin, %kind, "no empty neighbour to spawn into");
        return None;
    }

    let cell = vacant[chance.pick(vacant.len())];
    let entity = newborn(grid, kind, energy, age, cell);
    let _ = grid.place(entity);
    trace!(%origin, %cell, %kind, "spawned adjacent entity");
    Some(cell)
}

/// Removes the entity of the identity's kind at the identity's cell.
///
/// Whether the entity already acted this tick does not matter: prey is prey.
/// An empty cell or a different kind leaves the grid untouched and returns
/// `None`, so the same entity can never be removed twice.
pub fn remove(grid: &mut Grid<'_>, identity: EntityIdentity) -> Option<Entity> {
    let _ = grid.occupant(identity)?;
    grid.take(identity.cell())
}

/// Entity created now, stamped with the open tick so it sits that tick out.
fn newborn(grid: &Grid<'_>, kind: EntityKind, energy: u32, age: u32, cell: CellCoord) -> Entity {
    Entity::new(kind, energy, age, cell).born_during(grid.tick())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant_at(row: u32, column: u32) -> Entity {
        Entity::new(EntityKind::Plant, 0, 0, CellCoord::new(row, column))
    }

    #[test]
    fn spawn_adjacent_only_targets_empty_neighbours() {
        let store = GridStore::new(3);
        let spawned = store.with_grid(|grid| {
            for (row, column) in [(0, 0), (0, 1), (0, 2), (1, 0), (1, 2), (2, 0), (2, 1)] {
                let _ = grid.place(plant_at(row, column));
            }
            spawn_adjacent(
                grid,
                CellCoord::new(1, 1),
                EntityKind::Plant,
                0,
                0,
                &mut ScriptedChance::always(),
            )
        });
        assert_eq!(spawned, Some(CellCoord::new(2, 2)));
    }

    #[test]
    fn spawn_adjacent_fails_when_surrounded() {
        let store = GridStore::new(15);
        let spawned = store.with_grid(|grid| {
            for (row, column) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                let _ = grid.place(plant_at(row, column));
            }
            spawn_adjacent(
                grid,
                CellCoord::new(0, 0),
                EntityKind::Plant,
                0,
                0,
                &mut ScriptedChance::always(),
            )
        });
        assert_eq!(spawned, None);
    }

    #[test]
    fn remove_ignores_stale_identity() {
        let store = GridStore::new(3);
        let _ = store.with_grid(|grid| grid.place(plant_at(1, 1)));
        let stale = EntityIdentity::new(EntityKind::Herbivore, CellCoord::new(1, 1));
        let fresh = EntityIdentity::new(EntityKind::Plant, CellCoord::new(1, 1));

        store.with_grid(|grid| {
            assert_eq!(remove(grid, stale), None);
            assert!(remove(grid, fresh).is_some());
            assert_eq!(remove(grid, fresh), None);
        });
    }

    #[test]
    fn place_random_fills_the_last_vacancy() {
        let store = GridStore::new(2);
        let mut chance = RandomChance::seeded(7);
        let placed = store.with_grid(|grid| {
            for (row, column) in [(0, 0), (0, 1), (1, 0)] {
                let _ = grid.place(plant_at(row, column));
            }
            let last = place_random(grid, EntityKind::Carnivore, 100, 0, &mut chance);
            let overflow = place_random(grid, EntityKind::Carnivore, 100, 0, &mut chance);
            (last, overflow)
        });
        assert_eq!(placed, (Some(CellCoord::new(1, 1)), None));
    }

    #[test]
    fn place_random_falls_back_when_sampling_keeps_missing() {
        let store = GridStore::new(2);
        let placed = store.with_grid(|grid| {
            let _ = grid.place(plant_at(0, 0));
            place_random(grid, EntityKind::Herbivore, 100, 0, &mut ScriptedChance::always())
        });
        assert_eq!(placed, Some(CellCoord::new(0, 1)));
    }

    #[test]
    fn entities_spawned_during_a_tick_carry_its_stamp() {
        let store = GridStore::new(3);
        let sprout = store.with_grid(|grid| {
            let _ = grid.place(plant_at(1, 1));
            grid.open_tick(4);
            let cell = spawn_adjacent(
                grid,
                CellCoord::new(1, 1),
                EntityKind::Plant,
                0,
                0,
                &mut ScriptedChance::always(),
            )?;
            grid.entity_at(cell).copied()
        });
        let sprout = sprout.expect("sprout placed");
        assert_eq!(sprout.birth_tick(), 4);
        assert!(!sprout.may_act_in(4));
    }

    #[test]
    fn remove_takes_prey_that_already_acted() {
        let store = GridStore::new(3);
        let mut plant = plant_at(2, 2);
        plant.mark_acted(5);
        let removed = store.with_grid(|grid| {
            let _ = grid.place(plant);
            grid.open_tick(5);
            remove(grid, plant.identity())
        });
        assert_eq!(removed, Some(plant));
    }

    #[test]
    fn random_chance_honours_certain_probabilities() {
        let mut chance = RandomChance::seeded(11);
        for _ in 0..100 {
            assert!(chance.roll(1.0));
            assert!(!chance.roll(0.0));
            assert!(chance.pick(8) < 8);
        }
    }
}
