#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative grid state for the ecosystem.
//!
//! [`GridStore`] owns the square array of cells behind a single grid-wide
//! lock. Every read-decide-write a rule performs happens inside one
//! [`GridStore::with_grid`] critical section, which hands out a [`Grid`]
//! view for the duration of the closure. There is no per-cell locking: rules
//! scan up to nine cells and write back atomically, so the whole grid is the
//! unit of exclusion.
//!
//! While a tick is open the grid also carries its number. The staleness
//! check consults it so that entities created during the tick, or entities
//! that already acted in it, are never mistaken for the entity a unit of work
//! was launched for.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ecosystem_core::{
    Cell, CellCoord, CellSnapshot, ConsistencyFault, Entity, EntityIdentity, GridSnapshot,
    DEFAULT_GRID_SIDE,
};
use tracing::warn;

/// Owner of the grid and its lock.
#[derive(Debug)]
pub struct GridStore {
    side: u32,
    state: Mutex<GridState>,
}

#[derive(Debug)]
struct GridState {
    cells: Vec<Cell>,
    tick: u64,
}

impl GridStore {
    /// Creates an empty square grid with the provided side length.
    #[must_use]
    pub fn new(side: u32) -> Self {
        let capacity_u64 = u64::from(side) * u64::from(side);
        let capacity = usize::try_from(capacity_u64).unwrap_or(0);
        Self {
            side,
            state: Mutex::new(GridState {
                cells: vec![Cell::Empty; capacity],
                tick: 0,
            }),
        }
    }

    /// Side length of the grid.
    #[must_use]
    pub const fn side(&self) -> u32 {
        self.side
    }

    /// Number of cells on the grid.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        u64::from(self.side) * u64::from(self.side)
    }

    /// Runs `critical_section` while holding the grid-wide lock.
    ///
    /// The lock is released when the closure returns or unwinds. A unit that
    /// panicked while holding the lock poisons it; the next caller recovers
    /// the cells as they were left, because every rule step writes whole
    /// cells and never leaves a half-applied entity behind.
    pub fn with_grid<T>(&self, critical_section: impl FnOnce(&mut Grid<'_>) -> T) -> T {
        let mut state = self.lock();
        let GridState { cells, tick } = &mut *state;
        let mut grid = Grid {
            side: self.side,
            cells: cells.as_mut_slice(),
            tick,
        };
        critical_section(&mut grid)
    }

    fn lock(&self) -> MutexGuard<'_, GridState> {
        self.state.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("grid lock poisoned by a panicking unit of work; recovering cells");
            poisoned.into_inner()
        })
    }
}

impl Default for GridStore {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_SIDE)
    }
}

/// Locked view of the grid handed to critical sections.
#[derive(Debug)]
pub struct Grid<'a> {
    side: u32,
    cells: &'a mut [Cell],
    tick: &'a mut u64,
}

impl Grid<'_> {
    /// Side length of the grid.
    #[must_use]
    pub const fn side(&self) -> u32 {
        self.side
    }

    /// Number of cells on the grid.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Reports whether the coordinate lies on the grid.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.row() < self.side && cell.column() < self.side
    }

    /// Number of the tick being resolved, `0` between ticks.
    #[must_use]
    pub fn tick(&self) -> u64 {
        *self.tick
    }

    /// Marks `tick` as the tick being resolved.
    pub fn open_tick(&mut self, tick: u64) {
        *self.tick = tick;
    }

    /// Marks the grid as between ticks.
    pub fn close_tick(&mut self) {
        *self.tick = 0;
    }

    /// Contents of the cell, or `None` when the coordinate is off the grid.
    #[must_use]
    pub fn cell_at(&self, cell: CellCoord) -> Option<&Cell> {
        self.index(cell).and_then(|index| self.cells.get(index))
    }

    /// Entity stored at the cell, if any.
    #[must_use]
    pub fn entity_at(&self, cell: CellCoord) -> Option<&Entity> {
        self.cell_at(cell).and_then(Cell::entity)
    }

    /// Reports whether the cell lies on the grid and is empty.
    #[must_use]
    pub fn is_vacant(&self, cell: CellCoord) -> bool {
        self.cell_at(cell).is_some_and(Cell::is_empty)
    }

    /// Overwrites a cell.
    ///
    /// # Panics
    ///
    /// Panics when the coordinate is off the grid or when an entity is
    /// written into a cell that disagrees with its recorded position. Both
    /// are consistency faults that no rule may recover from.
    pub fn set_cell(&mut self, cell: CellCoord, value: Cell) {
        if let Cell::Occupied(entity) = &value {
            assert_eq!(
                entity.position(),
                cell,
                "entity written into a cell that disagrees with its position"
            );
        }
        let Some(index) = self.index(cell) else {
            panic!("cell {cell} lies outside the {0}x{0} grid", self.side);
        };
        self.cells[index] = value;
    }

    /// Writes the entity into the cell named by its position, returning the
    /// previous contents.
    pub fn place(&mut self, entity: Entity) -> Cell {
        let cell = entity.position();
        let previous = self.cell_at(cell).copied().unwrap_or_default();
        self.set_cell(cell, Cell::Occupied(entity));
        previous
    }

    /// Empties the cell, returning the entity it held.
    pub fn take(&mut self, cell: CellCoord) -> Option<Entity> {
        let index = self.index(cell)?;
        match std::mem::take(&mut self.cells[index]) {
            Cell::Empty => None,
            Cell::Occupied(entity) => Some(entity),
        }
    }

    /// Surrounding cells of `cell` clipped to the grid, the center excluded.
    pub fn neighbors(&self, cell: CellCoord) -> impl Iterator<Item = (CellCoord, &Cell)> + '_ {
        cell.neighborhood(self.side)
            .filter_map(move |neighbor| self.cell_at(neighbor).map(|value| (neighbor, value)))
    }

    /// Entity of the identity's kind at the identity's cell, whether or not
    /// it may still act in the open tick. Used to target prey.
    #[must_use]
    pub fn occupant(&self, identity: EntityIdentity) -> Option<&Entity> {
        self.entity_at(identity.cell())
            .filter(|entity| entity.kind() == identity.kind())
    }

    /// Staleness check: the entity a unit of work was launched for, provided
    /// the cell still holds an entity of the expected kind that may act in the
    /// open tick.
    ///
    /// An entity created during the tick, or one that already acted in it,
    /// is a different entity from the one captured at enumeration even when
    /// kind and cell agree.
    #[must_use]
    pub fn resolve(&self, identity: EntityIdentity) -> Option<&Entity> {
        let tick = *self.tick;
        self.occupant(identity)
            .filter(|entity| entity.may_act_in(tick))
    }

    /// Mutable counterpart of [`Grid::resolve`].
    pub fn resolve_mut(&mut self, identity: EntityIdentity) -> Option<&mut Entity> {
        let tick = *self.tick;
        let index = self.index(identity.cell())?;
        match self.cells.get_mut(index) {
            Some(Cell::Occupied(entity))
                if entity.kind() == identity.kind() && entity.may_act_in(tick) =>
            {
                Some(entity)
            }
            _ => None,
        }
    }

    /// Iterator over every entity on the grid in row-major order.
    pub fn occupants(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.cells.iter().filter_map(Cell::entity)
    }

    /// Identities of every entity currently on the grid, in row-major order.
    #[must_use]
    pub fn identities(&self) -> Vec<EntityIdentity> {
        self.occupants().map(Entity::identity).collect()
    }

    /// Empty cells in row-major order.
    pub fn vacant_cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_empty())
            .map(|(index, _)| self.coord_of(index))
    }

    /// Number of empty cells.
    #[must_use]
    pub fn vacancies(&self) -> usize {
        self.vacant_cells().count()
    }

    /// Empties every cell.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::Empty);
    }

    /// Verifies that every entity sits in the cell it records and that no
    /// energy exceeds `energy_ceiling`.
    pub fn check_consistency(&self, energy_ceiling: u32) -> Result<(), ConsistencyFault> {
        for (index, cell) in self.cells.iter().enumerate() {
            let Some(entity) = cell.entity() else {
                continue;
            };
            let coord = self.coord_of(index);
            if entity.position() != coord {
                return Err(ConsistencyFault::MisplacedEntity {
                    cell: coord,
                    recorded: entity.position(),
                });
            }
            if entity.energy() > energy_ceiling {
                return Err(ConsistencyFault::EnergyAboveCeiling {
                    cell: coord,
                    energy: entity.energy(),
                    ceiling: energy_ceiling,
                });
            }
        }
        Ok(())
    }

    /// Copies the grid into an immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> GridSnapshot {
        let cells = self.cells.iter().map(CellSnapshot::from).collect();
        GridSnapshot::new(self.side, cells)
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.side).ok()?;
        Some(row * width + column)
    }

    fn coord_of(&self, index: usize) -> CellCoord {
        let width = self.side.max(1) as usize;
        CellCoord::new((index / width) as u32, (index % width) as u32)
    }
}

/// Query functions that provide read-only access to the grid.
///
/// Each call takes the grid lock for the duration of the copy, so results
/// taken between ticks describe a quiescent grid.
pub mod query {
    use super::GridStore;
    use ecosystem_core::{EntityIdentity, GridSnapshot, Population};

    /// Captures a snapshot of every cell.
    #[must_use]
    pub fn snapshot(store: &GridStore) -> GridSnapshot {
        store.with_grid(|grid| grid.snapshot())
    }

    /// Counts the entities on the grid per kind.
    #[must_use]
    pub fn population(store: &GridStore) -> Population {
        store.with_grid(|grid| {
            let mut population = Population::default();
            for entity in grid.occupants() {
                population.record(entity.kind());
            }
            population
        })
    }

    /// Identities of every entity on the grid.
    #[must_use]
    pub fn identities(store: &GridStore) -> Vec<EntityIdentity> {
        store.with_grid(|grid| grid.identities())
    }
}
