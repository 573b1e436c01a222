#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the ecosystem engine.
//!
//! This crate defines the vocabulary that connects the grid store, the
//! lifecycle and action systems, the tick scheduler, and whatever request
//! layer drives them. The world crate owns the only mutable [`Cell`] array;
//! systems read and write it exclusively through the world's locked view and
//! report what happened as [`Event`] values collected into a [`TickReport`].
//! Everything here is plain data: no locking, no randomness.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Side length of the square grid when no configuration overrides it.
pub const DEFAULT_GRID_SIDE: u32 = 15;

/// Oldest age a plant may reach before the death check removes it.
pub const PLANT_MAXIMUM_AGE: u32 = 10;
/// Oldest age a herbivore may reach before the death check removes it.
pub const HERBIVORE_MAXIMUM_AGE: u32 = 50;
/// Oldest age a carnivore may reach before the death check removes it.
pub const CARNIVORE_MAXIMUM_AGE: u32 = 80;
/// Ceiling applied to every energy gain.
pub const MAXIMUM_ENERGY: u32 = 200;
/// Energy assigned to animals created by population or reproduction.
pub const INITIAL_ENERGY: u32 = 100;
/// Minimum energy an animal needs before it may reproduce.
pub const THRESHOLD_ENERGY_FOR_REPRODUCTION: u32 = 20;
/// Energy deducted from a parent after a successful reproduction.
pub const REPRODUCTION_COST: u32 = 10;
/// Energy spent by a single move.
pub const MOVE_COST: u32 = 5;
/// Energy a herbivore gains from consuming a plant.
pub const HERBIVORE_EAT_GAIN: u32 = 30;
/// Energy a carnivore gains from consuming a herbivore.
pub const CARNIVORE_EAT_GAIN: u32 = 20;

/// Probability that a living plant attempts to sprout into a neighbouring cell.
pub const PLANT_REPRODUCTION_PROBABILITY: f64 = 0.2;
/// Probability that a herbivore's reproduce action fires.
pub const HERBIVORE_REPRODUCTION_PROBABILITY: f64 = 0.075;
/// Probability that a carnivore's reproduce action fires.
pub const CARNIVORE_REPRODUCTION_PROBABILITY: f64 = 0.025;
/// Probability that a herbivore's move action fires.
pub const HERBIVORE_MOVE_PROBABILITY: f64 = 0.7;
/// Probability that a herbivore's eat action fires.
pub const HERBIVORE_EAT_PROBABILITY: f64 = 0.9;
/// Probability that a carnivore's move action fires.
pub const CARNIVORE_MOVE_PROBABILITY: f64 = 0.5;
/// Probability that a carnivore's eat action fires.
pub const CARNIVORE_EAT_PROBABILITY: f64 = 1.0;

/// Kinds of entity that may occupy a grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Stationary producer that only ages and sprouts.
    Plant,
    /// Animal that grazes on plants.
    Herbivore,
    /// Animal that hunts herbivores.
    Carnivore,
}

impl EntityKind {
    /// Every kind in population order.
    pub const ALL: [EntityKind; 3] = [Self::Plant, Self::Herbivore, Self::Carnivore];

    /// Reports whether the kind moves, eats and tracks energy.
    #[must_use]
    pub const fn is_animal(self) -> bool {
        !matches!(self, Self::Plant)
    }

    /// Kind this entity consumes when eating, if any.
    #[must_use]
    pub const fn prey(self) -> Option<EntityKind> {
        match self {
            Self::Plant => None,
            Self::Herbivore => Some(Self::Plant),
            Self::Carnivore => Some(Self::Herbivore),
        }
    }

    /// Reports whether a mover of this kind may step onto a cell whose
    /// current occupant has the provided kind (`None` for an empty cell).
    ///
    /// Herbivores enter empty cells and plants; carnivores additionally enter
    /// herbivores. Nothing ever moves onto its own kind, and plants never move.
    #[must_use]
    pub const fn can_enter(self, occupant: Option<EntityKind>) -> bool {
        match (self, occupant) {
            (Self::Plant, _) => false,
            (_, None) => true,
            (Self::Herbivore, Some(Self::Plant)) => true,
            (Self::Carnivore, Some(Self::Plant | Self::Herbivore)) => true,
            _ => false,
        }
    }

    /// Single-character symbol used by the snapshot wire format.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Plant => "P",
            Self::Herbivore => "H",
            Self::Carnivore => "C",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plant => "plant",
            Self::Herbivore => "herbivore",
            Self::Carnivore => "carnivore",
        };
        f.write_str(name)
    }
}

const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Location of a single grid cell expressed as row and column coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    row: u32,
    column: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Iterates the up to eight cells surrounding this one, clipped to a
    /// square grid of the provided side length. The cell itself is never
    /// yielded.
    pub fn neighborhood(self, side: u32) -> impl Iterator<Item = CellCoord> {
        NEIGHBOR_OFFSETS
            .into_iter()
            .filter_map(move |(row_offset, column_offset)| {
                let row = self.row.checked_add_signed(row_offset)?;
                let column = self.column.checked_add_signed(column_offset)?;
                (row < side && column < side).then_some(CellCoord::new(row, column))
            })
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// A living occupant of the grid.
///
/// `position` duplicates the coordinates of the cell that stores the entity;
/// the world refuses writes where the two disagree.
///
/// Two tick stamps decide whether the entity may still act in the tick being
/// resolved: the tick it was created in and the last tick it acted in. Tick
/// `0` stands for "outside any tick" and never blocks anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Entity {
    kind: EntityKind,
    energy: u32,
    age: u32,
    position: CellCoord,
    born: u64,
    acted: u64,
}

impl Entity {
    /// Creates an entity with explicit energy and age.
    ///
    /// Plants never carry energy, so any energy supplied for a plant is
    /// discarded.
    #[must_use]
    pub const fn new(kind: EntityKind, energy: u32, age: u32, position: CellCoord) -> Self {
        let energy = if kind.is_animal() { energy } else { 0 };
        Self {
            kind,
            energy,
            age,
            position,
            born: 0,
            acted: 0,
        }
    }

    /// Kind of the entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Remaining energy; always zero for plants.
    #[must_use]
    pub const fn energy(&self) -> u32 {
        self.energy
    }

    /// Number of ticks the entity has acted through.
    #[must_use]
    pub const fn age(&self) -> u32 {
        self.age
    }

    /// Cell the entity believes it occupies.
    #[must_use]
    pub const fn position(&self) -> CellCoord {
        self.position
    }

    /// Identity of the entity as seen by a unit of work launched now.
    #[must_use]
    pub const fn identity(&self) -> EntityIdentity {
        EntityIdentity::new(self.kind, self.position)
    }

    /// Returns a copy of the entity relocated to the provided cell.
    #[must_use]
    pub const fn relocated(self, position: CellCoord) -> Self {
        Self { position, ..self }
    }

    /// Returns a copy of the entity stamped as created during `tick`.
    #[must_use]
    pub const fn born_during(self, tick: u64) -> Self {
        Self { born: tick, ..self }
    }

    /// Tick the entity was created in, `0` when created outside a tick.
    #[must_use]
    pub const fn birth_tick(&self) -> u64 {
        self.born
    }

    /// Last tick the entity acted in, `0` when it never did.
    #[must_use]
    pub const fn last_acted(&self) -> u64 {
        self.acted
    }

    /// Reports whether the entity may still act in `tick`.
    ///
    /// Entities created during a tick, and entities that already acted in
    /// it, sit the rest of that tick out.
    #[must_use]
    pub const fn may_act_in(&self, tick: u64) -> bool {
        tick == 0 || (self.born != tick && self.acted != tick)
    }

    /// Records that the entity finished acting in `tick`.
    pub fn mark_acted(&mut self, tick: u64) {
        self.acted = tick;
    }

    /// Adds energy, saturating at `ceiling`. Plants ignore feeding.
    pub fn feed(&mut self, amount: u32, ceiling: u32) {
        if self.kind.is_animal() {
            self.energy = self.energy.saturating_add(amount).min(ceiling);
        }
    }

    /// Removes energy, bottoming out at zero.
    pub fn drain(&mut self, amount: u32) {
        self.energy = self.energy.saturating_sub(amount);
    }

    /// Advances the entity's age by one tick.
    pub fn grow_older(&mut self) {
        self.age = self.age.saturating_add(1);
    }
}

/// Contents of a single grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Cell {
    /// Nothing lives here.
    #[default]
    Empty,
    /// The cell holds exactly one entity.
    Occupied(Entity),
}

impl Cell {
    /// Entity stored in the cell, if any.
    #[must_use]
    pub const fn entity(&self) -> Option<&Entity> {
        match self {
            Self::Empty => None,
            Self::Occupied(entity) => Some(entity),
        }
    }

    /// Kind of the occupant, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<EntityKind> {
        match self {
            Self::Empty => None,
            Self::Occupied(entity) => Some(entity.kind),
        }
    }

    /// Reports whether the cell is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Reports whether the cell holds an entity of the provided kind.
    #[must_use]
    pub fn holds(&self, kind: EntityKind) -> bool {
        self.kind() == Some(kind)
    }
}

/// Identity of an entity for the duration of one tick: the kind and cell
/// captured when its unit of work was launched.
///
/// Every rule step re-validates the identity against the grid before acting;
/// a mismatch means another unit consumed or replaced the entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityIdentity {
    kind: EntityKind,
    cell: CellCoord,
}

impl EntityIdentity {
    /// Creates an identity from a kind and cell.
    #[must_use]
    pub const fn new(kind: EntityKind, cell: CellCoord) -> Self {
        Self { kind, cell }
    }

    /// Kind the entity had at capture time.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Cell the entity occupied at capture time.
    #[must_use]
    pub const fn cell(&self) -> CellCoord {
        self.cell
    }

    /// Identity of the same entity after it moved to `cell`.
    #[must_use]
    pub const fn relocated(self, cell: CellCoord) -> Self {
        Self { cell, ..self }
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.cell)
    }
}

/// Actions an animal may choose between on each tick. Exactly one runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Step onto a neighbouring cell, possibly consuming prey there.
    Move,
    /// Consume adjacent prey without moving.
    Eat,
    /// Spawn a child into an empty neighbouring cell.
    Reproduce,
}

impl Action {
    /// Every action, indexed by uniform three-way selection.
    pub const ALL: [Action; 3] = [Self::Move, Self::Eat, Self::Reproduce];
}

/// Reason an entity was removed by the death check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeathCause {
    /// Age reached the maximum for the kind.
    OldAge,
    /// An animal ran out of energy.
    Starvation,
}

/// Result of the death check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vitality {
    /// The entity survives and may act.
    Alive,
    /// The entity was removed from the grid.
    Died(DeathCause),
    /// The identity no longer matches the grid.
    Stale,
}

/// Result of a plant's growth step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrowOutcome {
    /// A new plant sprouted at `sprout`.
    Grew {
        /// Cell that received the new plant.
        sprout: CellCoord,
    },
    /// The probability roll failed or no empty neighbour existed.
    Idle,
    /// The identity no longer matches the grid.
    Stale,
}

/// Result of an animal's move action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The animal relocated.
    Moved {
        /// Destination cell.
        to: CellCoord,
        /// Kind of the prey destroyed by moving onto it, if any.
        consumed: Option<EntityKind>,
    },
    /// The roll failed, energy was too low, or no destination was valid.
    Stayed,
    /// The identity no longer matches the grid.
    Stale,
}

/// Result of an animal's eat action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EatOutcome {
    /// The animal consumed the prey identified here.
    Ate {
        /// Identity of the consumed neighbour.
        prey: EntityIdentity,
    },
    /// The roll failed or no prey was adjacent.
    Idle,
    /// The identity no longer matches the grid.
    Stale,
}

/// Result of an animal's reproduce action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReproduceOutcome {
    /// A child was placed at `child`.
    Reproduced {
        /// Cell that received the child.
        child: CellCoord,
    },
    /// The roll failed, energy was too low, or no empty neighbour existed.
    Idle,
    /// The identity no longer matches the grid.
    Stale,
}

/// Observable consequences of resolving one unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// The death check removed an entity.
    Died {
        /// Identity of the removed entity.
        identity: EntityIdentity,
        /// Why the entity died.
        cause: DeathCause,
    },
    /// A plant sprouted a new plant next to itself.
    Sprouted {
        /// Parent plant.
        parent: EntityIdentity,
        /// Cell that received the new plant.
        sprout: CellCoord,
    },
    /// An animal moved, possibly consuming what stood on the destination.
    Moved {
        /// Animal before the move.
        identity: EntityIdentity,
        /// Destination cell.
        to: CellCoord,
        /// Kind destroyed by the move, if any.
        consumed: Option<EntityKind>,
    },
    /// An animal ate an adjacent entity in place.
    Ate {
        /// Eating animal.
        identity: EntityIdentity,
        /// Entity that was consumed.
        prey: EntityIdentity,
    },
    /// An animal produced a child.
    Reproduced {
        /// Parent animal.
        identity: EntityIdentity,
        /// Cell that received the child.
        child: CellCoord,
    },
    /// A unit found its identity stale and resolved as a no-op.
    Skipped {
        /// Identity captured at enumeration time.
        identity: EntityIdentity,
    },
}

impl Event {
    /// Number of entities this event added to the grid.
    #[must_use]
    pub const fn births(&self) -> usize {
        match self {
            Self::Sprouted { .. } | Self::Reproduced { .. } => 1,
            _ => 0,
        }
    }

    /// Number of entities this event removed from the grid.
    #[must_use]
    pub const fn removals(&self) -> usize {
        match self {
            Self::Died { .. } | Self::Ate { .. } => 1,
            Self::Moved {
                consumed: Some(_), ..
            } => 1,
            _ => 0,
        }
    }
}

/// Everything that happened during one fully resolved tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// One-based index of the tick.
    pub tick: u64,
    /// Number of identities captured at enumeration and dispatched.
    pub participants: usize,
    /// Events produced by the units, in enumeration order.
    pub events: Vec<Event>,
}

impl TickReport {
    /// Total number of entities created during the tick.
    #[must_use]
    pub fn births(&self) -> usize {
        self.events.iter().map(Event::births).sum()
    }

    /// Total number of entities removed during the tick.
    #[must_use]
    pub fn removals(&self) -> usize {
        self.events.iter().map(Event::removals).sum()
    }

    /// Number of units that resolved as stale no-ops.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Skipped { .. }))
            .count()
    }
}

/// Entity counts per kind, used both to request an initial population and
/// to summarise a grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
    /// Number of plants.
    pub plants: u32,
    /// Number of herbivores.
    pub herbivores: u32,
    /// Number of carnivores.
    pub carnivores: u32,
}

impl Population {
    /// Creates a population from per-kind counts.
    #[must_use]
    pub const fn new(plants: u32, herbivores: u32, carnivores: u32) -> Self {
        Self {
            plants,
            herbivores,
            carnivores,
        }
    }

    /// Count requested for the provided kind.
    #[must_use]
    pub const fn count(&self, kind: EntityKind) -> u32 {
        match kind {
            EntityKind::Plant => self.plants,
            EntityKind::Herbivore => self.herbivores,
            EntityKind::Carnivore => self.carnivores,
        }
    }

    /// Sum over all kinds, widened so it cannot overflow.
    #[must_use]
    pub fn total(&self) -> u64 {
        u64::from(self.plants) + u64::from(self.herbivores) + u64::from(self.carnivores)
    }

    /// Increments the counter for the provided kind.
    pub fn record(&mut self, kind: EntityKind) {
        let slot = match kind {
            EntityKind::Plant => &mut self.plants,
            EntityKind::Herbivore => &mut self.herbivores,
            EntityKind::Carnivore => &mut self.carnivores,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Tunable constants governing every rule.
///
/// Defaults reproduce the reference ecosystem. Deserialisation fills any
/// missing field from the defaults, so a configuration file only needs to
/// name the values it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// Age at which plants die.
    pub plant_maximum_age: u32,
    /// Age at which herbivores die.
    pub herbivore_maximum_age: u32,
    /// Age at which carnivores die.
    pub carnivore_maximum_age: u32,
    /// Ceiling for every energy gain.
    pub maximum_energy: u32,
    /// Energy of newly created animals.
    pub initial_energy: u32,
    /// Minimum energy for reproduction.
    pub reproduction_energy_threshold: u32,
    /// Energy a parent pays per child.
    pub reproduction_cost: u32,
    /// Energy a single move costs; also the minimum energy required to move.
    pub move_cost: u32,
    /// Energy a herbivore gains per plant.
    pub herbivore_eat_gain: u32,
    /// Energy a carnivore gains per herbivore.
    pub carnivore_eat_gain: u32,
    /// Chance that a plant sprouts.
    pub plant_reproduction_probability: f64,
    /// Chance that a herbivore's reproduce action fires.
    pub herbivore_reproduction_probability: f64,
    /// Chance that a carnivore's reproduce action fires.
    pub carnivore_reproduction_probability: f64,
    /// Chance that a herbivore's move action fires.
    pub herbivore_move_probability: f64,
    /// Chance that a carnivore's move action fires.
    pub carnivore_move_probability: f64,
    /// Chance that a herbivore's eat action fires.
    pub herbivore_eat_probability: f64,
    /// Chance that a carnivore's eat action fires.
    pub carnivore_eat_probability: f64,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            plant_maximum_age: PLANT_MAXIMUM_AGE,
            herbivore_maximum_age: HERBIVORE_MAXIMUM_AGE,
            carnivore_maximum_age: CARNIVORE_MAXIMUM_AGE,
            maximum_energy: MAXIMUM_ENERGY,
            initial_energy: INITIAL_ENERGY,
            reproduction_energy_threshold: THRESHOLD_ENERGY_FOR_REPRODUCTION,
            reproduction_cost: REPRODUCTION_COST,
            move_cost: MOVE_COST,
            herbivore_eat_gain: HERBIVORE_EAT_GAIN,
            carnivore_eat_gain: CARNIVORE_EAT_GAIN,
            plant_reproduction_probability: PLANT_REPRODUCTION_PROBABILITY,
            herbivore_reproduction_probability: HERBIVORE_REPRODUCTION_PROBABILITY,
            carnivore_reproduction_probability: CARNIVORE_REPRODUCTION_PROBABILITY,
            herbivore_move_probability: HERBIVORE_MOVE_PROBABILITY,
            carnivore_move_probability: CARNIVORE_MOVE_PROBABILITY,
            herbivore_eat_probability: HERBIVORE_EAT_PROBABILITY,
            carnivore_eat_probability: CARNIVORE_EAT_PROBABILITY,
        }
    }
}

impl Rules {
    /// Age at which an entity of the provided kind dies.
    #[must_use]
    pub const fn maximum_age(&self, kind: EntityKind) -> u32 {
        match kind {
            EntityKind::Plant => self.plant_maximum_age,
            EntityKind::Herbivore => self.herbivore_maximum_age,
            EntityKind::Carnivore => self.carnivore_maximum_age,
        }
    }

    /// Energy a newly created entity of the provided kind starts with.
    #[must_use]
    pub const fn starting_energy(&self, kind: EntityKind) -> u32 {
        if kind.is_animal() {
            self.initial_energy
        } else {
            0
        }
    }

    /// Chance that the kind sprouts or reproduces when it tries to.
    #[must_use]
    pub const fn reproduction_probability(&self, kind: EntityKind) -> f64 {
        match kind {
            EntityKind::Plant => self.plant_reproduction_probability,
            EntityKind::Herbivore => self.herbivore_reproduction_probability,
            EntityKind::Carnivore => self.carnivore_reproduction_probability,
        }
    }

    /// Chance that the kind's move action fires.
    #[must_use]
    pub const fn move_probability(&self, kind: EntityKind) -> f64 {
        match kind {
            EntityKind::Plant => 0.0,
            EntityKind::Herbivore => self.herbivore_move_probability,
            EntityKind::Carnivore => self.carnivore_move_probability,
        }
    }

    /// Chance that the kind's eat action fires.
    #[must_use]
    pub const fn eat_probability(&self, kind: EntityKind) -> f64 {
        match kind {
            EntityKind::Plant => 0.0,
            EntityKind::Herbivore => self.herbivore_eat_probability,
            EntityKind::Carnivore => self.carnivore_eat_probability,
        }
    }

    /// Energy the kind gains from one meal.
    #[must_use]
    pub const fn eat_gain(&self, kind: EntityKind) -> u32 {
        match kind {
            EntityKind::Plant => 0,
            EntityKind::Herbivore => self.herbivore_eat_gain,
            EntityKind::Carnivore => self.carnivore_eat_gain,
        }
    }

    /// Checks that every tunable lies within its meaningful range.
    pub fn validate(&self) -> Result<(), RulesError> {
        let probabilities = [
            (
                "plant_reproduction_probability",
                self.plant_reproduction_probability,
            ),
            (
                "herbivore_reproduction_probability",
                self.herbivore_reproduction_probability,
            ),
            (
                "carnivore_reproduction_probability",
                self.carnivore_reproduction_probability,
            ),
            ("herbivore_move_probability", self.herbivore_move_probability),
            ("carnivore_move_probability", self.carnivore_move_probability),
            ("herbivore_eat_probability", self.herbivore_eat_probability),
            ("carnivore_eat_probability", self.carnivore_eat_probability),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(RulesError::ProbabilityOutOfRange { name, value });
            }
        }

        if self.maximum_energy < self.initial_energy {
            return Err(RulesError::EnergyCeilingBelowInitial {
                maximum: self.maximum_energy,
                initial: self.initial_energy,
            });
        }

        Ok(())
    }
}

/// Immutable copy of a single cell taken from a quiescent grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CellSnapshot {
    /// Kind of the occupant, rendered as `" "`, `"P"`, `"H"` or `"C"`.
    #[serde(rename = "type", serialize_with = "serialize_kind_symbol")]
    pub kind: Option<EntityKind>,
    /// Energy of the occupant, zero when empty.
    pub energy: u32,
    /// Age of the occupant, zero when empty.
    pub age: u32,
}

impl From<&Cell> for CellSnapshot {
    fn from(cell: &Cell) -> Self {
        match cell.entity() {
            None => Self::default(),
            Some(entity) => Self {
                kind: Some(entity.kind()),
                energy: entity.energy(),
                age: entity.age(),
            },
        }
    }
}

fn serialize_kind_symbol<S>(kind: &Option<EntityKind>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(kind.map_or(" ", EntityKind::symbol))
}

/// Row-major copy of the whole grid.
///
/// Serialises as an array of rows, each row an array of cell objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridSnapshot {
    side: u32,
    cells: Vec<CellSnapshot>,
}

impl GridSnapshot {
    /// Creates a snapshot from row-major cells of a square grid.
    #[must_use]
    pub fn new(side: u32, cells: Vec<CellSnapshot>) -> Self {
        debug_assert_eq!(
            cells.len() as u64,
            u64::from(side) * u64::from(side),
            "snapshot must cover the whole grid"
        );
        Self { side, cells }
    }

    /// Side length of the captured grid.
    #[must_use]
    pub const fn side(&self) -> u32 {
        self.side
    }

    /// Cell captured at the provided coordinate, if it lies on the grid.
    #[must_use]
    pub fn cell(&self, cell: CellCoord) -> Option<&CellSnapshot> {
        if cell.row() >= self.side || cell.column() >= self.side {
            return None;
        }
        let index = cell.row() as usize * self.side as usize + cell.column() as usize;
        self.cells.get(index)
    }

    /// Iterator over the rows of the snapshot.
    pub fn rows(&self) -> impl Iterator<Item = &[CellSnapshot]> {
        self.cells.chunks(self.side.max(1) as usize)
    }

    /// Counts the captured entities per kind.
    #[must_use]
    pub fn population(&self) -> Population {
        let mut population = Population::default();
        for kind in self.cells.iter().filter_map(|cell| cell.kind) {
            population.record(kind);
        }
        population
    }
}

impl Serialize for GridSnapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.rows())
    }
}

impl fmt::Display for GridSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.rows() {
            let line: String = row
                .iter()
                .map(|cell| cell.kind.map_or(".", EntityKind::symbol))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Rejections raised while configuring a simulation.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The requested population does not fit on the grid.
    #[error("too many entities: requested {requested} but the grid holds {capacity}")]
    TooManyEntities {
        /// Sum of the requested counts.
        requested: u64,
        /// Number of cells on the grid.
        capacity: u64,
    },
    /// The grid must contain at least one cell.
    #[error("grid side length must be positive")]
    EmptyGrid,
}

/// Rejections raised while validating [`Rules`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RulesError {
    /// A probability lies outside `[0, 1]`.
    #[error("probability `{name}` must lie within [0, 1], found {value}")]
    ProbabilityOutOfRange {
        /// Field name of the offending probability.
        name: &'static str,
        /// Value that was supplied.
        value: f64,
    },
    /// Newly created animals would start above the energy ceiling.
    #[error("maximum energy {maximum} is below the initial energy {initial}")]
    EnergyCeilingBelowInitial {
        /// Configured ceiling.
        maximum: u32,
        /// Configured initial energy.
        initial: u32,
    },
}

/// Violations of the grid invariants. These indicate a defect in lock
/// discipline, never a condition callers are expected to recover from.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConsistencyFault {
    /// An entity's recorded position differs from the cell storing it.
    #[error("entity stored at {cell} records position {recorded}")]
    MisplacedEntity {
        /// Cell that stores the entity.
        cell: CellCoord,
        /// Position the entity carries.
        recorded: CellCoord,
    },
    /// An entity carries more energy than the ceiling allows.
    #[error("entity at {cell} carries energy {energy} above the ceiling {ceiling}")]
    EnergyAboveCeiling {
        /// Cell that stores the entity.
        cell: CellCoord,
        /// Energy the entity carries.
        energy: u32,
        /// Configured ceiling.
        ceiling: u32,
    },
}
