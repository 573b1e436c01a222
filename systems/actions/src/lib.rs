#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-kind rule set resolving what a single entity does during a tick.
//!
//! Every rule takes the [`EntityIdentity`] captured when the entity's unit of
//! work was launched and re-validates it against the grid before acting. A
//! mismatch means a concurrent unit consumed or replaced the entity; the rule
//! then resolves as a `Stale` no-op instead of touching whatever now lives in
//! that cell.
//!
//! Rules come in two layers. The `*_locked` functions run inside a critical
//! section the caller already holds. The unprefixed functions acquire the
//! grid lock for exactly one logical step. [`resolve_unit`] strings the steps
//! of one tick together: the death check in one critical section, then growth
//! or a single animal action (plus ageing) in another.

use ecosystem_core::{
    Action, DeathCause, EatOutcome, EntityIdentity, EntityKind, Event, GrowOutcome, MoveOutcome,
    ReproduceOutcome, Rules, Vitality,
};
use ecosystem_system_lifecycle::{remove, spawn_adjacent, Chance};
use ecosystem_world::{Grid, GridStore};
use tracing::trace;

/// Outcome of the single action an animal chose for the tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The animal chose to move.
    Move(MoveOutcome),
    /// The animal chose to eat in place.
    Eat(EatOutcome),
    /// The animal chose to reproduce.
    Reproduce(ReproduceOutcome),
}

impl ActionOutcome {
    /// Reports whether the action found its identity stale.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(
            self,
            Self::Move(MoveOutcome::Stale)
                | Self::Eat(EatOutcome::Stale)
                | Self::Reproduce(ReproduceOutcome::Stale)
        )
    }

    /// Identity of the acting animal once the action resolved.
    #[must_use]
    pub const fn resulting_identity(&self, identity: EntityIdentity) -> EntityIdentity {
        match self {
            Self::Move(MoveOutcome::Moved { to, .. }) => identity.relocated(*to),
            _ => identity,
        }
    }

    fn into_event(self, identity: EntityIdentity) -> Option<Event> {
        if self.is_stale() {
            return Some(Event::Skipped { identity });
        }
        match self {
            Self::Move(MoveOutcome::Moved { to, consumed }) => Some(Event::Moved {
                identity,
                to,
                consumed,
            }),
            Self::Eat(EatOutcome::Ate { prey }) => Some(Event::Ate { identity, prey }),
            Self::Reproduce(ReproduceOutcome::Reproduced { child }) => {
                Some(Event::Reproduced { identity, child })
            }
            _ => None,
        }
    }
}

/// Death check. Removes the entity when it reached the maximum age for its
/// kind or, for animals, ran out of energy.
pub fn die(store: &GridStore, identity: EntityIdentity, rules: &Rules) -> Vitality {
    store.with_grid(|grid| die_locked(grid, identity, rules))
}

/// [`die`] against an already locked grid.
pub fn die_locked(grid: &mut Grid<'_>, identity: EntityIdentity, rules: &Rules) -> Vitality {
    let Some(entity) = grid.resolve(identity) else {
        return Vitality::Stale;
    };

    let kind = identity.kind();
    let cause = if entity.age() >= rules.maximum_age(kind) {
        DeathCause::OldAge
    } else if kind.is_animal() && entity.energy() == 0 {
        DeathCause::Starvation
    } else {
        return Vitality::Alive;
    };

    let _ = remove(grid, identity);
    Vitality::Died(cause)
}

/// Plant growth. Sprouts a new plant into an empty neighbour with the
/// configured probability and ages the parent whether or not it sprouted.
pub fn grow(
    store: &GridStore,
    identity: EntityIdentity,
    rules: &Rules,
    chance: &mut impl Chance,
) -> GrowOutcome {
    store.with_grid(|grid| grow_locked(grid, identity, rules, chance))
}

/// [`grow`] against an already locked grid.
pub fn grow_locked(
    grid: &mut Grid<'_>,
    identity: EntityIdentity,
    rules: &Rules,
    chance: &mut impl Chance,
) -> GrowOutcome {
    if identity.kind() != EntityKind::Plant || grid.resolve(identity).is_none() {
        return GrowOutcome::Stale;
    }

    let sprout = if chance.roll(rules.reproduction_probability(EntityKind::Plant)) {
        spawn_adjacent(grid, identity.cell(), EntityKind::Plant, 0, 0, chance)
    } else {
        None
    };

    let tick = grid.tick();
    if let Some(parent) = grid.resolve_mut(identity) {
        parent.grow_older();
        parent.mark_acted(tick);
    }

    match sprout {
        Some(sprout) => GrowOutcome::Grew { sprout },
        None => GrowOutcome::Idle,
    }
}

/// Animal movement onto a random valid neighbour.
///
/// Herbivores may enter empty cells and plants, carnivores additionally
/// herbivores. Entering a cell destroys whatever stood there; the mover pays
/// the move cost and gains its meal energy when the destroyed entity was its
/// prey. With no valid destination the animal stays put at no cost.
pub fn move_entity(
    store: &GridStore,
    identity: EntityIdentity,
    rules: &Rules,
    chance: &mut impl Chance,
) -> MoveOutcome {
    store.with_grid(|grid| move_locked(grid, identity, rules, chance))
}

/// [`move_entity`] against an already locked grid.
pub fn move_locked(
    grid: &mut Grid<'_>,
    identity: EntityIdentity,
    rules: &Rules,
    chance: &mut impl Chance,
) -> MoveOutcome {
    let Some(energy) = grid.resolve(identity).map(|entity| entity.energy()) else {
        return MoveOutcome::Stale;
    };

    let kind = identity.kind();
    if !kind.is_animal() || energy < rules.move_cost {
        return MoveOutcome::Stayed;
    }
    if !chance.roll(rules.move_probability(kind)) {
        return MoveOutcome::Stayed;
    }

    let destinations: Vec<_> = grid
        .neighbors(identity.cell())
        .filter(|(_, cell)| kind.can_enter(cell.kind()))
        .map(|(coord, cell)| (coord, cell.kind()))
        .collect();
    if destinations.is_empty() {
        return MoveOutcome::Stayed;
    }

    let (to, consumed) = destinations[chance.pick(destinations.len())];
    let Some(mut mover) = grid.take(identity.cell()) else {
        return MoveOutcome::Stale;
    };
    mover.drain(rules.move_cost);
    if consumed.is_some() && consumed == kind.prey() {
        mover.feed(rules.eat_gain(kind), rules.maximum_energy);
    }
    let _ = grid.place(mover.relocated(to));

    MoveOutcome::Moved { to, consumed }
}

/// Animal eating in place: removes one random adjacent prey and gains its
/// meal energy, capped at the maximum.
pub fn eat(
    store: &GridStore,
    identity: EntityIdentity,
    rules: &Rules,
    chance: &mut impl Chance,
) -> EatOutcome {
    store.with_grid(|grid| eat_locked(grid, identity, rules, chance))
}

/// [`eat`] against an already locked grid.
pub fn eat_locked(
    grid: &mut Grid<'_>,
    identity: EntityIdentity,
    rules: &Rules,
    chance: &mut impl Chance,
) -> EatOutcome {
    if grid.resolve(identity).is_none() {
        return EatOutcome::Stale;
    }

    let kind = identity.kind();
    let Some(prey_kind) = kind.prey() else {
        return EatOutcome::Idle;
    };
    if !chance.roll(rules.eat_probability(kind)) {
        return EatOutcome::Idle;
    }

    let prey_cells: Vec<_> = grid
        .neighbors(identity.cell())
        .filter(|(_, cell)| cell.holds(prey_kind))
        .map(|(coord, _)| coord)
        .collect();
    if prey_cells.is_empty() {
        return EatOutcome::Idle;
    }

    let prey = EntityIdentity::new(prey_kind, prey_cells[chance.pick(prey_cells.len())]);
    if remove(grid, prey).is_none() {
        return EatOutcome::Idle;
    }
    if let Some(eater) = grid.resolve_mut(identity) {
        eater.feed(rules.eat_gain(kind), rules.maximum_energy);
    }

    EatOutcome::Ate { prey }
}

/// Animal reproduction into an empty neighbour. Requires the reproduction
/// energy threshold; the parent pays the reproduction cost only when a child
/// was actually placed.
pub fn reproduce(
    store: &GridStore,
    identity: EntityIdentity,
    rules: &Rules,
    chance: &mut impl Chance,
) -> ReproduceOutcome {
    store.with_grid(|grid| reproduce_locked(grid, identity, rules, chance))
}

/// [`reproduce`] against an already locked grid.
pub fn reproduce_locked(
    grid: &mut Grid<'_>,
    identity: EntityIdentity,
    rules: &Rules,
    chance: &mut impl Chance,
) -> ReproduceOutcome {
    let Some(energy) = grid.resolve(identity).map(|entity| entity.energy()) else {
        return ReproduceOutcome::Stale;
    };

    let kind = identity.kind();
    if !kind.is_animal() || energy < rules.reproduction_energy_threshold {
        return ReproduceOutcome::Idle;
    }
    if !chance.roll(rules.reproduction_probability(kind)) {
        return ReproduceOutcome::Idle;
    }

    let Some(child) = spawn_adjacent(
        grid,
        identity.cell(),
        kind,
        rules.initial_energy,
        0,
        chance,
    ) else {
        return ReproduceOutcome::Idle;
    };
    if let Some(parent) = grid.resolve_mut(identity) {
        parent.drain(rules.reproduction_cost);
    }

    ReproduceOutcome::Reproduced { child }
}

/// Runs one uniformly chosen animal action, then ages the animal at wherever
/// the action left it. Both happen in a single critical section.
pub fn act(
    store: &GridStore,
    identity: EntityIdentity,
    rules: &Rules,
    chance: &mut impl Chance,
) -> ActionOutcome {
    let action = chance.choose_action();
    store.with_grid(|grid| act_locked(grid, identity, action, rules, chance))
}

/// Runs the provided action and ages the animal against a locked grid. The
/// animal is then marked as having acted in the open tick.
pub fn act_locked(
    grid: &mut Grid<'_>,
    identity: EntityIdentity,
    action: Action,
    rules: &Rules,
    chance: &mut impl Chance,
) -> ActionOutcome {
    let outcome = match action {
        Action::Move => ActionOutcome::Move(move_locked(grid, identity, rules, chance)),
        Action::Eat => ActionOutcome::Eat(eat_locked(grid, identity, rules, chance)),
        Action::Reproduce => {
            ActionOutcome::Reproduce(reproduce_locked(grid, identity, rules, chance))
        }
    };

    let tick = grid.tick();
    if let Some(animal) = grid.resolve_mut(outcome.resulting_identity(identity)) {
        animal.grow_older();
        animal.mark_acted(tick);
    }
    outcome
}

/// Resolves everything one entity does in a tick: the death check, then
/// growth for plants or a single action for animals.
///
/// Returns the event the unit produced, if any. Units whose identity went
/// stale report [`Event::Skipped`].
pub fn resolve_unit(
    store: &GridStore,
    identity: EntityIdentity,
    rules: &Rules,
    chance: &mut impl Chance,
) -> Option<Event> {
    let event = match die(store, identity, rules) {
        Vitality::Stale => Some(Event::Skipped { identity }),
        Vitality::Died(cause) => Some(Event::Died { identity, cause }),
        Vitality::Alive if identity.kind() == EntityKind::Plant => {
            match grow(store, identity, rules, chance) {
                GrowOutcome::Grew { sprout } => Some(Event::Sprouted {
                    parent: identity,
                    sprout,
                }),
                GrowOutcome::Idle => None,
                GrowOutcome::Stale => Some(Event::Skipped { identity }),
            }
        }
        Vitality::Alive => act(store, identity, rules, chance).into_event(identity),
    };

    trace!(%identity, ?event, "unit resolved");
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosystem_core::CellCoord;

    #[test]
    fn resulting_identity_follows_moves() {
        let identity = EntityIdentity::new(EntityKind::Herbivore, CellCoord::new(3, 3));
        let moved = ActionOutcome::Move(MoveOutcome::Moved {
            to: CellCoord::new(4, 4),
            consumed: None,
        });
        assert_eq!(moved.resulting_identity(identity).cell(), CellCoord::new(4, 4));

        let ate = ActionOutcome::Eat(EatOutcome::Idle);
        assert_eq!(ate.resulting_identity(identity), identity);
    }

    #[test]
    fn stale_actions_become_skip_events() {
        let identity = EntityIdentity::new(EntityKind::Carnivore, CellCoord::new(0, 0));
        let event = ActionOutcome::Reproduce(ReproduceOutcome::Stale).into_event(identity);
        assert_eq!(event, Some(Event::Skipped { identity }));
        assert_eq!(ActionOutcome::Move(MoveOutcome::Stayed).into_event(identity), None);
    }
}
