//! Completion barrier sized to the number of units launched for one tick.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Rendezvous point between the scheduler and the units it launched.
///
/// A fresh rendezvous is built for every tick with the number of captured
/// identities. Each unit holds an [`Arrival`] that signals on drop, so a unit
/// counts as finished whether it returns normally, unwinds, or never started
/// because its thread could not be spawned.
#[derive(Debug)]
pub struct Rendezvous {
    expected: usize,
    state: Mutex<State>,
    all_arrived: Condvar,
}

#[derive(Debug, Default)]
struct State {
    issued: usize,
    arrived: usize,
}

impl Rendezvous {
    /// Creates a rendezvous expecting exactly `expected` arrivals.
    #[must_use]
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            state: Mutex::new(State::default()),
            all_arrived: Condvar::new(),
        }
    }

    /// Number of arrivals the rendezvous waits for.
    #[must_use]
    pub const fn expected(&self) -> usize {
        self.expected
    }

    /// Number of arrivals recorded so far.
    #[must_use]
    pub fn arrived(&self) -> usize {
        self.lock().arrived
    }

    /// Hands out the token one unit of work signals completion with.
    pub fn arrival(&self) -> Arrival<'_> {
        let mut state = self.lock();
        debug_assert!(
            state.issued < self.expected,
            "rendezvous sized for {} units handed out another arrival",
            self.expected
        );
        state.issued += 1;
        Arrival { rendezvous: self }
    }

    /// Blocks until every expected unit has arrived.
    pub fn wait(&self) {
        let mut state = self.lock();
        while state.arrived < self.expected {
            state = self
                .all_arrived
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn arrive(&self) {
        let mut state = self.lock();
        state.arrived += 1;
        if state.arrived >= self.expected {
            self.all_arrived.notify_all();
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Completion token held by a single unit of work.
#[derive(Debug)]
#[must_use = "dropping an arrival immediately marks the unit as finished"]
pub struct Arrival<'a> {
    rendezvous: &'a Rendezvous,
}

impl Drop for Arrival<'_> {
    fn drop(&mut self) {
        self.rendezvous.arrive();
    }
}
