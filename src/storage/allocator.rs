//! Identity allocation for people and tests.

use crate::core::{PersonId, TestId};

/// Which counter an id is drawn from. Patients, doctors and technicians all
/// share the person counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Person,
    Test,
}

/// Last-used values of the two id counters.
///
/// Allocation takes `&mut self`, so the allocator is only reachable through
/// the registry's exclusive lock and two callers can never observe the same
/// value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdAllocator {
    person_counter: PersonId,
    test_counter: TestId,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore counters from persisted last-used values.
    pub fn restore(person_counter: PersonId, test_counter: TestId) -> Self {
        Self {
            person_counter,
            test_counter,
        }
    }

    pub fn next(&mut self, counter: Counter) -> u64 {
        let slot = match counter {
            Counter::Person => &mut self.person_counter,
            Counter::Test => &mut self.test_counter,
        };
        *slot += 1;
        *slot
    }

    pub fn next_person(&mut self) -> PersonId {
        self.next(Counter::Person)
    }

    pub fn next_test(&mut self) -> TestId {
        self.next(Counter::Test)
    }

    pub fn current(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Person => self.person_counter,
            Counter::Test => self.test_counter,
        }
    }

    /// Raise a counter so the next value is above `floor`. Never lowers it.
    pub fn ensure_at_least(&mut self, counter: Counter, floor: u64) -> bool {
        let slot = match counter {
            Counter::Person => &mut self.person_counter,
            Counter::Test => &mut self.test_counter,
        };
        if *slot < floor {
            *slot = floor;
            true
        } else {
            false
        }
    }
}
