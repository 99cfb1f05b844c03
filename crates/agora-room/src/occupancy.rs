//! Capacity bookkeeping shared between the registry and one room.
//!
//! The registry decides whether a join fits; the room actor is the one that
//! actually adds and removes members. Both look at the same counters, so
//! they live behind a lock instead of inside either actor.
//!
//! A join is two-phase. The registry first *reserves* a slot (`pending`)
//! and then hands the participant to the room, which either *admits* it
//! (`pending → current`) or *releases* it. Counting reservations means two
//! joins arbitrated back to back can never overbook a room while the first
//! is still in flight.

use std::sync::{PoisonError, RwLock};

/// Outcome of [`Occupancy::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// A slot is held for the caller.
    Granted,
    /// `current + pending` already reached `total`.
    Full,
    /// The room has closed and will not take anyone.
    Closed,
}

#[derive(Debug)]
struct Counts {
    total: u32,
    current: u32,
    pending: u32,
    closed: bool,
}

/// `current`/`total`/`pending` for one room.
///
/// Invariant: `current + pending <= total`.
#[derive(Debug)]
pub struct Occupancy {
    counts: RwLock<Counts>,
}

impl Occupancy {
    pub fn new(total: u32) -> Self {
        Self {
            counts: RwLock::new(Counts {
                total,
                current: 0,
                pending: 0,
                closed: false,
            }),
        }
    }

    pub fn total(&self) -> u32 {
        self.read(|c| c.total)
    }

    pub fn current(&self) -> u32 {
        self.read(|c| c.current)
    }

    pub fn pending(&self) -> u32 {
        self.read(|c| c.pending)
    }

    pub fn is_closed(&self) -> bool {
        self.read(|c| c.closed)
    }

    /// Holds one slot for a participant about to enter.
    pub fn reserve(&self) -> Reservation {
        self.write(|c| {
            if c.closed {
                Reservation::Closed
            } else if c.current + c.pending >= c.total {
                Reservation::Full
            } else {
                c.pending += 1;
                Reservation::Granted
            }
        })
    }

    /// Turns a reservation into a seat.
    pub fn admit(&self) {
        self.write(|c| {
            c.pending = c.pending.saturating_sub(1);
            c.current = (c.current + 1).min(c.total);
        });
    }

    /// Gives back a reservation that will not be used.
    pub fn release(&self) {
        self.write(|c| c.pending = c.pending.saturating_sub(1));
    }

    /// Frees a seat when a member leaves.
    pub fn vacate(&self) {
        self.write(|c| c.current = c.current.saturating_sub(1));
    }

    /// Marks the room closed if nobody is in it or on the way in.
    ///
    /// Returns `true` if this call closed the room. Once closed, every
    /// further [`reserve`](Self::reserve) answers `Closed`.
    pub fn try_close(&self) -> bool {
        self.write(|c| {
            if !c.closed && c.current == 0 && c.pending == 0 {
                c.closed = true;
                true
            } else {
                false
            }
        })
    }

    // A panic while holding the lock cannot leave the counters half-updated,
    // so a poisoned lock is still safe to use.
    fn read<R>(&self, f: impl FnOnce(&Counts) -> R) -> R {
        let guard = self.counts.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Counts) -> R) -> R {
        let mut guard =
            self.counts.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
