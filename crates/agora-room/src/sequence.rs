use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free, monotonically increasing counter.
///
/// Hands out participant ids (one per server) and message ids (one per
/// registry, shared by all of its rooms). Values are never reused.
#[derive(Debug, Default)]
pub struct Sequence(AtomicU64);

impl Sequence {
    /// A sequence whose first value is `0`.
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// A sequence whose first value is `first`.
    pub const fn starting_at(first: u64) -> Self {
        Self(AtomicU64::new(first))
    }

    /// Returns the next value.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// The value the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
