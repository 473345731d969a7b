//! Destinations of a classified packet: the flow counter table and the
//! event channel.

use core::{ops::Deref, sync::atomic::AtomicU64, sync::atomic::Ordering};

use crate::{FlowKey, Metadata};

/// Why a create-if-absent insert did not create an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// The table holds `MAX_MAP_ENTRIES` keys already.
    Full,
    /// Another CPU created the key first.
    Exists,
}

/// Bounded map from [`FlowKey`] to a packet counter.
pub trait AggregationTable {
    type Counter: Deref<Target = AtomicU64>;

    fn lookup(&self, key: &FlowKey) -> Option<Self::Counter>;

    /// Creates `key` with `initial` unless it is already present.
    fn insert_if_absent(&self, key: &FlowKey, initial: u64) -> Result<(), InsertError>;
}

/// Which per-CPU ring an event goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuHint {
    Current,
    Index(u32),
}

/// Bounded, lossy channel of per-packet records. Sending never blocks and
/// a full ring drops the event.
pub trait EventChannel {
    /// Queues `record` followed by the first `packet_len` bytes of the frame.
    fn try_send(&self, record: &Metadata, packet_len: u32, hint: CpuHint);
}

/// Result of feeding a key to [`count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOutcome {
    Incremented,
    /// The key could not be created; no counter changed.
    Dropped(InsertError),
    /// The key was created but vanished before the second lookup.
    Missing,
}

/// Adds one to the counter of `key`, creating it at zero first.
#[inline(always)]
pub fn count<T: AggregationTable + ?Sized>(table: &T, key: &FlowKey) -> CountOutcome {
    let counter = match table.lookup(key) {
        Some(counter) => counter,
        None => {
            if let Err(e) = table.insert_if_absent(key, 0) {
                return CountOutcome::Dropped(e);
            }
            match table.lookup(key) {
                Some(counter) => counter,
                None => return CountOutcome::Missing,
            }
        }
    };

    counter.fetch_add(1, Ordering::Relaxed);
    CountOutcome::Incremented
}
