//! Instance counters for lifecycle tests
//!
//! With the `diagnostics` feature every handle kind records how many
//! instances were constructed and destroyed, so tests can assert that
//! releasing all handles really tears down contexts and machines. Without
//! the feature the counters do not exist and [`InstanceToken`] is a no-op.
//!
//! Counters are process-wide; tests reading them call [`reset`] first and
//! run serialized.

#[cfg(feature = "diagnostics")]
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle kinds tracked by the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceKind {
    VirtualMachine,
    Context,
    Value,
    Object,
    Array,
    Date,
    Error,
    RegExp,
    Function,
}

impl InstanceKind {
    pub const ALL: [InstanceKind; 9] = [
        InstanceKind::VirtualMachine,
        InstanceKind::Context,
        InstanceKind::Value,
        InstanceKind::Object,
        InstanceKind::Array,
        InstanceKind::Date,
        InstanceKind::Error,
        InstanceKind::RegExp,
        InstanceKind::Function,
    ];

    #[cfg(feature = "diagnostics")]
    fn index(self) -> usize {
        self as usize
    }
}

/// Snapshot of one kind's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceCounts {
    pub constructed: u64,
    pub destroyed: u64,
}

impl InstanceCounts {
    /// Instances constructed but not yet destroyed
    pub fn alive(&self) -> u64 {
        self.constructed.saturating_sub(self.destroyed)
    }
}

#[cfg(feature = "diagnostics")]
struct Counter {
    constructed: AtomicU64,
    destroyed: AtomicU64,
}

#[cfg(feature = "diagnostics")]
#[allow(clippy::declare_interior_mutable_const)]
const COUNTER_INIT: Counter = Counter {
    constructed: AtomicU64::new(0),
    destroyed: AtomicU64::new(0),
};

#[cfg(feature = "diagnostics")]
static COUNTERS: [Counter; InstanceKind::ALL.len()] = [COUNTER_INIT; InstanceKind::ALL.len()];

/// Current counters for `kind`
#[cfg(feature = "diagnostics")]
pub fn counts(kind: InstanceKind) -> InstanceCounts {
    let counter = &COUNTERS[kind.index()];
    InstanceCounts {
        constructed: counter.constructed.load(Ordering::SeqCst),
        destroyed: counter.destroyed.load(Ordering::SeqCst),
    }
}

/// Zero every counter
#[cfg(feature = "diagnostics")]
pub fn reset() {
    for counter in &COUNTERS {
        counter.constructed.store(0, Ordering::SeqCst);
        counter.destroyed.store(0, Ordering::SeqCst);
    }
}

/// Embedded in every counted handle: bumps `constructed` on creation and
/// clone, `destroyed` on drop.
pub(crate) struct InstanceToken {
    #[cfg(feature = "diagnostics")]
    kind: InstanceKind,
}

impl InstanceToken {
    #[allow(unused_variables)]
    pub(crate) fn new(kind: InstanceKind) -> Self {
        #[cfg(feature = "diagnostics")]
        {
            COUNTERS[kind.index()]
                .constructed
                .fetch_add(1, Ordering::SeqCst);
            Self { kind }
        }
        #[cfg(not(feature = "diagnostics"))]
        {
            Self {}
        }
    }
}

impl Clone for InstanceToken {
    fn clone(&self) -> Self {
        #[cfg(feature = "diagnostics")]
        {
            Self::new(self.kind)
        }
        #[cfg(not(feature = "diagnostics"))]
        {
            Self {}
        }
    }
}

#[cfg(feature = "diagnostics")]
impl Drop for InstanceToken {
    fn drop(&mut self) {
        COUNTERS[self.kind.index()]
            .destroyed
            .fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for InstanceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InstanceToken")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alive_saturates() {
        let counts = InstanceCounts {
            constructed: 3,
            destroyed: 1,
        };
        assert_eq!(counts.alive(), 2);
        assert_eq!(InstanceCounts::default().alive(), 0);
    }

    #[test]
    fn test_all_kinds_are_distinct() {
        for (i, a) in InstanceKind::ALL.iter().enumerate() {
            for b in &InstanceKind::ALL[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
