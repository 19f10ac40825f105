//! Monotonic-per-node snowflake ID generation.
//!
//! Layout: 41 bits of milliseconds since the praxis epoch, 10 bits of node
//! ID, 12 bits of per-millisecond sequence. IDs generated by a single node
//! are strictly increasing; IDs from different nodes never collide.

use chrono::Utc;
use parking_lot::Mutex;

use crate::ids::RequestId;

/// Milliseconds between the Unix epoch and the praxis epoch (2023-01-01 UTC).
const EPOCH_OFFSET_MILLIS: i64 = 1_672_531_200_000;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

/// A snowflake ID generator bound to one node.
pub struct SnowflakeGenerator {
    node: i64,
    state: Mutex<State>,
}

struct State {
    last_millis: i64,
    sequence: i64,
}

impl SnowflakeGenerator {
    /// Create a generator for the given node.
    ///
    /// # Panics
    ///
    /// Panics if `node` does not fit in 10 bits.
    #[must_use]
    pub fn new(node: u16) -> Self {
        assert!(i64::from(node) < (1 << NODE_BITS), "node id out of range");
        Self {
            node: i64::from(node),
            state: Mutex::new(State {
                last_millis: 0,
                sequence: 0,
            }),
        }
    }

    /// Generate the next request ID.
    ///
    /// If the sequence for the current millisecond is exhausted the
    /// generator borrows from the next millisecond rather than spinning,
    /// preserving monotonicity under burst load.
    pub fn generate(&self) -> RequestId {
        let mut state = self.state.lock();

        let mut millis = Self::now_millis();
        if millis <= state.last_millis {
            millis = state.last_millis;
        }

        if millis == state.last_millis {
            state.sequence += 1;
            if state.sequence > MAX_SEQUENCE {
                millis += 1;
                state.sequence = 0;
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = millis;

        let raw = (millis << (NODE_BITS + SEQUENCE_BITS)) | (self.node << SEQUENCE_BITS) | state.sequence;
        RequestId::from_raw(raw)
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis() - EPOCH_OFFSET_MILLIS
    }
}
