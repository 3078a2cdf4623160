//! Snowflake-style ID generation.
//!
//! IDs are 63-bit positive integers laid out as
//!
//! ```text
//! | 41 bits: ms since EPOCH_MS | 10 bits: worker id | 12 bits: sequence |
//! ```
//!
//! A generator never talks to the database. Uniqueness across a deployment
//! comes from giving every process its own worker id (`SNOWFLAKE_WORKER_ID`);
//! uniqueness within a process comes from the mutex-guarded sequence.

use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::warn;

use super::id::Id;

/// Custom epoch: 2024-01-01T00:00:00Z in unix milliseconds.
pub const EPOCH_MS: u64 = 1_704_067_200_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_BITS: u32 = 41;

pub const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;
const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_BITS) - 1;

const WORKER_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_BITS;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("clock moved backwards: last issued tick {last_ms}, clock now reads {now_ms}")]
    ClockMovedBackwards { last_ms: u64, now_ms: u64 },

    #[error("worker id {0} out of range (max {max})", max = MAX_WORKER_ID)]
    InvalidWorkerId(u16),

    #[error("clock reads {0}ms, which is before the snowflake epoch")]
    ClockBeforeEpoch(u64),

    #[error("timestamp {0}ms past epoch no longer fits in {bits} bits", bits = TIMESTAMP_BITS)]
    TimestampOverflow(u64),
}

/// Millisecond wall clock. Injectable so tests can drive regression and
/// sequence saturation deterministically.
pub trait Clock: Send + Sync {
    /// Unix time in milliseconds.
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Fields packed into a snowflake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    /// Unix time in milliseconds.
    pub timestamp_ms: u64,
    pub worker_id: u16,
    pub sequence: u16,
}

impl IdParts {
    pub fn decompose(id: i64) -> Self {
        let raw = id as u64;
        Self {
            timestamp_ms: (raw >> TIMESTAMP_SHIFT) + EPOCH_MS,
            worker_id: ((raw >> WORKER_SHIFT) & MAX_WORKER_ID as u64) as u16,
            sequence: (raw & MAX_SEQUENCE as u64) as u16,
        }
    }
}

#[derive(Debug)]
struct State {
    /// Last tick (ms since EPOCH_MS) an id was issued for.
    last_tick: u64,
    sequence: u16,
}

/// Process-wide ID generator. Share it as `Arc<SnowflakeGenerator>`.
#[derive(Debug)]
pub struct SnowflakeGenerator<C: Clock = SystemClock> {
    worker_id: u16,
    clock: C,
    state: Mutex<State>,
}

impl SnowflakeGenerator<SystemClock> {
    pub fn new(worker_id: u16) -> Result<Self, IdError> {
        Self::with_clock(worker_id, SystemClock)
    }
}

impl<C: Clock> SnowflakeGenerator<C> {
    pub fn with_clock(worker_id: u16, clock: C) -> Result<Self, IdError> {
        if worker_id > MAX_WORKER_ID {
            return Err(IdError::InvalidWorkerId(worker_id));
        }

        Ok(Self {
            worker_id,
            clock,
            state: Mutex::new(State {
                last_tick: 0,
                sequence: 0,
            }),
        })
    }

    pub fn worker_id(&self) -> u16 {
        self.worker_id
    }

    /// Issue the next raw snowflake.
    ///
    /// Blocks (spinning) for at most the remainder of the current millisecond
    /// when 4096 ids were already issued within it. Refuses to issue anything
    /// while the clock reads earlier than the last issued tick.
    pub fn next_id(&self) -> Result<i64, IdError> {
        // State is two integers that are only written after all checks pass,
        // so a poisoned lock still holds a consistent value.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut tick = self.tick()?;
        if tick < state.last_tick {
            warn!(
                last_tick = state.last_tick,
                tick,
                worker_id = self.worker_id,
                "Clock regression detected, refusing to issue ids"
            );
            return Err(IdError::ClockMovedBackwards {
                last_ms: state.last_tick + EPOCH_MS,
                now_ms: tick + EPOCH_MS,
            });
        }

        let sequence = if tick == state.last_tick {
            if state.sequence == MAX_SEQUENCE {
                tick = self.wait_for_next_tick(state.last_tick)?;
                0
            } else {
                state.sequence + 1
            }
        } else {
            0
        };

        state.last_tick = tick;
        state.sequence = sequence;

        Ok(((tick << TIMESTAMP_SHIFT)
            | ((self.worker_id as u64) << WORKER_SHIFT)
            | sequence as u64) as i64)
    }

    /// Issue the next snowflake as a typed id.
    pub fn next<T>(&self) -> Result<Id<T>, IdError> {
        self.next_id().map(Id::from_i64)
    }

    fn tick(&self) -> Result<u64, IdError> {
        let now = self.clock.now_millis();
        let tick = now.checked_sub(EPOCH_MS).ok_or(IdError::ClockBeforeEpoch(now))?;
        if tick > MAX_TIMESTAMP {
            return Err(IdError::TimestampOverflow(tick));
        }
        Ok(tick)
    }

    fn wait_for_next_tick(&self, last_tick: u64) -> Result<u64, IdError> {
        loop {
            std::hint::spin_loop();
            let tick = self.tick()?;
            if tick > last_tick {
                return Ok(tick);
            }
            if tick < last_tick {
                return Err(IdError::ClockMovedBackwards {
                    last_ms: last_tick + EPOCH_MS,
                    now_ms: tick + EPOCH_MS,
                });
            }
        }
    }
}
