//! Key generation for inserts that omit the key column.
//!
//! `SNOWFLAKE` layout (63 bits used):
//!
//! ```text
//! | 41 bits: ms since 2016-11-01 | 10 bits: worker id | 12 bits: sequence |
//! ```

use std::sync::Arc;
use std::time::Duration;

use kestrel_common::datum::Datum;
use kestrel_common::error::{ConfigError, KestrelResult, RouteError};
use kestrel_common::props::Props;
use parking_lot::Mutex;

pub trait KeyGenerateAlgorithm: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn generate_key(&self) -> KestrelResult<Datum>;
}

/// Milliseconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

#[derive(Debug, Default)]
struct SnowflakeState {
    last_ms: i64,
    sequence: u64,
    sequence_offset: u64,
}

pub struct SnowflakeKeyGenerator {
    worker_id: u64,
    max_tolerate_ms: i64,
    max_vibration_offset: u64,
    clock: Clock,
    state: Mutex<SnowflakeState>,
}

impl SnowflakeKeyGenerator {
    pub const TYPE: &'static str = "SNOWFLAKE";
    /// 2016-11-01T00:00:00Z.
    pub const EPOCH_MS: i64 = 1_477_929_600_000;

    const SEQUENCE_BITS: u32 = 12;
    const WORKER_BITS: u32 = 10;
    const SEQUENCE_MASK: u64 = (1 << Self::SEQUENCE_BITS) - 1;
    const MAX_WORKER_ID: i64 = (1 << Self::WORKER_BITS) - 1;

    pub fn new(props: &Props) -> Result<Self, ConfigError> {
        Self::with_clock(props, system_clock())
    }

    pub fn with_clock(props: &Props, clock: Clock) -> Result<Self, ConfigError> {
        let worker_id = props.get_i64(Self::TYPE, "worker-id")?.unwrap_or(0);
        if !(0..=Self::MAX_WORKER_ID).contains(&worker_id) {
            return Err(ConfigError::InvalidProperty {
                algorithm: Self::TYPE.to_string(),
                key: "worker-id".to_string(),
                reason: format!("must be within 0..={}", Self::MAX_WORKER_ID),
            });
        }
        let max_tolerate_ms = props
            .get_i64(Self::TYPE, "max-tolerate-time-difference-milliseconds")?
            .unwrap_or(10)
            .max(0);
        let max_vibration_offset = props
            .get_i64(Self::TYPE, "max-vibration-offset")?
            .unwrap_or(1);
        if !(0..=Self::SEQUENCE_MASK as i64).contains(&max_vibration_offset) {
            return Err(ConfigError::InvalidProperty {
                algorithm: Self::TYPE.to_string(),
                key: "max-vibration-offset".to_string(),
                reason: format!("must be within 0..={}", Self::SEQUENCE_MASK),
            });
        }
        Ok(Self {
            worker_id: worker_id as u64,
            max_tolerate_ms,
            max_vibration_offset: max_vibration_offset as u64,
            clock,
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    fn wait_until_after(&self, last_ms: i64) -> i64 {
        let mut now = (self.clock)();
        while now <= last_ms {
            std::thread::yield_now();
            now = (self.clock)();
        }
        now
    }

    fn compose(&self, ms: i64, sequence: u64) -> i64 {
        let elapsed = (ms - Self::EPOCH_MS).max(0) as u64;
        ((elapsed << (Self::WORKER_BITS + Self::SEQUENCE_BITS))
            | (self.worker_id << Self::SEQUENCE_BITS)
            | sequence) as i64
    }
}

impl KeyGenerateAlgorithm for SnowflakeKeyGenerator {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn generate_key(&self) -> KestrelResult<Datum> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut now = (self.clock)();

        if now < state.last_ms {
            let behind = state.last_ms - now;
            if behind > self.max_tolerate_ms {
                return Err(RouteError::KeyGeneration(format!(
                    "clock moved backwards by {behind} ms (tolerance {} ms)",
                    self.max_tolerate_ms
                ))
                .into());
            }
            tracing::warn!(behind_ms = behind, "clock moved backwards, waiting to catch up");
            std::thread::sleep(Duration::from_millis(behind as u64));
            now = self.wait_until_after(state.last_ms - 1);
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & Self::SEQUENCE_MASK;
            if state.sequence == 0 {
                now = self.wait_until_after(state.last_ms);
                let start = self.vibrate(state);
                state.sequence = start;
            }
        } else {
            let start = self.vibrate(state);
            state.sequence = start;
        }
        state.last_ms = now;
        Ok(Datum::Int64(self.compose(now, state.sequence)))
    }
}

impl SnowflakeKeyGenerator {
    /// Starting sequence for a fresh millisecond. Alternating the start keeps
    /// low-traffic keys from all being even, which would skew `MOD 2` routing.
    fn vibrate(&self, state: &mut SnowflakeState) -> u64 {
        state.sequence_offset = if state.sequence_offset >= self.max_vibration_offset {
            0
        } else {
            state.sequence_offset + 1
        };
        state.sequence_offset
    }
}
