pub mod clock;
mod config;
mod event_queue;
pub mod fields;
mod timer;
pub mod validation;

pub use clock::{
    Clock, FixedClock, IdGenerator, ScriptedIdGenerator, SequentialIdGenerator, SystemClock,
    UuidGenerator,
};
pub use config::{
    normalize_host, LotusOptions, LotusOptionsBuilder, DEFAULT_FLUSH_AT, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_HOST, DEFAULT_RETRY_COUNT, ENV_API_KEY, ENV_ENABLE, ENV_FLUSH_AT,
    ENV_FLUSH_INTERVAL_MS, ENV_HOST, ENV_RETRY_COUNT, ENV_TIMEOUT_MS,
};
pub use event_queue::{
    EventQueue, TrackBatch, TrackEvent, TrackEventRecord, LIBRARY_NAME, LIBRARY_PROPERTY,
};
pub use timer::FlushTimer;
