// Keel - distributed coordination primitives over a shared atomic store
//
// Independent processes that share nothing but a store coordinate through
// three primitives: a sliding-window rate limiter, an exclusive lease lock
// and a skip-locked work queue.

// Re-export core functionality
pub use keel_core::*;

// Re-export optional crates
#[cfg(feature = "ratelimit")]
pub use keel_ratelimit;

#[cfg(feature = "lock")]
pub use keel_lock;

#[cfg(feature = "queue")]
pub use keel_queue;

#[cfg(feature = "redis")]
pub use keel_redis;

#[cfg(feature = "postgres")]
pub use keel_postgres;

#[cfg(feature = "ratelimit")]
pub use keel_ratelimit::{Decision, LimiterConfig, RateLimitError, SlidingWindowLimiter};

#[cfg(feature = "lock")]
pub use keel_lock::{LeaseLock, LeaseToken, LockConfig, LockError};

#[cfg(feature = "queue")]
pub use keel_queue::{Completion, QueueConfig, QueueError, WorkQueue, Worker, WorkerConfig};

#[cfg(feature = "redis")]
pub use keel_redis::{RedisConfig, RedisStore};

#[cfg(feature = "postgres")]
pub use keel_postgres::{PgQueueStore, PostgresConfig};

// Prelude for common imports
pub mod prelude {
    pub use keel_core::prelude::*;

    #[cfg(feature = "ratelimit")]
    pub use keel_ratelimit::prelude::*;

    #[cfg(feature = "lock")]
    pub use keel_lock::prelude::*;

    #[cfg(feature = "queue")]
    pub use keel_queue::prelude::*;

    #[cfg(feature = "redis")]
    pub use keel_redis::{RedisConfig, RedisStore};

    #[cfg(feature = "postgres")]
    pub use keel_postgres::{PgQueueStore, PostgresConfig};
}
