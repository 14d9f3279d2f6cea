//! Redis coordination example.
//!
//! Two lease locks and a limiter sharing a Redis server. Run several copies
//! at once to watch them coordinate.
//!
//! Note: This example requires Redis to be running
//! Start Redis: docker run -p 6379:6379 redis
//!
//! Run with:
//! KEEL_REDIS_URL=redis://127.0.0.1:6379 cargo run --example redis_coordination --features redis

use keel::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RedisConfig::from_env().build();
    info!(url = %config.url, prefix = %config.key_prefix, "Connecting to Redis");

    let store = Arc::new(RedisStore::with_config(config).await?);
    let limiter_config = LimiterConfig::from_env().build()?;
    let limiter = SlidingWindowLimiter::with_config(store.clone(), limiter_config)?;
    let lock = LeaseLock::with_config(store, LockConfig::from_env());

    for round in 1..=5 {
        let decision = limiter.check("demo").await?;
        if !decision.allowed {
            warn!(round, count = decision.count, "Rate limited, skipping round");
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }

        match lock
            .run_exclusive("demo-job", Duration::from_secs(5), || async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                round
            })
            .await
        {
            Ok(round) => info!(round, "Ran the guarded job"),
            Err(e) if e.is_contended() => info!(round, "Another process is running the job"),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
