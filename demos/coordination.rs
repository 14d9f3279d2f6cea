//! Coordination example.
//!
//! Runs the limiter, the lease lock and the work queue against one in-memory
//! store, the way separate processes would share a Redis or Postgres backend.
//!
//! Run with: RUST_LOG=keel=debug cargo run --example coordination

use keel::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("🔗 Keel Coordination Example\n");

    let store = Arc::new(MemoryStore::new());

    // -------------------------------------------------------------------------
    // Sliding window limiter
    // -------------------------------------------------------------------------
    println!("1. Sliding window limiter (5 calls per 3s)");

    let limiter = SlidingWindowLimiter::with_config(store.clone(), LimiterConfig::default())?;
    for attempt in 1..=7 {
        let decision = limiter.check("partner-api").await?;
        println!(
            "   call {}: {} ({} in window, {} remaining)",
            attempt,
            if decision.allowed { "admitted" } else { "rejected" },
            decision.count,
            decision.remaining()
        );
    }

    match limiter.try_admit("partner-api").await {
        Err(e) if e.is_limit_exceeded() => {
            println!("   try_admit: {} (retry after {:?})\n", e, e.retry_after());
        }
        other => println!("   try_admit: {:?}\n", other),
    }

    // -------------------------------------------------------------------------
    // Lease lock
    // -------------------------------------------------------------------------
    println!("2. Exclusive lease lock");

    let node_a = LeaseLock::new(store.clone());
    let node_b = LeaseLock::new(store.clone());
    let ttl = Duration::from_secs(10);

    if let Some(token) = node_a.acquire("nightly-report", ttl).await? {
        println!("   node A holds the lease");
        let blocked = node_b.acquire("nightly-report", ttl).await?.is_none();
        println!("   node B blocked: {}", blocked);
        node_a.release("nightly-report", &token).await?;
        println!("   node A released");
    }

    let report = node_b
        .run_exclusive("nightly-report", ttl, || async { "report generated by node B" })
        .await?;
    println!("   {}\n", report);

    // -------------------------------------------------------------------------
    // Work queue
    // -------------------------------------------------------------------------
    println!("3. Work queue with a worker");

    let queue = WorkQueue::new(store.clone(), "emails");
    for to in ["ada@example.com", "grace@example.com", "linus@example.com"] {
        let item = queue.enqueue("send_email", json!({ "to": to })).await?;
        println!("   enqueued #{} for {}", item.id, to);
    }
    queue.enqueue("unknown_job", json!(null)).await?;

    let sent = Arc::new(AtomicU32::new(0));
    let config = WorkerConfig {
        poll_interval: Duration::from_millis(100),
        job_timeout: Duration::from_secs(5),
    };
    let mut worker = Worker::with_config(queue.clone(), config);

    let counter = sent.clone();
    worker.register_handler("send_email", move |item| {
        let counter = counter.clone();
        async move {
            let to = item.payload["to"].as_str().unwrap_or("unknown");
            println!("   📧 sending to {}", to);
            tokio::time::sleep(Duration::from_millis(50)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    worker.run(tokio::time::sleep(Duration::from_secs(1))).await;

    println!(
        "   sent: {}, done: {}, failed: {}, pending: {}",
        sent.load(Ordering::SeqCst),
        queue.count(ItemStatus::Done).await?,
        queue.count(ItemStatus::Failed).await?,
        queue.pending_count().await?
    );

    println!("\n✅ Example complete");
    Ok(())
}
