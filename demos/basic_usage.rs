// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic cachewire usage example.
//!
//! Demonstrates:
//! 1. Building an engine (in-process store, or Redis when `REDIS_URL` is set)
//! 2. Read-through caching with a timed miss and hit
//! 3. Grouped hash caching with a group-wide TTL
//! 4. Evict-and-publish on update, with a subscriber reacting
//! 5. Displaying metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! REDIS_URL=redis://localhost:6379 cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use cachewire::policy::{Cacheable, Evict, HashGet, HashPut, Invocation, Publish, Subscribe};
use cachewire::{handler_fn, BoxError, CachewireConfig, PolicyEngine};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

/// Stands in for a slow database lookup.
async fn load_user(id: u64) -> Result<Option<User>, std::io::Error> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(Some(User { id, name: format!("user-{}", id) }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().map_err(|_| "failed to install metrics recorder")?;

    tracing_subscriber::fmt().with_target(false).compact().init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             cachewire: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure the engine
    // ─────────────────────────────────────────────────────────────────────────
    let mut config = CachewireConfig::from_toml_str(
        r#"
        application_name = "demo-service"

        [cache]
        prefix = "demo"
        default_ttl_secs = 120

        [pubsub]
        handler_max_attempts = 3
        "#,
    )?;
    let redis_url = std::env::var("REDIS_URL").ok();
    config.redis_url = redis_url.clone();

    let mut engine = match redis_url {
        Some(url) => {
            println!("📦 Connecting to {}...", url);
            PolicyEngine::connect(config).await?
        }
        None => {
            println!("📦 No REDIS_URL, using the in-process store");
            PolicyEngine::in_memory(config)
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Register a subscriber before starting listeners
    // ─────────────────────────────────────────────────────────────────────────
    let updated = Arc::new(Notify::new());
    let notify = updated.clone();
    engine.subscribe(
        Subscribe::new("user-updated").event("UPDATED"),
        handler_fn("print_update", move |id: u64| {
            let notify = notify.clone();
            async move {
                println!("   └─ 📬 subscriber saw update for user {}", id);
                notify.notify_one();
                Ok::<(), BoxError>(())
            }
        }),
    )?;
    let listeners = engine.start_subscribers().await?;
    println!("   State: {:?}, listening on {:?}", engine.state(), listeners.topics());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Read-through cache
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Read-through: first call misses, second hits");
    let read = Cacheable::new("user", "#id").ttl_secs(60);
    let inv = Invocation::new().arg("id", &42u64);

    for attempt in 1..=2 {
        let start = Instant::now();
        let user = engine.cacheable(&read, &inv, || load_user(42)).await?;
        println!("   └─ call {}: {:?} ({:?})", attempt, user, start.elapsed());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Grouped cache
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🗂️  Grouped cache: fields share one TTL");
    for id in [1u64, 2, 3] {
        let inv = Invocation::new().arg("id", &id);
        engine
            .hash_put(&HashPut::new("profiles", "#id").ttl_secs(30), &inv, || load_user(id))
            .await?;
    }
    let start = Instant::now();
    let cached = engine
        .hash_get(&HashGet::new("profiles", "#id"), &Invocation::new().arg("id", &2u64), || load_user(2))
        .await?;
    println!("   └─ field 2: {:?} ({:?})", cached, start.elapsed());

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Update: evict the cached entry and announce the change
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n✏️  Updating user 42");
    let announce = Publish::new("user-updated").event("UPDATED").payload("#id");
    engine
        .evict(&Evict::key("user", "#id"), &inv, || {
            engine.publish(&announce, &inv, || async {
                Ok::<_, std::io::Error>(Some(User { id: 42, name: "renamed".into() }))
            })
        })
        .await?;

    if tokio::time::timeout(Duration::from_secs(2), updated.notified()).await.is_err() {
        println!("   └─ ⚠️  no subscriber notification within 2s");
    }

    let start = Instant::now();
    let fresh = engine.cacheable(&read, &inv, || load_user(42)).await?;
    println!("   └─ after evict: {:?} ({:?}, recomputed)", fresh, start.elapsed());

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    listeners.shutdown();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = vec![];
    let mut gauges = vec![];
    let mut histograms = vec![];

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
        let name = format!("{}{}", key.name(), label_str);

        match value {
            DebugValue::Counter(v) => counters.push((name, v)),
            DebugValue::Gauge(v) => gauges.push((name, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, count, sum));
            }
        }
    }

    counters.sort();
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters");
        for (name, value) in &counters {
            println!("   │  └─ {} = {}", name, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges");
        for (name, value) in &gauges {
            println!("   │  └─ {} = {:.0}", name, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms");
        for (name, count, sum) in &histograms {
            let avg = if *count > 0 { sum / *count as f64 } else { 0.0 };
            println!("      └─ {} count={} avg={:.6}s", name, count, avg);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
