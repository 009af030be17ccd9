//! Example: Near Cache for client-side caching.
//!
//! Configures a near cache for the "products" map, warms it up and prints
//! its statistics. Writes made through the map invalidate the cached copy,
//! and with `invalidate_on_change` enabled so do writes from other clients.
//!
//! Run with: `cargo run --example near_cache`
//!
//! Requires a cluster member listening on localhost:5701.

use std::time::{Duration, Instant};

use gridlink_client::{ClientConfigBuilder, EvictionPolicy, GridClient, NearCacheConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let near_cache_config = NearCacheConfig::builder("products")
        .max_size(1000)
        .eviction_policy(EvictionPolicy::Lru)
        .time_to_live(Duration::from_secs(60))
        .invalidate_on_change(true)
        .build()?;

    let config = ClientConfigBuilder::new()
        .cluster_name("dev")
        .add_address("127.0.0.1:5701".parse()?)
        .add_near_cache_config(near_cache_config)
        .build()?;

    let client = GridClient::new(config).await?;
    let map = client.get_map::<String, String>("products").await?;

    println!("Populating map with sample data...");
    for i in 0..100 {
        map.put(format!("product:{}", i), format!("Product {} Description", i))
            .await?;
    }

    println!("Warming up near cache...\n");
    for i in 0..100 {
        map.get(&format!("product:{}", i)).await?;
    }

    let iterations = 1000;
    println!("--- Cached Reads ---");
    let start = Instant::now();
    for _ in 0..iterations {
        for i in 0..10 {
            map.get(&format!("product:{}", i)).await?;
        }
    }
    let elapsed = start.elapsed();
    println!(
        "  {} reads in {:?} ({:.2} ops/sec)",
        iterations * 10,
        elapsed,
        (iterations * 10) as f64 / elapsed.as_secs_f64()
    );

    if let Some(stats) = map.near_cache_stats() {
        println!("\n--- Near Cache Statistics ---");
        println!("  Hits:          {}", stats.hits());
        println!("  Misses:        {}", stats.misses());
        println!("  Hit Ratio:     {:.1}%", stats.hit_ratio() * 100.0);
        println!("  Owned:         {} entries", stats.owned_entry_count());
        println!("  Evictions:     {}", stats.evictions());
        println!("  Expirations:   {}", stats.expirations());
        println!("  Invalidations: {}", stats.invalidations());
    }

    println!("\n--- Invalidation ---");
    map.put("product:0".to_string(), "UPDATED Product 0".to_string())
        .await?;
    let value = map.get(&"product:0".to_string()).await?;
    println!("After update, product:0 = {:?}", value);

    map.clear().await?;
    client.shutdown().await?;

    println!("\nDone!");
    Ok(())
}
