//! Basic usage example demonstrating map operations and client events.
//!
//! Run with: `cargo run --example basic_usage`
//!
//! Requires a cluster member listening on localhost:5701.

use std::time::Duration;

use gridlink_client::{ClientConfigBuilder, GridClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== gridlink Basic Usage Example ===\n");

    let config = ClientConfigBuilder::new()
        .cluster_name("dev")
        .add_address("127.0.0.1:5701".parse()?)
        .connection_timeout(Duration::from_secs(10))
        .invocation_timeout(Duration::from_secs(30))
        .build()?;

    println!("Connecting to cluster...");
    let client = GridClient::new(config).await?;
    let mut lifecycle = client.subscribe_lifecycle();
    println!(
        "Connected to cluster '{}' with {} connection(s)",
        client.cluster_name(),
        client.connection_count()
    );
    for member in client.members() {
        println!("  member {}", member);
    }
    println!();

    println!("--- Map Operations ---\n");
    let map = client.get_map::<String, String>("example-map").await?;

    println!("Putting entries into map...");
    map.put("key1".to_string(), "value1".to_string()).await?;
    map.put("key2".to_string(), "value2".to_string()).await?;
    map.set("key3".to_string(), "value3".to_string()).await?;

    println!("Map size: {}", map.size().await?);

    println!("\nRetrieving entries:");
    for key in ["key1", "key2", "key3", "nonexistent"] {
        match map.get(&key.to_string()).await? {
            Some(v) => println!("  {} -> {}", key, v),
            None => println!("  {} -> (not found)", key),
        }
    }

    let keys = ["key1".to_string(), "key3".to_string()];
    println!("\nget_all {:?}: {:?}", keys, map.get_all(&keys).await?);

    let previous = map
        .put_if_absent("key1".to_string(), "other".to_string())
        .await?;
    println!("\nput_if_absent on key1 kept {:?}", previous);

    let removed = map.remove(&"key2".to_string()).await?;
    println!("Removed key2: {:?}", removed);
    println!("Contains key2: {}", map.contains_key(&"key2".to_string()).await?);

    map.clear().await?;
    println!("Map size after clear: {}", map.size().await?);

    client.shutdown().await?;
    while let Ok(event) = lifecycle.try_recv() {
        println!("lifecycle: {}", event);
    }
    println!("\nClient shut down.");
    Ok(())
}
