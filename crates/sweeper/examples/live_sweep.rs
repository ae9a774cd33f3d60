//! Sweep every open page tab of a running Chrome
//!
//! ```text
//! chrome --remote-debugging-port=9222
//! cargo run --example live_sweep -- [config.json]
//! ```
//!
//! `cdp_url` in the config must be the browser's `webSocketDebuggerUrl`
//! (see `http://localhost:9222/json/version`).

use std::sync::Arc;
use sweeper::{CdpBinding, CdpClient, SweeperConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => SweeperConfig::from_file(path)?,
        None => SweeperConfig::default(),
    };

    println!("Connecting to Chrome at: {}", config.cdp_url);
    let client = CdpClient::connect(&config.cdp_url).await?;

    for target in client.get_targets().await? {
        if !target.is_page() {
            continue;
        }

        let client = Arc::clone(&client);
        let config = config.clone();
        tokio::spawn(async move {
            match CdpBinding::attach(client, &target, config).await {
                Ok(binding) => {
                    let _ = binding.run().await;
                }
                Err(e) => eprintln!("Failed to attach to {}: {}", target.url, e),
            }
        });
    }

    println!("Sweeping, press Ctrl-C to stop");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = client.closed() => println!("Browser went away"),
    }

    if !client.is_closed() {
        client.close().await?;
    }
    println!("Disconnected");

    Ok(())
}
