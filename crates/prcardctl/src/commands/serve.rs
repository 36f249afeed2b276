//! Serve command - starts the webhook relay server

use std::net::SocketAddr;

use prcard_triggers::{RelayServer, RelayServerConfig};

use super::build_relay;
use crate::config::{mask_secret, Settings};

/// Execute the serve command
pub async fn execute(settings: Settings, port: Option<u16>, host: Option<&str>) -> anyhow::Result<()> {
    if let Some(source) = &settings.source {
        println!("Loading configuration from: {}", source.display());
    }

    // Apply CLI overrides
    let server_port = port.unwrap_or(settings.server.port);
    let server_host = host.unwrap_or(&settings.server.host);

    let bind_addr: SocketAddr = format!("{}:{}", server_host, server_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    let relay = build_relay(&settings).await?;

    println!("Starting prcard relay server");
    println!("  Bind address: {}", bind_addr);
    println!("  Chat: {}", settings.feishu.chat_id);
    println!(
        "  Webhook secret: {}",
        mask_secret(settings.github.webhook_secret.as_deref())
    );
    println!("  Message map: {}", settings.message_map_path.display());
    if settings.github.webhook_secret.is_none() {
        eprintln!("Warning: no webhook secret configured, deliveries will not be verified.");
    }

    let server = RelayServer::with_config(
        relay,
        RelayServerConfig {
            bind_addr,
            max_body_size: settings.server.max_body_bytes,
        },
    );

    // Handle graceful shutdown
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        println!("\nShutdown signal received, stopping server...");
    };

    server
        .serve(shutdown_signal)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    println!("Server stopped gracefully");
    Ok(())
}
