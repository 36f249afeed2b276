//! Test-card command - posts the connectivity test card once

use prcard_core::build_test_card;

use super::build_relay;
use crate::config::Settings;

pub async fn execute(settings: &Settings) -> anyhow::Result<()> {
    let relay = build_relay(settings).await?;

    let sent_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let health_url = format!("http://localhost:{}/health", settings.server.port);
    let card = build_test_card(&sent_at, settings.server.port, &health_url);

    let message_id = relay.send_card(&card).await?;
    println!("Test card sent to {}: {}", settings.feishu.chat_id, message_id);
    Ok(())
}
