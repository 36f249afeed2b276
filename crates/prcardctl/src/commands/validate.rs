//! Validate command - checks configuration and prints it with secrets masked

use crate::config::{mask_secret, Settings};

pub fn execute(settings: &Settings) -> anyhow::Result<()> {
    match &settings.source {
        Some(path) => println!("Configuration: {}", path.display()),
        None => println!("Configuration: defaults + environment"),
    }
    if let Some(name) = &settings.name {
        println!("  Name: {}", name);
    }

    println!("Server");
    println!("  Bind: {}:{}", settings.server.host, settings.server.port);
    println!("  Outbound timeout: {}s", settings.server.timeout_secs);
    println!("  Max body: {} bytes", settings.server.max_body_bytes);

    println!("GitHub");
    println!("  API: {}", settings.github.api_url);
    println!("  Webhook secret: {}", mask_secret(settings.github.webhook_secret.as_deref()));
    println!("  Token: {}", mask_secret(settings.github.token.as_deref()));

    println!("Feishu");
    println!("  API: {}", settings.feishu.api_url);
    println!("  App ID: {}", non_empty(&settings.feishu.app_id));
    println!("  App secret: {}", mask_secret(Some(&settings.feishu.app_secret)));
    println!("  Chat ID: {}", non_empty(&settings.feishu.chat_id));
    println!("  Token buffer: {}s", settings.token_buffer_secs);

    println!("State");
    println!("  Token file: {}", settings.token_path.display());
    println!("  Message map: {} (max {})", settings.message_map_path.display(), settings.max_mappings);

    settings.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn non_empty(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}
