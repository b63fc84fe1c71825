//! `markwright serve`: start the queue and its HTTP status gateway.

use markwright_config::AppConfig;
use markwright_gateway::GatewayState;
use tracing::info;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let state = GatewayState::shared(&config.queue);
    info!(
        max_concurrent = config.queue.max_concurrent,
        max_pending = ?config.queue.max_pending,
        max_rounds = config.reasoning.max_rounds,
        "Queue ready"
    );

    println!("markwright gateway");
    println!("   Listening:      {}:{}", config.gateway.host, config.gateway.port);
    println!("   Max concurrent: {}", config.queue.max_concurrent);
    println!(
        "   Status stream:  http://{}:{}/v1/queue/events",
        config.gateway.host, config.gateway.port
    );

    markwright_gateway::start(&config.gateway, state).await?;

    Ok(())
}
