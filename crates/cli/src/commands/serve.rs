//! `unillm serve` — Start the OpenAI-compatible HTTP server.

use unillm_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let port = port_override.unwrap_or(config.server.port);

    println!("UniLLM Server");
    println!("   Listening: {}:{}", config.server.host, port);
    println!("   Endpoint:  POST /openai/v1/chat/completions");

    unillm_gateway::start(config, port_override).await?;

    Ok(())
}
