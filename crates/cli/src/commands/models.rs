//! `unillm models` — List configured providers and served models.

use unillm_config::AppConfig;
use unillm_gateway::ModelRegistry;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let providers = unillm_providers::build_from_config(&config)?;
    let registry = ModelRegistry::from_config(&config, &providers)?;

    println!("Providers (default: {})", providers.default_name());
    for name in providers.list() {
        println!("  - {name}");
    }

    println!("\nServed models");
    for name in registry.names() {
        println!("  - {name}");
    }

    println!("\nEnvironment variables:");
    println!("  UNILLM_API_KEY, OPENAI_API_KEY, UNILLM_PROVIDER, UNILLM_MODEL");

    Ok(())
}
