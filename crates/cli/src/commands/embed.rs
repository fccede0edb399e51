//! `unillm embed` — Embed one or more texts with the configured model.

use unillm_agent::EmbeddingsGenerator;
use unillm_config::AppConfig;

pub async fn run(
    inputs: Vec<String>,
    input_type: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let providers = unillm_providers::build_from_config(&config)?;
    let provider = providers.get_or_default(Some(&config.embeddings.provider))?;

    let mut generator = EmbeddingsGenerator::new(provider, config.embeddings.model.clone())
        .from_inputs(inputs.iter().cloned());
    if let Some(input_type) = input_type {
        generator = generator.with_provider_option("inputType", input_type);
    }

    let response = generator.generate().await?;
    for (input, vector) in inputs.iter().zip(&response.embeddings) {
        let preview: Vec<String> = vector.iter().take(4).map(|v| format!("{v:.4}")).collect();
        println!("{input:?}  [{} dims] {} ...", vector.len(), preview.join(", "));
    }
    println!("\n  model: {}  tokens: {}", response.meta.model, response.usage.tokens);

    Ok(())
}
