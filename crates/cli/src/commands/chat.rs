//! `unillm chat` — Interactive or single-message chat mode.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use unillm_agent::{TextGenerator, TextResponse};
use unillm_config::AppConfig;
use unillm_core::message::Message;

pub struct ChatOptions {
    pub message: Option<String>,
    pub system: Option<String>,
    pub max_steps: Option<u32>,
    pub verbose: bool,
}

pub async fn run(options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early so the error is clear
    if config.api_key.is_none() && config.providers.values().all(|p| p.api_key.is_none()) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    UNILLM_API_KEY = 'sk-...'   (generic)");
        eprintln!("    OPENAI_API_KEY = 'sk-...'   (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = unillm_providers::build_from_config(&config)?;
    let provider = router.get_or_default(None)?;

    let mut generator = TextGenerator::new(provider, config.default_model.clone())
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_max_steps(options.max_steps.unwrap_or(config.default_max_steps));
    if let Some(system) = &options.system {
        generator = generator.with_system_prompt(system.clone());
    }
    debug!(provider = generator.provider_name(), model = generator.model(), "Chat session configured");

    if let Some(msg) = options.message {
        let response = generator
            .with_messages(vec![Message::user(msg)])
            .run()
            .await?;
        println!("{}", response.text);
        if options.verbose {
            print_summary(&response);
        }
        return Ok(());
    }

    println!();
    println!("  UniLLM — Interactive Mode");
    println!();
    println!("  Provider:  {}", generator.provider_name());
    println!("  Model:     {}", generator.model());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }
        if line.is_empty() {
            prompt()?;
            continue;
        }

        let mut transcript = history.clone();
        transcript.push(Message::user(line));

        match generator.clone().with_messages(transcript).run().await {
            Ok(response) => {
                println!();
                for text_line in response.text.lines() {
                    println!("  Assistant > {text_line}");
                }
                if options.verbose {
                    print_summary(&response);
                }
                println!();
                history = response.messages;
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }

        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    use std::io::Write;
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_summary(response: &TextResponse) {
    for (i, step) in response.steps.iter().enumerate() {
        let tools: Vec<&str> = step.tool_calls.iter().map(|c| c.name.as_str()).collect();
        eprintln!(
            "  [step {}] finish={} tokens={} tools=[{}]",
            i + 1,
            step.finish_reason,
            step.usage.total_tokens(),
            tools.join(", ")
        );
    }
    eprintln!(
        "  [total] steps={} prompt_tokens={} completion_tokens={}",
        response.steps.len(),
        response.usage.prompt_tokens,
        response.usage.completion_tokens
    );
}
