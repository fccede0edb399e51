//! `unillm init` — write a default config file.

use std::path::{Path, PathBuf};

use unillm_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();

    println!("UniLLM — First-Time Setup");
    println!("=========================\n");

    match write_default_config(&config_dir)? {
        Some(path) => {
            println!("✅ Created config.toml at: {}", path.display());
            println!("\n📝 Next steps:");
            println!("   1. Edit {} and add your API key", path.display());
            println!("   2. Run: unillm chat");
        }
        None => {
            let path = config_dir.join("config.toml");
            println!("⚠️  Config already exists at: {}", path.display());
            println!("   Edit it manually or delete and re-run init.");
        }
    }

    Ok(())
}

/// Create `dir/config.toml` with defaults. Returns `None` if it already exists.
pub fn write_default_config(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("config.toml");
    if path.exists() {
        return Ok(None);
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_loadable_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join(".unillm");

        let path = write_default_config(&nested).unwrap().unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_provider, "openai");

        std::fs::write(&path, "default_model = \"edited\"\n").unwrap();
        assert!(write_default_config(&nested).unwrap().is_none());
        assert_eq!(
            AppConfig::load_from(&path).unwrap().default_model,
            "edited"
        );
    }
}
