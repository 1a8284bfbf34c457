//! `steward onboard`: write a starter config.

use std::path::Path;
use steward_config::AppConfig;

use super::{CmdResult, config_path};

pub async fn run(config: Option<&Path>) -> CmdResult {
    let config_path = config_path(config);

    println!("Steward: First-Time Setup");
    println!("=========================\n");

    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        println!("✅ Created config directory: {}", dir.display());
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set PINECONE_API_KEY or add api_key to {}", config_path.display());
    println!("   2. Declare your assistant and [[data_files]]");
    println!("   3. Run: steward sync\n");

    Ok(())
}
