//! `safeq init`: Write the default config and create the database.

use safeq_config::AppConfig;
use safeq_store::{SqliteStore, bootstrap};
use std::path::Path;

pub async fn run(demo: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("safeq setup");
    println!("===========\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("  Config already exists at: {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(parent) = Path::new(&config.store.path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Schema creation needs a writable connection; retrievals never get one.
    let store = SqliteStore::open(&config.store.path, false, 1).await?;
    bootstrap::create_schema(store.pool()).await?;
    println!("✅ Database ready at: {}", config.store.path);

    if demo {
        bootstrap::seed_demo(store.pool()).await?;
        println!("✅ Demo data loaded");
    }

    println!("\n📝 Next steps:");
    println!("   1. Set SAFEQ_API_KEY (or add api_key to {})", config_path.display());
    println!("   2. Run: safeq ask \"Quels sont les événements récents?\"");
    println!("   3. Or start a session: safeq chat\n");

    Ok(())
}
