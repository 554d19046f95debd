pub mod ask;
pub mod chat;
pub mod check;
pub mod init;
pub mod schema;

use safeq_config::AppConfig;
use safeq_providers::{build_from_config, resolve_model};
use safeq_retrieval::{
    HeuristicClassifier, MemoryCompressor, QueryGenerator, RetrievalSettings, Retriever,
};
use safeq_security::{AuditLogger, SqlGuard, TracingSink};
use safeq_store::SqliteStore;
use std::sync::Arc;

/// Providers that run locally and need no key.
const KEYLESS_PROVIDERS: &[&str] = &["ollama", "vllm", "llamacpp", "llama.cpp"];

fn print_missing_key_help() {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    SAFEQ_API_KEY       = 'sk-...'         (generic)");
    eprintln!("    OPENROUTER_API_KEY  = 'sk-or-v1-...'   (recommended)");
    eprintln!("    OPENAI_API_KEY      = 'sk-...'         (for OpenAI direct)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
}

/// The safety gate with the configured extra keywords.
pub fn guard_from_config(config: &AppConfig) -> SqlGuard {
    SqlGuard::default().with_extra_keywords(&config.retrieval.extra_forbidden_keywords)
}

/// Load config and wire provider, store and audit into a retriever.
pub async fn build_retriever() -> Result<(AppConfig, Retriever), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let provider_has_key = config
        .providers
        .get(&config.default_provider)
        .is_some_and(|p| p.api_key.is_some());
    if !config.has_api_key()
        && !provider_has_key
        && !KEYLESS_PROVIDERS.contains(&config.default_provider.as_str())
    {
        print_missing_key_help();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = build_from_config(&config);
    tracing::debug!(providers = ?router.list(), "Providers registered");
    let provider = router
        .default_provider()
        .ok_or("No default provider configured")?;

    let store = SqliteStore::open(
        &config.store.path,
        config.store.read_only,
        config.store.max_connections,
    )
    .await
    .map_err(|e| format!("{e}. Run `safeq init` to create the database."))?;

    let generator = QueryGenerator::new(provider, resolve_model(&config))
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens);

    let compressor = MemoryCompressor::new(
        Arc::new(HeuristicClassifier),
        config.retrieval.compression_threshold,
    );

    let audit = Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)]));

    tracing::debug!(
        provider = %config.default_provider,
        model = %generator.model(),
        db = %config.store.path,
        "Retriever configured"
    );

    let retriever = Retriever::new(generator, Arc::new(store))
        .with_compressor(compressor)
        .with_settings(RetrievalSettings::from(&config.retrieval))
        .with_guard(guard_from_config(&config))
        .with_audit(audit);

    Ok((config, retriever))
}
