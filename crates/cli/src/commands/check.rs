//! `safeq check`: Run the safety gate on a statement without executing it.

use safeq_config::AppConfig;
use safeq_retrieval::pretty_print;

pub fn run(sql: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let guard = super::guard_from_config(&config);

    println!();
    for line in pretty_print(sql).lines() {
        println!("  {line}");
    }
    println!();

    match guard.check(sql) {
        Ok(()) => {
            println!("  ✅ Allowed: read-only statement");
            Ok(())
        }
        Err(violation) => {
            println!("  ❌ Rejected: {violation}");
            Err(format!("statement rejected: {violation}").into())
        }
    }
}
