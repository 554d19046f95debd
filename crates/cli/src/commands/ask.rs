//! `safeq ask`: Answer a single question.

use safeq_retrieval::RetrievalResult;

pub async fn run(question: String, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (_, retriever) = super::build_retriever().await?;

    eprint!("  Thinking...");
    let result = retriever.retrieve(&question, &[]).await;
    eprint!("\r              \r");

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(())
}

/// Human-readable rendering shared with `chat`.
pub fn print_result(result: &RetrievalResult) {
    if let Some(sql) = &result.sql_used {
        println!();
        for line in sql.lines() {
            println!("  SQL > {line}");
        }
    }
    if let Some(explanation) = &result.explanation {
        println!("  ({explanation})");
    }
    println!();
    println!("{}", result.context);

    if let Some(error) = &result.error {
        eprintln!();
        eprintln!("  [{} attempt(s)] {error}", result.attempts);
    }
}
