//! `safeq chat`: Interactive session.
//!
//! The session owns the conversation history; each question sees only the
//! last `history_window` exchanges. Ctrl+C cancels the question in flight.

use super::ask::print_result;
use safeq_core::exchange::{ConversationHistory, Exchange, SnippetLimits};
use safeq_retrieval::{CancelToken, RetrievalResult};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// One-line summary stored as the assistant's side of an exchange.
fn summarize(result: &RetrievalResult) -> String {
    match (&result.error, &result.explanation) {
        (Some(error), _) => format!("Failed: {error}"),
        (None, Some(explanation)) => format!("{explanation} ({} rows)", result.row_count),
        (None, None) => format!("{} rows", result.row_count),
    }
}

/// The exchange remembered for `question`. Only executed SQL is kept, so
/// a refused statement never reaches a later prompt.
fn exchange_for(question: &str, result: &RetrievalResult, limits: SnippetLimits) -> Exchange {
    let sql = result.sql_raw.clone().filter(|_| result.success);
    Exchange::new(question, sql, &result.context, &summarize(result), limits)
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (config, retriever) = super::build_retriever().await?;
    let limits = SnippetLimits {
        result_chars: config.retrieval.result_snippet_chars,
        response_chars: config.retrieval.response_snippet_chars,
    };
    let window = config.retrieval.history_window;

    println!();
    println!("  safeq: interactive mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Database:  {}", config.store.path);
    println!();
    println!("  Ask about events, risks, corrective measures or people.");
    println!("  Type '/reset' to forget the conversation, 'exit' to quit.");
    println!();

    let mut history = ConversationHistory::with_capacity(config.retrieval.history_capacity);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        match question {
            "" => {
                prompt()?;
                continue;
            }
            "exit" | "quit" => break,
            "/reset" => {
                history.clear();
                println!("  (conversation cleared)");
                prompt()?;
                continue;
            }
            _ => {}
        }

        let recent = history.recent(window);
        let cancel = CancelToken::new();
        let retrieval = retriever.retrieve_with_cancel(question, &recent, &cancel);
        tokio::pin!(retrieval);

        eprint!("  ...");
        let result = tokio::select! {
            result = &mut retrieval => result,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                retrieval.await
            }
        };
        eprint!("\r     \r");

        print_result(&result);
        println!();

        history.push(exchange_for(question, &result, limits));

        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}
