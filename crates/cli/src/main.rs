//! safeq CLI entry point.
//!
//! Commands:
//! - `ask`     Answer a single question
//! - `chat`    Interactive session with conversation memory
//! - `schema`  Print the schema description given to the model
//! - `check`   Run the safety gate on a statement
//! - `init`    Write the default config and create the database

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "safeq",
    about = "safeq: ask questions about safety events in plain language",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        /// The question, in French or English
        question: String,

        /// Print the full retrieval result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive session
    Chat,

    /// Print the schema description
    Schema,

    /// Check whether a statement would be allowed to run
    Check {
        /// The SQL statement to check
        sql: String,
    },

    /// Initialize configuration and database
    Init {
        /// Load the demo data set
        #[arg(long)]
        demo: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask { question, json } => commands::ask::run(question, json).await?,
        Commands::Chat => commands::chat::run().await?,
        Commands::Schema => commands::schema::run(),
        Commands::Check { sql } => commands::check::run(&sql)?,
        Commands::Init { demo } => commands::init::run(demo).await?,
    }

    Ok(())
}
