use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lats_engine::{
    config::{Config, LogFormat, RunMode},
    Agent,
};

/// Run one tree-search investigation.
#[derive(Debug, Parser)]
#[command(name = "lats-engine", version, about)]
struct Args {
    /// The question to investigate
    question: String,

    /// Additional context appended to the question
    #[arg(long)]
    context: Option<String>,

    /// Ask the operator to approve answers and tool failures
    #[arg(long)]
    interactive: bool,

    /// Write the final session snapshot to this file
    #[arg(long)]
    backup: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if args.interactive {
        config.search.run_mode = RunMode::Interactive;
    }

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.oracle.model,
        run_mode = ?config.search.run_mode,
        "LATS engine starting..."
    );

    let agent = match Agent::from_config(&config).await {
        Ok(agent) => agent,
        Err(e) => {
            error!(error = %e, "Failed to initialize agent");
            return Err(e.into());
        }
    };

    let (session, result) = match agent
        .run_session(&args.question, args.context.as_deref())
        .await
    {
        Ok(done) => done,
        Err(e) => {
            error!(error = %e, "Investigation failed");
            return Err(e.into());
        }
    };

    if let Some(path) = &args.backup {
        session.write_backup(path)?;
    }

    match result.answer_text() {
        Some(answer) => println!("{answer}"),
        None => println!("No final answer (best node: {:?})", result.answer),
    }
    info!(
        session_id = %result.session_id,
        success = result.success,
        reward = result.reward,
        "Done"
    );
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
