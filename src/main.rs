use agentic_rag::config::Settings;
use agentic_rag::error::RagError;
use agentic_rag::server;
use agentic_rag::workflow::{RunEvent, Termination, WorkflowManager};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a single question
    Ask {
        /// The question to answer
        #[arg(short, long)]
        question: String,

        /// Text files to load into the document store first
        #[arg(short, long)]
        doc: Vec<PathBuf>,
    },
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides settings)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;
    let manager = WorkflowManager::from_settings(&settings)?;

    match args.command {
        Commands::Ask { question, doc } => {
            for path in doc {
                let text = tokio::fs::read_to_string(&path).await?;
                let source = path.to_string_lossy();
                let chunks = manager.ingest_text(&source, &text).await?;
                println!("Loaded {} chunks from {}", chunks, source);
            }

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted; stopping after the current node");
                    on_interrupt.cancel();
                }
            });

            println!("Question: {}", question);
            let mut events = Box::pin(manager.stream(question, cancel));
            while let Some(event) = events.next().await {
                match event {
                    Ok(RunEvent::Step { node, .. }) => println!("Finished node: {}", node),
                    Ok(RunEvent::Finished(outcome)) => {
                        if outcome.termination == Termination::BudgetExhausted {
                            println!("Loop budget exhausted; returning best available answer");
                        }
                        println!(
                            "Answer: {}",
                            outcome.state.generation().unwrap_or_default()
                        );
                    }
                    Err(RagError::Cancelled { visits }) => {
                        println!("Run cancelled after {} nodes", visits);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(settings.server.port);
            server::serve(Arc::new(manager), port).await?;
        }
    }

    Ok(())
}
