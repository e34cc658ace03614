use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tcmrag::context::compose_question;
use tcmrag::graph;
use tcmrag::knowledge::DEFAULT_KEY;
use tcmrag::llm::Turn;
use tcmrag::{AnswerEvent, Config, Pipeline};
use tokio_stream::StreamExt;

#[derive(Parser, Debug)]
#[command(name = "tcmrag")]
#[command(about = "Answer Traditional Chinese Medicine questions from a knowledge graph")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a question, streaming the reply to stdout
    Ask {
        /// The question as the user asked it
        question: String,

        /// Entities extracted from the question, separated by '/'.
        /// Without it the last stored knowledge is reused.
        #[arg(short, long)]
        entities: Option<String>,

        /// JSON file with earlier turns of the conversation ([{"role","content"}])
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Validate configuration and graph connectivity (default)
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.tcmrag.log_level.as_str()),
    )
    .init();

    match args.command.unwrap_or(Command::Check) {
        Command::Ask {
            question,
            entities,
            history,
        } => {
            let question = match history {
                Some(path) => compose_question(&load_history(&path)?, &question),
                None => question,
            };
            ask(&config, question, entities).await?
        }
        Command::Check => check(&config).await?,
    }

    Ok(())
}

fn load_history(path: &Path) -> Result<Vec<Turn>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read history {}: {}", path.display(), e))?;
    let turns: Vec<Turn> = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("Failed to parse history {}: {}", path.display(), e))?;
    Ok(turns)
}

async fn ask(config: &Config, question: String, entities: Option<String>) -> Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(config).await?);

    let Some(entities) = entities else {
        log::info!("No entities given, answering from stored knowledge");
        let answer = pipeline
            .answer_from_store(&question, DEFAULT_KEY)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("{}", answer);
        return Ok(());
    };

    let mut events = pipeline.answer_stream(question, entities);

    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            AnswerEvent::Delta(text) => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            AnswerEvent::Finished => {
                writeln!(stdout)?;
            }
            AnswerEvent::Error(message) => {
                writeln!(stdout)?;
                anyhow::bail!(message);
            }
        }
    }
    Ok(())
}

async fn check(config: &Config) -> Result<()> {
    log::info!("Configuration loaded successfully");
    log::info!("Knowledge store: {}", config.knowledge_dir().display());
    log::info!("Model endpoint: {} ({})", config.llm.api_base, config.llm.model);

    let graph = graph::connect(&config.graph).await?;
    // any cheap query proves the store answers
    let reachable = graph.node_matches("汤").await?;
    log::info!("Graph store reachable (formula-like nodes present: {})", reachable);

    println!("Configuration valid, graph store reachable.");
    Ok(())
}
