use anyhow::Result;
use clap::Parser;
use tcmrag::knowledge::{GraphView, DEFAULT_KEY};
use tcmrag::{Config, KnowledgeStore};

#[derive(Parser, Debug)]
#[command(name = "graph_view")]
#[command(about = "Print a stored knowledge bundle as node/link JSON for visualisation")]
struct Args {
    /// Store key to read
    #[arg(short, long, default_value = DEFAULT_KEY)]
    key: String,

    /// Single-line output
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "warn")).init();

    let args = Args::parse();
    let config = Config::load()?;
    let store = KnowledgeStore::new(config.knowledge_dir());

    // nothing stored renders as an empty graph
    let bundle = store.read(&args.key).await?.unwrap_or_default();
    let view = GraphView::from_bundle(&bundle);
    log::info!("{} nodes, {} links", view.nodes.len(), view.links.len());

    let json = if args.compact {
        serde_json::to_string(&view)?
    } else {
        serde_json::to_string_pretty(&view)?
    };
    println!("{}", json);

    Ok(())
}
