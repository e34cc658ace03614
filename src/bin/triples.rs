use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tcmrag::knowledge::{to_triples, write_triples_tsv, DEFAULT_KEY};
use tcmrag::{Config, KnowledgeStore};

#[derive(Parser, Debug)]
#[command(name = "triples")]
#[command(about = "Export a stored knowledge bundle as subject/predicate/object triples")]
struct Args {
    /// Store key to read
    #[arg(short, long, default_value = DEFAULT_KEY)]
    key: String,

    /// Output TSV file
    #[arg(short, long, default_value = "query_results_triples.txt")]
    output: PathBuf,

    /// Number of triples to echo to stdout
    #[arg(long, default_value_t = 20)]
    preview: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;
    let store = KnowledgeStore::new(config.knowledge_dir());

    let bundle = store.read(&args.key).await?.ok_or_else(|| {
        anyhow::anyhow!(
            "Nothing stored under key {:?} in {}. Run gather first.",
            args.key,
            store.dir().display()
        )
    })?;

    let triples = to_triples(&bundle);
    write_triples_tsv(&args.output, &triples)?;
    println!("Wrote {} triples to {}", triples.len(), args.output.display());

    let shown = args.preview.min(triples.len());
    if shown > 0 {
        println!("\nFirst {} triples:", shown);
        for (i, t) in triples.iter().take(shown).enumerate() {
            println!("{}. {} -- {} --> {}", i + 1, t.subject, t.predicate, t.object);
        }
    }

    Ok(())
}
