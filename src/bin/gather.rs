use anyhow::Result;
use clap::Parser;
use tcmrag::graph::{self, NeighborhoodExpander};
use tcmrag::knowledge::{Hop, DEFAULT_KEY};
use tcmrag::{parse_entities, Config, KnowledgeStore};

#[derive(Parser, Debug)]
#[command(name = "gather")]
#[command(about = "Expand entities through the knowledge graph and store the result")]
struct Args {
    /// Entities separated by '/', e.g. "肚子疼/四君子汤"
    entities: String,

    /// Store key to write the bundle under
    #[arg(short, long, default_value = DEFAULT_KEY)]
    key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let entities = parse_entities(&args.entities);
    if entities.is_empty() {
        anyhow::bail!("No entities given. Example: gather \"肚子疼/四君子汤\"");
    }

    let expander = NeighborhoodExpander::new(graph::connect(&config.graph).await?);
    let outcome = expander.collect(&entities).await;

    let store = KnowledgeStore::new(config.knowledge_dir());
    let path = store.write(&args.key, &outcome.bundle).await?;

    println!("\n=== Gathered knowledge ===");
    for (entity, neighborhood) in outcome.bundle.iter() {
        let per_hop: Vec<String> = [Hop::Seed, Hop::Synonym, Hop::Indication, Hop::Formula]
            .iter()
            .map(|hop| format!("{}", neighborhood.at_hop(*hop).count()))
            .collect();
        println!(
            "  {}: {} relationships (by hop: {}){}",
            entity,
            neighborhood.relationships.len(),
            per_hop.join("/"),
            if neighborhood.node_properties.is_some() { ", herb properties" } else { "" }
        );
    }
    for entity in &outcome.missing {
        println!("  {}: not found", entity);
    }
    for failure in &outcome.failures {
        println!("  {}: failed ({})", failure.entity, failure.error);
    }
    println!("\nStored {} entities in {}", outcome.bundle.len(), path.display());

    Ok(())
}
