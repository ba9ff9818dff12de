use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pantry_allocation::{reasoner_from_env, AllocationRefiner};
use pantry_embedding_store::{embedder_from_env, EmbeddingStore, MemoryBackend, VectorBackend};
use pantry_matching::{MatchEngine, MatchParams, MatchStrength, MemoryOfferDirectory};
use pantry_protocol::DonorOfferId;
use std::path::PathBuf;
use std::sync::Arc;

mod catalog;

use catalog::Catalog;

#[derive(Parser)]
#[command(name = "pantry")]
#[command(about = "Semantic matching and fair allocation for donated goods", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed catalog items and wish-list rows into the vector store
    Index(IndexArgs),

    /// Find catalog items matching a free-text query
    Match(MatchArgs),

    /// Print allocation suggestions for the catalog's partner requests
    Suggest(SuggestArgs),
}

#[derive(Args)]
struct IndexArgs {
    /// Catalog TOML file
    #[arg(long)]
    catalog: PathBuf,

    /// Vector store JSON file
    #[arg(long, default_value = "pantry-store.json")]
    store: PathBuf,
}

#[derive(Args)]
struct MatchArgs {
    /// Free-text item description to match
    query: String,

    /// Catalog TOML file (supplies donor offer states)
    #[arg(long)]
    catalog: PathBuf,

    /// Vector store JSON file
    #[arg(long, default_value = "pantry-store.json")]
    store: PathBuf,

    /// Number of matches to return
    #[arg(short, long, default_value_t = 5)]
    k: usize,

    /// Maximum cosine distance for any match
    #[arg(long, default_value_t = pantry_matching::DEFAULT_DISTANCE_CUTOFF)]
    distance_cutoff: f32,

    /// Cosine distance at or below which a match is tagged hard
    #[arg(long, default_value_t = pantry_matching::DEFAULT_HARD_CUTOFF)]
    hard_cutoff: f32,

    /// Restrict matches to one donor offer
    #[arg(long)]
    offer: Option<i64>,
}

#[derive(Args)]
struct SuggestArgs {
    /// Catalog TOML file
    #[arg(long)]
    catalog: PathBuf,

    /// Show baseline and refined shares side by side
    #[arg(long)]
    detailed: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Index(args) => cmd_index(args).await,
        Commands::Match(args) => cmd_match(args).await,
        Commands::Suggest(args) => cmd_suggest(args).await,
    }
}

async fn cmd_index(args: IndexArgs) -> Result<()> {
    let catalog = Catalog::load(&args.catalog)?;
    let embedder = embedder_from_env().context("embedding service not configured")?;
    let backend = if args.store.exists() {
        Arc::new(MemoryBackend::load(&args.store).await?)
    } else {
        Arc::new(MemoryBackend::new())
    };
    let store = EmbeddingStore::new(embedder, backend.clone() as Arc<dyn VectorBackend>);

    let outcome = store.add(&catalog.embed_items()).await?;
    backend.save(&args.store).await?;
    println!(
        "indexed {} embeddings ({} blank titles skipped) into {}",
        outcome.indexed,
        outcome.skipped,
        args.store.display()
    );
    Ok(())
}

async fn cmd_match(args: MatchArgs) -> Result<()> {
    let catalog = Catalog::load(&args.catalog)?;
    let embedder = embedder_from_env().context("embedding service not configured")?;
    let backend = Arc::new(
        MemoryBackend::load(&args.store)
            .await
            .with_context(|| format!("failed to load store {}", args.store.display()))?,
    );
    let directory = Arc::new(MemoryOfferDirectory::new());
    for offer in catalog.offer_records() {
        directory.insert(offer);
    }
    let engine = MatchEngine::new(embedder, backend, directory);

    let mut params = MatchParams::new(args.k);
    params.distance_cutoff = args.distance_cutoff;
    params.hard_cutoff = args.hard_cutoff;
    if let Some(offer) = args.offer {
        params.filter.donor_offers = Some(vec![DonorOfferId(offer)]);
    }

    let matches = engine.matches_for(&args.query, &params).await?;
    if matches.is_empty() {
        println!("no matches for '{}'", args.query);
        return Ok(());
    }
    for result in matches {
        let strength = match result.strength {
            MatchStrength::Hard => "hard",
            MatchStrength::Soft => "soft",
        };
        println!(
            "item {:<6} {:<40} distance={:.3} similarity={:.3} [{strength}]",
            result.general_item.0, result.title, result.distance, result.similarity
        );
    }
    Ok(())
}

async fn cmd_suggest(args: SuggestArgs) -> Result<()> {
    let catalog = Catalog::load(&args.catalog)?;
    let items = catalog.allocation_items();
    if items.is_empty() {
        println!("catalog has no partner requests");
        return Ok(());
    }
    let refiner = AllocationRefiner::new(reasoner_from_env());

    if args.detailed {
        for diff in refiner.suggest_detailed(&items).await? {
            println!("item {}", diff.general_item.0);
            for (before, after) in diff.before.iter().zip(&diff.after) {
                println!(
                    "  partner {:<6} baseline={:<4} suggested={}",
                    before.partner.0, before.quantity, after.quantity
                );
            }
        }
    } else {
        for allocation in refiner.suggest(&items).await? {
            println!("item {}", allocation.general_item.0);
            for share in &allocation.shares {
                println!("  partner {:<6} quantity={}", share.partner.0, share.quantity);
            }
        }
    }
    Ok(())
}
