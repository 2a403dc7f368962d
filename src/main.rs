use clap::{Args, Parser, Subcommand};
use shopwise::ingest::{ingest, IngestOptions};
use shopwise::{
    AppState, HashingInference, IndexStore, InferenceCapability, PipelineConfig, PipelineOrchestrator,
    RemoteInference, RestApi, SimilarityIndex,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// A streaming shopping recommendation server
#[derive(Parser, Debug)]
#[command(name = "shopwise")]
#[command(about = "A streaming shopping recommendation server", long_about = None)]
struct Cli {
    /// Log level, used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info", env = "SHOPWISE_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the recommendation API
    Serve(ServeArgs),
    /// Build the index files from a corpus dump
    Ingest(IngestArgs),
}

#[derive(Args, Debug)]
struct IndexPaths {
    /// Binary vector file
    #[arg(long, default_value = "./data/products.vec", env = "SHOPWISE_VECTORS")]
    vectors: PathBuf,

    /// JSON metadata file
    #[arg(long, default_value = "./data/products.json", env = "SHOPWISE_METADATA")]
    metadata: PathBuf,
}

#[derive(Args, Debug)]
struct InferenceArgs {
    /// Base URL of a model server; the local hashing embedder is used when absent
    #[arg(long, env = "SHOPWISE_INFERENCE_URL")]
    inference_url: Option<String>,

    /// Embedding dimension
    #[arg(long, default_value_t = 512, env = "SHOPWISE_EMBEDDING_DIM")]
    embedding_dim: usize,

    /// Timeout for a single inference HTTP call
    #[arg(long, default_value_t = 60, env = "SHOPWISE_INFERENCE_TIMEOUT_SECS")]
    inference_timeout_secs: u64,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    index: IndexPaths,

    #[command(flatten)]
    inference: InferenceArgs,

    /// HTTP API port
    #[arg(long, default_value_t = 8000, env = "SHOPWISE_HTTP_PORT")]
    http_port: u16,

    /// Similar products returned by the retrieval stage
    #[arg(long, default_value_t = 5, env = "SHOPWISE_TOP_K")]
    top_k: usize,

    /// Upper bound on a single pipeline stage
    #[arg(long, default_value_t = 30, env = "SHOPWISE_STAGE_TIMEOUT_SECS")]
    stage_timeout_secs: u64,

    /// Directory with a frontend build to serve at `/`
    #[arg(long, env = "SHOPWISE_STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// JSON array of products
    #[arg(long)]
    corpus: PathBuf,

    #[command(flatten)]
    index: IndexPaths,

    #[command(flatten)]
    inference: InferenceArgs,

    /// Number of products to keep from the corpus
    #[arg(long, default_value_t = 2000)]
    limit: usize,

    /// Download each product image and embed it instead of the text
    #[arg(long)]
    embed_images: bool,
}

async fn build_inference(args: &InferenceArgs) -> Arc<dyn InferenceCapability> {
    match &args.inference_url {
        Some(url) => Arc::new(
            RemoteInference::connect(url, args.embedding_dim, Duration::from_secs(args.inference_timeout_secs)).await,
        ),
        None => Arc::new(HashingInference::new(args.embedding_dim)),
    }
}

/// Load the index, or run without one when it is missing or unusable.
fn load_index(store: &IndexStore, dim: usize) -> Option<Arc<SimilarityIndex>> {
    match store.load() {
        Ok(index) if !index.is_empty() && index.dim() != dim => {
            error!(
                index_dim = index.dim(),
                embedding_dim = dim,
                "Index dimension does not match the inference backend; retrieval disabled"
            );
            None
        }
        Ok(index) => {
            info!(entries = index.len(), dim = index.dim(), "Index loaded");
            Some(Arc::new(index))
        }
        Err(e) => {
            error!(error = %e, "Failed to load index; retrieval disabled");
            None
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    info!("Starting shopwise v{}", env!("CARGO_PKG_VERSION"));
    info!("HTTP API port: {}", args.http_port);

    let inference = build_inference(&args.inference).await;
    info!(
        backend = inference.name(),
        availability = ?inference.availability(),
        "Inference backend initialized"
    );

    let store = IndexStore::new(&args.index.vectors, &args.index.metadata);
    let index = load_index(&store, inference.dimension());

    let config = PipelineConfig {
        top_k: args.top_k,
        stage_timeout: Duration::from_secs(args.stage_timeout_secs),
        ..PipelineConfig::default()
    };
    let orchestrator = Arc::new(PipelineOrchestrator::new(index.clone(), Arc::clone(&inference), config));
    let state = AppState {
        index,
        inference,
        orchestrator,
    };

    let http_port = args.http_port;
    let static_dir = args.static_dir;
    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", http_port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(state, http_port, static_dir).await {
                error!(error = %e, "HTTP server error");
            }
        })
    });

    info!("HTTP API: http://localhost:{}/api", http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    Ok(())
}

async fn run_ingest(args: IngestArgs) -> anyhow::Result<()> {
    let inference = build_inference(&args.inference).await;
    if !inference.availability().is_ready() {
        warn!(availability = ?inference.availability(), "Inference backend is not ready; every entry will be skipped");
    }

    let store = IndexStore::new(&args.index.vectors, &args.index.metadata);
    let options = IngestOptions {
        corpus: args.corpus,
        limit: args.limit,
        embed_images: args.embed_images,
        download_timeout: Duration::from_secs(args.inference.inference_timeout_secs),
    };
    let report = ingest(&options, inference.as_ref(), &store).await?;
    info!(
        read = report.read,
        indexed = report.indexed,
        skipped = report.skipped,
        "Ingestion finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Ingest(args) => run_ingest(args).await,
    }
}
