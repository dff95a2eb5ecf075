use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use statement_search_core::{
    CharacterNgramEmbedder, Embedder, EmbeddingError, HttpEmbedder, HttpLinkScraper,
    IndexBuilder, IndexState, IndexStore, LinkScraper, LopdfExtractor, NoopLinkScraper,
    PipelineConfig, ProcessOutcome, Retriever, ScrapeError, DEFAULT_EMBEDDING_ENDPOINT,
    DEFAULT_EMBEDDING_MODEL,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "statement-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the index bundle.
    #[arg(long, env = "STATEMENT_SEARCH_INDEX_DIR", default_value = "faiss_index")]
    index_dir: PathBuf,

    /// Directory scanned for PDFs when the index has to be built.
    #[arg(long, env = "STATEMENT_SEARCH_SOURCE_DIR", default_value = "data")]
    source_dir: PathBuf,

    /// Embedding service endpoint.
    #[arg(long, env = "STATEMENT_SEARCH_EMBED_URL", default_value = DEFAULT_EMBEDDING_ENDPOINT)]
    embed_url: String,

    /// Embedding model name sent with each request.
    #[arg(long, env = "STATEMENT_SEARCH_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    model: String,

    /// Embedding dimension.
    #[arg(long, env = "STATEMENT_SEARCH_DIMENSION", default_value = "768")]
    dimension: usize,

    /// Which embedder to use.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Http)]
    embedder: EmbedderKind,

    /// Embed overlapping word windows instead of whole pages.
    #[arg(long, default_value_t = false)]
    chunk: bool,

    #[arg(long, default_value = "256")]
    chunk_size: usize,

    #[arg(long, default_value = "40")]
    chunk_overlap: usize,

    /// Do not fetch pages behind link annotations.
    #[arg(long, default_value_t = false)]
    no_link_scrape: bool,

    /// Per-request timeout for embedding and link fetches. No timeout when unset.
    #[arg(long, env = "STATEMENT_SEARCH_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Remote embedding service.
    Http,
    /// Offline character-trigram hashing.
    Ngram,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, embed and index every PDF in a folder.
    Build {
        /// Folder that contains PDFs. Defaults to --source-dir.
        #[arg(long)]
        pdf_dir: Option<PathBuf>,
    },
    /// Query the index, building it first if it is missing.
    Search {
        query: String,
        /// Number of results to return.
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Give up on the query after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Report whether the index bundle is usable.
    Status,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            embedding_endpoint: self.embed_url.clone(),
            model: self.model.clone(),
            dimension: self.dimension,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            chunk_on_build: self.chunk,
            top_k: match &self.command {
                Command::Search { top_k, .. } => *top_k,
                _ => PipelineConfig::default().top_k,
            },
            index_dir: self.index_dir.clone(),
            source_dir: self.source_dir.clone(),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

enum AppEmbedder {
    Http(HttpEmbedder),
    Ngram(CharacterNgramEmbedder),
}

impl Embedder for AppEmbedder {
    fn dimensions(&self) -> usize {
        match self {
            AppEmbedder::Http(inner) => inner.dimensions(),
            AppEmbedder::Ngram(inner) => inner.dimensions(),
        }
    }

    fn model(&self) -> &str {
        match self {
            AppEmbedder::Http(inner) => inner.model(),
            AppEmbedder::Ngram(inner) => inner.model(),
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self {
            AppEmbedder::Http(inner) => inner.embed(text),
            AppEmbedder::Ngram(inner) => inner.embed(text),
        }
    }
}

enum AppScraper {
    Http(HttpLinkScraper),
    Off(NoopLinkScraper),
}

impl LinkScraper for AppScraper {
    fn scrape(&self, uri: &str) -> Result<String, ScrapeError> {
        match self {
            AppScraper::Http(inner) => inner.scrape(uri),
            AppScraper::Off(inner) => inner.scrape(uri),
        }
    }
}

type AppBuilder = IndexBuilder<LopdfExtractor<AppScraper>, AppEmbedder>;

fn index_builder(cli: &Cli, config: &PipelineConfig) -> anyhow::Result<AppBuilder> {
    let embedder = match cli.embedder {
        EmbedderKind::Http => AppEmbedder::Http(
            HttpEmbedder::from_config(config).context("failed to create embedding client")?,
        ),
        EmbedderKind::Ngram => AppEmbedder::Ngram(CharacterNgramEmbedder {
            dimensions: config.dimension,
        }),
    };
    let scraper = if cli.no_link_scrape {
        AppScraper::Off(NoopLinkScraper)
    } else {
        AppScraper::Http(
            HttpLinkScraper::new(config.request_timeout).context("failed to create link scraper")?,
        )
    };

    IndexBuilder::from_config(LopdfExtractor::new(scraper), embedder, config)
        .context("invalid build configuration")
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.pipeline_config();

    match &cli.command {
        Command::Build { pdf_dir } => {
            let pdf_dir = pdf_dir.clone().unwrap_or_else(|| config.source_dir.clone());
            let builder = index_builder(&cli, &config)?;
            let store = IndexStore::new(&config.index_dir);

            match builder
                .process_documents(&pdf_dir, &store)
                .with_context(|| format!("failed to build index from {}", pdf_dir.display()))?
            {
                ProcessOutcome::NoPdfFiles => {
                    println!("No PDF files found in {}", pdf_dir.display());
                }
                ProcessOutcome::Built { report, manifest } => {
                    for skipped in &report.skipped_files {
                        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                    }
                    println!(
                        "{} documents indexed from {} files into {} at {} ({} files skipped, {} units skipped)",
                        report.documents_indexed,
                        report.files_processed,
                        store.dir().display(),
                        manifest.built_at.to_rfc3339(),
                        report.skipped_files.len(),
                        report.skipped_units.len()
                    );
                }
            }
        }
        Command::Search { query, .. } => {
            let builder = index_builder(&cli, &config)?;
            let mut retriever = Retriever::from_config(builder, &config);
            let results = retriever.search_documents(query);
            println!("{}", results.join("\n\n"));
        }
        Command::Status => {
            let store = IndexStore::new(&config.index_dir);
            let (status, loaded) = store.open();
            println!("index: {}", store.dir().display());
            match (IndexState::from(status), loaded) {
                (IndexState::Ready, Some(loaded)) => {
                    println!("state: ready");
                    println!("documents: {}", loaded.documents.len());
                    if let Some(manifest) = loaded.manifest {
                        println!("model: {}", manifest.model);
                        println!("dimension: {}", manifest.dimension);
                        println!("built_at: {}", manifest.built_at.to_rfc3339());
                        println!("build_id: {}", manifest.build_id);
                    }
                }
                (IndexState::Corrupt(reason), _) => println!("state: corrupt ({reason})"),
                _ => println!("state: absent"),
            }
        }
    }

    Ok(())
}

async fn run_with_timeout(cli: Cli) -> anyhow::Result<()> {
    let limit = match &cli.command {
        Command::Search { timeout_secs, .. } => timeout_secs.map(Duration::from_secs),
        _ => None,
    };
    let task = tokio::task::spawn_blocking(move || run(cli));

    match limit {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .with_context(|| format!("query timed out after {}s", limit.as_secs()))??,
        None => task.await?,
    }
}

fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "statement-search boot"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let result = runtime.block_on(run_with_timeout(cli));
    // A timed-out query may still be blocked on the embedding service.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}
