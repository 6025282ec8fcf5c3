//! `reportdeck` binary: process wiring, config/tracing bootstrap, and the
//! §6 CLI surface.
//!
//! Grounded in `sblanchard-SerialAgent/src/main.rs`'s startup shape
//! (tracing subscriber built once, `Config::load_or_default`, components
//! constructed behind `Arc` and threaded into one place) with the HTTP
//! router/listener dropped — the HTTP edge is an external collaborator
//! (§1) this crate does not implement.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reportdeck_cache::CacheStore;
use reportdeck_data::{Catalog, DataQueryTool};
use reportdeck_domain::config::Config;
use reportdeck_idempotency::IdempotencyStore;
use reportdeck_orchestrator::{OrchestrateParams, Orchestrator};
use reportdeck_protocol::ToolRegistry;
use reportdeck_retry::RetryPolicy;
use reportdeck_tools::backend::{DeckBackend, ImageBackend, SummarizerBackend};
use reportdeck_tools::http::{HttpDeckBackend, HttpImageBackend, HttpSummarizerBackend};
use reportdeck_tools::mock::{MockDeckBackend, MockImageBackend, MockSummarizerBackend};
use reportdeck_tools::{ImageGenerateTool, SlidesCreateTool, SummarizeTool};

#[derive(Parser)]
#[command(name = "reportdeck", about = "Report-to-slide-deck orchestration")]
struct Cli {
    /// TOML config file; missing or unreadable falls back to defaults.
    #[arg(long, global = true, default_value = "reportdeck.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Turn a report into a slide deck (§6 CLI surface).
    Orchestrate {
        report_path: PathBuf,
        #[arg(long = "request-id")]
        request_id: Option<String>,
        #[arg(long = "no-cache")]
        no_cache: bool,
        #[arg(long = "cache-ttl-hours")]
        cache_ttl_hours: Option<f64>,
        #[arg(long = "slides", default_value_t = 1)]
        slides: usize,
    },
    /// Run the line-delimited JSON-RPC tool dispatcher over stdio (C1/C2).
    Serve,
}

struct Components {
    orchestrator: Arc<Orchestrator>,
    registry: ToolRegistry,
}

/// Picks an `Http*` adapter when a base URL is configured, a deterministic
/// `Mock*` adapter otherwise (per `reportdeck-domain::config`'s own
/// convention: "Empty means no live backend is wired").
fn build_components(config: &Arc<Config>) -> anyhow::Result<Components> {
    let out_dir = &config.state_dir.out_dir;
    std::fs::create_dir_all(out_dir)?;

    let http_client = reqwest::Client::new();

    let summarizer_backend: Arc<dyn SummarizerBackend> = if config.summarizer.base_url.is_empty() {
        tracing::warn!("no summarizer.base_url configured, using mock summarizer backend");
        Arc::new(MockSummarizerBackend::with_responses(vec![]))
    } else {
        Arc::new(HttpSummarizerBackend::new(http_client.clone(), config.summarizer.base_url.clone()))
    };

    let image_backend: Arc<dyn ImageBackend> = if config.image.base_url.is_empty() {
        tracing::warn!("no image.base_url configured, using mock image backend");
        Arc::new(MockImageBackend::with_images(vec![]))
    } else {
        Arc::new(HttpImageBackend::new(
            http_client.clone(),
            config.image.base_url.clone(),
            config.image.upload_base_url.clone(),
        ))
    };

    let deck_backend: Arc<dyn DeckBackend> = if config.deck.base_url.is_empty() {
        tracing::warn!("no deck.base_url configured, using mock deck backend");
        Arc::new(MockDeckBackend::default())
    } else {
        Arc::new(HttpDeckBackend::new(http_client.clone(), config.deck.base_url.clone()))
    };

    let retry_policy = RetryPolicy::from_config(&config.retry);

    let idempotency = Arc::new(IdempotencyStore::new(out_dir)?);
    let cache = Arc::new(CacheStore::new(out_dir.join("cache")));

    let summarizer = Arc::new(SummarizeTool::new(summarizer_backend.clone(), retry_policy));
    let image = Arc::new(ImageGenerateTool::new(image_backend, retry_policy, out_dir.join("images")));
    let slides = Arc::new(SlidesCreateTool::new(deck_backend, idempotency.clone(), retry_policy));

    let catalog = Arc::new(Catalog::new(out_dir)?);
    let data_query = Arc::new(DataQueryTool::new(
        catalog.clone(),
        summarizer_backend,
        out_dir.join("images").join("charts"),
        config.data.default_limit_rows,
        config.data.max_limit_rows,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        summarizer.clone(),
        image.clone(),
        slides.clone(),
        Some(data_query.clone()),
        cache,
        config,
    ));

    let registry = ToolRegistry::new()
        .register(summarizer)
        .register(image)
        .register(slides)
        .register(data_query);

    Ok(Components { orchestrator, registry })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reportdeck=info")))
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::load_or_default(&cli.config));
    tracing::info!(
        out_dir = %config.state_dir.out_dir.display(),
        cache_ttl_secs = config.cache.ttl_secs,
        "configuration loaded"
    );

    match cli.command {
        Command::Orchestrate {
            report_path,
            request_id,
            no_cache,
            cache_ttl_hours,
            slides,
        } => {
            let report_text = match std::fs::read_to_string(&report_path) {
                Ok(text) => text,
                Err(e) => {
                    eprintln!("reportdeck: cannot read {}: {e}", report_path.display());
                    std::process::exit(2);
                }
            };
            if slides == 0 {
                eprintln!("reportdeck: --slides must be at least 1");
                std::process::exit(2);
            }

            let components = build_components(&config)?;
            let cache_ttl_secs = cache_ttl_hours
                .map(|h| (h * 3600.0) as i64)
                .unwrap_or(config.cache.ttl_secs);

            let params = OrchestrateParams {
                report_text,
                client_request_id: request_id,
                slide_count: slides,
                use_cache: !no_cache,
                cache_ttl_secs,
                data_questions: Vec::new(),
                dataset_id: None,
            };

            match components.orchestrator.orchestrate(&params).await {
                Ok(result) => {
                    let out = serde_json::json!({
                        "ok": true,
                        "presentation_id": result.presentation_id,
                        "url": result.url,
                        "created_slides": result.created_slides,
                        "first_slide_id": result.first_slide_id,
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                Err(e) => {
                    eprintln!("reportdeck: orchestration failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Serve => {
            let components = build_components(&config)?;
            tracing::info!(methods = ?components.registry.method_names(), "serving tool protocol over stdio");
            let stdin = tokio::io::stdin();
            let stdout = tokio::io::stdout();
            reportdeck_protocol::transport::serve(&components.registry, stdin, stdout).await?;
        }
    }

    Ok(())
}
