use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use df_core::ArticleStorage;
use df_crawlers::{enabled_crawlers, get_crawler_factories};
use df_extractors::{create_content_extractor, create_screenshot_extractor};
use df_pipeline::{check_health, Health, Pipeline, PipelineScheduler, PipelineStatus, RunReport};
use df_storage::{BackendKind, StorageConfig};
use df_web::AppState;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::AppConfig;

const STORAGE_ATTEMPTS: u32 = 3;

#[derive(Parser, Debug)]
#[command(name = "devfeed", author, version, about = "Fetches, enriches and stores developer articles")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, default_value = "devfeed.toml")]
    config: PathBuf,
    /// Overrides `storage.backend` (memory or sqlite)
    #[arg(long)]
    storage: Option<BackendKind>,
    /// Overrides `storage.path`
    #[arg(long)]
    db_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Schedule runs and serve the health endpoint until Ctrl-C (default)
    Serve,
    /// Run the whole pipeline once and print its report
    RunOnce,
    /// Retry screenshots for stored articles that have none
    Sweep,
    /// List registered crawlers
    Crawlers,
    /// Check storage health
    Health,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn ArticleStorage>> {
    let mut attempt = 1;
    loop {
        let connected = match df_storage::create_storage(config).await {
            Ok(storage) => storage.check_health().await.map(|_| storage),
            Err(e) => Err(e),
        };
        match connected {
            Ok(storage) => {
                info!("✨ Storage initialized successfully (using {})", storage.name());
                return Ok(storage);
            }
            Err(e) if attempt < STORAGE_ATTEMPTS => {
                warn!("Storage initialization failed ({}), retrying {}/{}...", e, attempt, STORAGE_ATTEMPTS);
                attempt += 1;
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(e) => {
                return Err(e).context("storage initialization failed after all retries");
            }
        }
    }
}

fn build_pipeline(config: &AppConfig, storage: Arc<dyn ArticleStorage>) -> anyhow::Result<Pipeline> {
    let screenshots = create_screenshot_extractor(&config.screenshot, storage.clone())?;
    let contents = create_content_extractor(&config.content, storage.clone())?;

    let pipeline = Pipeline::new(storage, config.pipeline.clone())
        .with_crawlers(enabled_crawlers(&config.crawlers))
        .with_screenshot_extractor(screenshots)
        .with_content_extractor(contents);
    info!("🦗 Crawlers initialized successfully: {}", pipeline.crawler_names().join(", "));
    Ok(pipeline)
}

fn print_report(report: Option<RunReport>) -> anyhow::Result<()> {
    match report {
        Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        None => warn!("Nothing ran"),
    }
    Ok(())
}

async fn serve(config: AppConfig, storage: Arc<dyn ArticleStorage>) -> anyhow::Result<()> {
    let pipeline = Arc::new(build_pipeline(&config, storage.clone())?);
    let scheduler = PipelineScheduler::start(pipeline.clone(), &config.schedule).await?;

    let (stop_web, web_stopped) = oneshot::channel::<()>();
    let web = config.web.enabled.then(|| {
        let state = AppState::new(storage.clone(), pipeline.subscribe());
        let web_config = config.web.clone();
        tokio::spawn(async move {
            df_web::serve(&web_config, state, async {
                let _ = web_stopped.await;
            })
            .await
        })
    });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("🛑 Ctrl-C received, shutting down");

    scheduler.shutdown().await?;
    pipeline.shutdown();
    let _ = stop_web.send(());
    if let Some(web) = web {
        web.await??;
    }
    info!("👋 Bye");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(backend) = cli.storage {
        config.storage.backend = backend;
    }
    if let Some(path) = cli.db_path {
        config.storage.path = path;
    }

    let command = cli.command.unwrap_or(Commands::Serve);
    if let Commands::Crawlers = command {
        for factory in get_crawler_factories() {
            let crawler = (factory.build)(&config.crawlers);
            let state = if config.crawlers.is_enabled(factory.name) { "enabled" } else { "disabled" };
            println!("{:<16} {:<9} {}", factory.name, state, crawler.source());
        }
        return Ok(());
    }

    info!("💾 Checking storage connection...");
    let storage = connect_storage(&config.storage).await?;

    match command {
        Commands::Serve => serve(config, storage).await?,
        Commands::RunOnce => {
            let pipeline = build_pipeline(&config, storage)?;
            print_report(pipeline.run().await)?;
            pipeline.shutdown();
        }
        Commands::Sweep => {
            let pipeline = build_pipeline(&config, storage)?;
            print_report(pipeline.trigger_screenshot_sweep().await)?;
            pipeline.shutdown();
        }
        Commands::Health => {
            let check = check_health(storage.as_ref(), &PipelineStatus::Idle).await;
            println!("{}", serde_json::to_string_pretty(&check)?);
            if check.status == Health::Down {
                anyhow::bail!("storage is down");
            }
        }
        Commands::Crawlers => {}
    }
    Ok(())
}
