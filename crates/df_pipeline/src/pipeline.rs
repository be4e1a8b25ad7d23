use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use df_core::{
    Article, ArticleParsed, ArticleStorage, ContentExtractor, Crawler, Error, Result, Screenshot,
    ScreenshotExtractor,
};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::pool::{join_all, with_timeout, WorkerPool};
use crate::status::{PipelineStatus, RunKind, RunReport, SweepReport};

/// Result of trying to store one crawled article.
#[derive(Debug)]
enum Persisted {
    Inserted(Article),
    Existing(Article),
}

/// Fetches articles from every crawler, stores the new ones and fills in
/// their screenshot and parsed content.
///
/// Runs never overlap: a trigger that arrives while a run is in progress is
/// skipped.
pub struct Pipeline {
    storage: Arc<dyn ArticleStorage>,
    crawlers: Vec<Arc<dyn Crawler>>,
    screenshot_extractor: Option<Arc<dyn ScreenshotExtractor>>,
    content_extractor: Option<Arc<dyn ContentExtractor>>,
    config: PipelineConfig,
    crawler_pool: WorkerPool,
    worker_pool: WorkerPool,
    screenshot_pool: WorkerPool,
    content_pool: WorkerPool,
    // Completed run count; held for the whole run.
    run_guard: Mutex<u64>,
    status: watch::Sender<PipelineStatus>,
}

impl Pipeline {
    pub fn new(storage: Arc<dyn ArticleStorage>, config: PipelineConfig) -> Self {
        let (status, _) = watch::channel(PipelineStatus::Idle);
        Self {
            storage,
            crawlers: Vec::new(),
            screenshot_extractor: None,
            content_extractor: None,
            crawler_pool: WorkerPool::new("crawlers", 1),
            worker_pool: WorkerPool::new("workers", config.workers),
            screenshot_pool: WorkerPool::new("screenshots", config.screenshot_workers),
            content_pool: WorkerPool::new("contents", config.content_workers),
            config,
            run_guard: Mutex::new(0),
            status,
        }
    }

    pub fn with_crawler(self, crawler: Arc<dyn Crawler>) -> Self {
        self.with_crawlers([crawler])
    }

    pub fn with_crawlers(mut self, crawlers: impl IntoIterator<Item = Arc<dyn Crawler>>) -> Self {
        self.crawlers.extend(crawlers);
        self.crawler_pool = WorkerPool::new("crawlers", self.crawlers.len() + 1);
        self
    }

    pub fn with_screenshot_extractor(mut self, extractor: Option<Arc<dyn ScreenshotExtractor>>) -> Self {
        self.screenshot_extractor = extractor;
        self
    }

    pub fn with_content_extractor(mut self, extractor: Option<Arc<dyn ContentExtractor>>) -> Self {
        self.content_extractor = extractor;
        self
    }

    pub fn crawler_names(&self) -> Vec<String> {
        self.crawlers.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.worker_pool.is_shut_down()
    }

    /// Closes every pool; tasks still in flight end with [`Error::Shutdown`].
    pub fn shutdown(&self) {
        info!("🛑 Shutting down pipeline pools");
        for pool in self.pools() {
            debug!("Closing {} pool", pool.name());
            pool.shutdown();
        }
    }

    fn pools(&self) -> [&WorkerPool; 4] {
        [
            &self.crawler_pool,
            &self.worker_pool,
            &self.screenshot_pool,
            &self.content_pool,
        ]
    }

    /// Runs crawl, persist, enrich and screenshot sweep. Returns `None` when
    /// another run holds the guard or the pipeline is shut down.
    pub async fn run(&self) -> Option<RunReport> {
        self.guarded(RunKind::Full).await
    }

    /// Retries screenshots for every stored article that still lacks one.
    pub async fn trigger_screenshot_sweep(&self) -> Option<RunReport> {
        self.guarded(RunKind::ScreenshotSweep).await
    }

    async fn guarded(&self, kind: RunKind) -> Option<RunReport> {
        if self.is_shut_down() {
            info!("🛑 Pipeline is shut down, not starting a {}", kind);
            return None;
        }
        let Ok(mut completed) = self.run_guard.try_lock() else {
            info!("⏭️ A run is already in progress, skipping {}", kind);
            return None;
        };

        let started_at = Utc::now();
        self.status.send_replace(PipelineStatus::Running {
            kind,
            started_at,
            completed_runs: *completed,
        });
        info!("🚀 Starting {} #{}", kind, *completed + 1);

        let mut report = RunReport::new(kind, *completed + 1, started_at);
        match kind {
            RunKind::Full => self.full_run(&mut report).await,
            RunKind::ScreenshotSweep => self.screenshot_sweep(&mut report).await,
        }
        report.finish(Utc::now());
        *completed += 1;

        log_report(&report);
        self.status.send_replace(PipelineStatus::from_report(report.clone()));
        Some(report)
    }

    async fn full_run(&self, report: &mut RunReport) {
        let crawled = self.crawl(report).await;
        let candidates = prepare_batch(crawled, Utc::now(), self.config.max_age_days, report);
        let persisted = self.persist_new(candidates, report).await;
        self.enrich(persisted, report).await;
        // Runs even when crawling failed: stored articles still need screenshots.
        self.screenshot_sweep(report).await;
    }

    async fn crawl(&self, report: &mut RunReport) -> Vec<Article> {
        if self.crawlers.is_empty() {
            warn!("🦗 No crawler configured");
            return Vec::new();
        }
        info!(
            "🦗 Crawling {} sources with {} workers",
            self.crawlers.len(),
            self.crawler_pool.size()
        );

        let limit = self.config.crawler_timeout();
        let handles = self
            .crawlers
            .iter()
            .map(|crawler| {
                let crawler = crawler.clone();
                self.crawler_pool.spawn(async move {
                    let what = format!("crawler {}", crawler.name());
                    with_timeout(limit, what, crawler.fetch_articles()).await
                })
            })
            .collect();

        let mut articles = Vec::new();
        for (crawler, result) in self.crawlers.iter().zip(join_all(handles).await) {
            match result.and_then(|fetched| fetched) {
                Ok(batch) => {
                    debug!(
                        "🦗 {} returned {} articles from {}",
                        crawler.name(),
                        batch.len(),
                        crawler.source()
                    );
                    report.crawlers_ok += 1;
                    articles.extend(batch);
                }
                Err(e) => {
                    warn!("⚠️ Crawler {} failed: {}", crawler.name(), e);
                    report.crawlers_failed += 1;
                    report.failures.push(format!("crawler {} failed: {}", crawler.name(), e));
                }
            }
        }
        report.crawled = articles.len();
        articles
    }

    async fn persist_new(&self, articles: Vec<Article>, report: &mut RunReport) -> Vec<Article> {
        info!("💾 Persisting {} candidate articles", articles.len());
        let handles = articles
            .into_iter()
            .map(|article| {
                let storage = self.storage.clone();
                self.worker_pool.spawn(async move {
                    let url = article.url.clone();
                    (url, persist_one(storage.as_ref(), article).await)
                })
            })
            .collect();

        let mut persisted = Vec::new();
        for result in join_all(handles).await {
            match result {
                Ok((_, Ok(Persisted::Inserted(article)))) => {
                    report.inserted += 1;
                    persisted.push(article);
                }
                Ok((_, Ok(Persisted::Existing(article)))) => {
                    report.already_stored += 1;
                    persisted.push(article);
                }
                Ok((url, Err(e))) => {
                    warn!("⚠️ Could not persist {}: {}", url, e);
                    report.persist_failures += 1;
                }
                Err(e) => {
                    warn!("⚠️ Persist task did not complete: {}", e);
                    report.persist_failures += 1;
                }
            }
        }
        persisted
    }

    async fn enrich(&self, mut articles: Vec<Article>, report: &mut RunReport) {
        if articles.is_empty() {
            return;
        }
        let mut screenshot_changed = vec![false; articles.len()];
        let mut parsed_changed = vec![false; articles.len()];

        if let Some(extractor) = &self.screenshot_extractor {
            let wanted: Vec<usize> = (0..articles.len())
                .filter(|&i| !articles[i].has_screenshot())
                .collect();
            info!("📸 Requesting {} screenshots", wanted.len());
            let found = self.screenshots_for(extractor, &articles, &wanted).await;
            for (i, screenshot) in found {
                articles[i].screenshot = Some(screenshot);
                screenshot_changed[i] = true;
            }
        }

        if let Some(extractor) = &self.content_extractor {
            let wanted: Vec<usize> = (0..articles.len())
                .filter(|&i| !articles[i].has_parsed())
                .collect();
            info!("📄 Requesting parsed content for {} articles", wanted.len());
            let found = self.contents_for(extractor, &articles, &wanted).await;
            for (i, parsed) in found {
                articles[i].parsed = Some(parsed);
                parsed_changed[i] = true;
            }
        }

        let handles: Vec<_> = articles
            .into_iter()
            .enumerate()
            .filter(|(i, _)| screenshot_changed[*i] || parsed_changed[*i])
            .map(|(i, article)| {
                let storage = self.storage.clone();
                let (screenshot, parsed) = (screenshot_changed[i], parsed_changed[i]);
                self.worker_pool.spawn(async move {
                    let mut outcome = UpdateOutcome::default();
                    if screenshot {
                        outcome.screenshot = Some(storage.update_screenshot(&article).await);
                    }
                    if parsed {
                        outcome.parsed = Some(storage.update_parsed(&article).await);
                    }
                    (article.url, outcome)
                })
            })
            .collect();

        for result in join_all(handles).await {
            match result {
                Ok((url, outcome)) => {
                    tally(outcome.screenshot, "screenshot", &url, &mut report.screenshots_added, &mut report.update_failures);
                    tally(outcome.parsed, "parsed content", &url, &mut report.parsed_added, &mut report.update_failures);
                }
                Err(e) => {
                    warn!("⚠️ Enrichment update did not complete: {}", e);
                    report.update_failures += 1;
                }
            }
        }
    }

    async fn screenshot_sweep(&self, report: &mut RunReport) {
        let Some(extractor) = &self.screenshot_extractor else {
            info!("📸 No screenshot extractor configured, skipping screenshot sweep");
            return;
        };

        let pending = match self.storage.articles_with_no_screenshot().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!("⚠️ Could not list articles without screenshot: {}", e);
                report.failures.push(format!("screenshot sweep failed: {}", e));
                return;
            }
        };
        info!("🧹 {} articles have no screenshot yet", pending.len());

        let mut sweep = SweepReport {
            pending: pending.len(),
            ..Default::default()
        };
        let all: Vec<usize> = (0..pending.len()).collect();
        let found = self.screenshots_for(extractor, &pending, &all).await;

        let handles = found
            .into_iter()
            .map(|(i, screenshot)| {
                let mut article = pending[i].clone();
                article.screenshot = Some(screenshot);
                let storage = self.storage.clone();
                self.worker_pool.spawn(async move {
                    let updated = storage.update_screenshot(&article).await;
                    (article.url, updated)
                })
            })
            .collect();

        for result in join_all(handles).await {
            match result {
                Ok((_, Ok(()))) => sweep.updated += 1,
                Ok((url, Err(e))) => {
                    warn!("⚠️ Could not store screenshot for {}: {}", url, e);
                    report.update_failures += 1;
                }
                Err(e) => {
                    warn!("⚠️ Screenshot update did not complete: {}", e);
                    report.update_failures += 1;
                }
            }
        }

        sweep.remaining = match self.storage.articles_with_no_screenshot().await {
            Ok(left) => left.len(),
            Err(e) => {
                warn!("⚠️ Could not recount articles without screenshot: {}", e);
                sweep.pending - sweep.updated
            }
        };
        info!(
            "🧹 Screenshot sweep done: {} before, {} updated, {} after",
            sweep.pending, sweep.updated, sweep.remaining
        );
        report.sweep = Some(sweep);
    }

    /// Extracts screenshots for `articles[i]`, `i` in `wanted`, on the
    /// screenshot pool. Only non-blank screenshots are returned.
    async fn screenshots_for(
        &self,
        extractor: &Arc<dyn ScreenshotExtractor>,
        articles: &[Article],
        wanted: &[usize],
    ) -> Vec<(usize, Screenshot)> {
        let limit = self.config.screenshot_timeout();
        let handles = wanted
            .iter()
            .map(|&i| {
                let extractor = extractor.clone();
                let article = articles[i].clone();
                self.screenshot_pool.spawn(async move {
                    let what = format!("screenshot of {}", article.url);
                    extract(limit, what, extractor.extract_screenshot(&article)).await
                })
            })
            .collect();

        collect_found(wanted, join_all(handles).await)
            .into_iter()
            .filter(|(_, s): &(usize, Screenshot)| s.has_data())
            .collect()
    }

    async fn contents_for(
        &self,
        extractor: &Arc<dyn ContentExtractor>,
        articles: &[Article],
        wanted: &[usize],
    ) -> Vec<(usize, ArticleParsed)> {
        let limit = self.config.content_timeout();
        let handles = wanted
            .iter()
            .map(|&i| {
                let extractor = extractor.clone();
                let article = articles[i].clone();
                self.content_pool.spawn(async move {
                    let what = format!("content of {}", article.url);
                    extract(limit, what, extractor.extract_content(&article)).await
                })
            })
            .collect();

        collect_found(wanted, join_all(handles).await)
            .into_iter()
            .filter(|(_, p): &(usize, ArticleParsed)| p.has_body())
            .collect()
    }
}

#[derive(Debug, Default)]
struct UpdateOutcome {
    screenshot: Option<Result<()>>,
    parsed: Option<Result<()>>,
}

fn tally(update: Option<Result<()>>, what: &str, url: &str, added: &mut usize, failed: &mut usize) {
    match update {
        Some(Ok(())) => *added += 1,
        Some(Err(e)) => {
            warn!("⚠️ Could not store {} for {}: {}", what, url, e);
            *failed += 1;
        }
        None => {}
    }
}

/// Removes repeated urls (first wins) and articles past the age limit, then
/// normalizes tags on what is left.
fn prepare_batch(
    articles: Vec<Article>,
    now: DateTime<Utc>,
    max_age_days: u32,
    report: &mut RunReport,
) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(articles.len());
    for mut article in articles {
        if !seen.insert(article.url.clone()) {
            debug!("Dropping repeated url {} from batch", article.url);
            report.duplicates_in_batch += 1;
            continue;
        }
        if max_age_days > 0 && article.age_in_days(now) > i64::from(max_age_days) {
            debug!(
                "Skipping {}: {} days old, limit is {}",
                article.url,
                article.age_in_days(now),
                max_age_days
            );
            report.too_old += 1;
            continue;
        }
        article.normalize_tags();
        kept.push(article);
    }
    kept
}

async fn persist_one(storage: &dyn ArticleStorage, article: Article) -> Result<Persisted> {
    if let Some(existing) = storage.find_by_url(&article.url).await? {
        return Ok(Persisted::Existing(existing));
    }
    match storage.insert_article(&article).await {
        Ok(id) => storage
            .find_by_id(&id)
            .await?
            .map(Persisted::Inserted)
            .ok_or_else(|| Error::Storage(format!("Article {} missing right after insert", id))),
        // Another task stored the same url between the lookup and the insert.
        Err(Error::DuplicateArticle(url)) => storage
            .find_by_url(&url)
            .await?
            .map(Persisted::Existing)
            .ok_or_else(|| Error::Storage(format!("Duplicate {} could not be read back", url))),
        Err(e) => Err(e),
    }
}

async fn extract<F, T>(limit: Duration, what: String, extraction: F) -> Option<T>
where
    F: std::future::Future<Output = Option<T>>,
{
    match with_timeout(limit, what, async { Ok(extraction.await) }).await {
        Ok(found) => found,
        Err(e) => {
            warn!("⏱️ {}", e);
            None
        }
    }
}

fn collect_found<T>(wanted: &[usize], results: Vec<Result<Option<T>>>) -> Vec<(usize, T)> {
    wanted
        .iter()
        .zip(results)
        .filter_map(|(&i, result)| match result {
            Ok(found) => found.map(|value| (i, value)),
            Err(e) => {
                warn!("⚠️ Extraction task did not complete: {}", e);
                None
            }
        })
        .collect()
}

fn log_report(report: &RunReport) {
    info!(
        "📊 {} #{} finished in {}ms: {} crawled, {} new, {} known, {} too old, {} repeated, {} persist failures, {} screenshots, {} parsed",
        report.kind,
        report.run_number,
        report.duration_ms().unwrap_or_default(),
        report.crawled,
        report.inserted,
        report.already_stored,
        report.too_old,
        report.duplicates_in_batch,
        report.persist_failures,
        report.screenshots_added,
        report.parsed_added,
    );
    for failure in &report.failures {
        warn!("⚠️ {}", failure);
    }
}
