use std::collections::HashMap;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::CrawlSettings;
use crate::db::{ArticleUpsert, NewWriter, Store, Writer};
use crate::error::Result;
use crate::fetch::PageSource;
use crate::parser::articles::{parse_page, Byline, PageKind, RawArticle};

/// Clean numbered pages in a row after which the crawl assumes it has caught up.
const CLEAN_PAGES_TO_STOP: u32 = 2;

/// Writers known to this run, by name. Loaded once, grown as bylines introduce new names.
#[derive(Debug, Default)]
pub struct WriterCache {
    by_name: HashMap<String, i64>,
}

impl WriterCache {
    pub fn load<S: Store>(store: &S) -> Result<Self> {
        let mut cache = Self::default();
        for writer in store.find_writers()? {
            cache.insert(&writer);
        }
        Ok(cache)
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).copied()
    }

    pub fn insert(&mut self, writer: &Writer) {
        self.by_name.insert(writer.name.clone(), writer.id);
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Two consecutive numbered pages finished without a failed article.
    CleanPages,
    /// A numbered page could not be fetched (usually past the end of the feed).
    FetchFailed { page: u32, error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSummary {
    pub success: bool,
    #[serde(rename = "failedArticles")]
    pub failed_article_count: usize,
    pub last_processed_page: u32,
    pub articles_processed: usize,
    pub articles_skipped: usize,
    pub stop_reason: StopReason,
}

#[derive(Debug, Default, Clone, Copy)]
struct PageOutcome {
    processed: usize,
    skipped: usize,
    failed: usize,
}

/// Mirror the "new posts" feed into the store.
///
/// The root page is mandatory: failing to fetch it is an error. Numbered pages
/// are walked from 1 until two consecutive ones (page 2 onward) finish with no
/// failed article, or until a page cannot be fetched.
pub async fn crawl_new_posts<S, P>(
    store: &S,
    source: &P,
    settings: &CrawlSettings,
) -> Result<CrawlSummary>
where
    S: Store,
    P: PageSource + ?Sized,
{
    let mut writers = WriterCache::load(store)?;
    info!("Loaded {} known writers", writers.len());

    let mut failed = 0;
    let mut processed = 0;
    let mut skipped = 0;

    let root_html = source.fetch(&settings.base_url).await?;
    let root = process_page(store, &mut writers, &settings.base_url, &root_html, PageKind::Root, settings).await;
    info!(
        "Processed {}: {} ok, {} skipped, {} failed",
        settings.base_url, root.processed, root.skipped, root.failed
    );
    failed += root.failed;
    processed += root.processed;
    skipped += root.skipped;
    sleep(settings.page_delay).await;

    let mut page = 1u32;
    let mut last_processed_page = 0u32;
    let mut clean_streak = 0u32;

    let stop_reason = loop {
        let url = settings.page_url(page);
        let html = match source.fetch(&url).await {
            Ok(html) => html,
            Err(e) => {
                error!("Failed to process page {}: {}", page, e);
                break StopReason::FetchFailed {
                    page,
                    error: e.to_string(),
                };
            }
        };

        let outcome = process_page(store, &mut writers, &url, &html, PageKind::Numbered, settings).await;
        info!(
            "Processed {}: {} ok, {} skipped, {} failed",
            url, outcome.processed, outcome.skipped, outcome.failed
        );
        last_processed_page = page;
        failed += outcome.failed;
        processed += outcome.processed;
        skipped += outcome.skipped;

        if outcome.failed == 0 && page > 1 {
            clean_streak += 1;
            if clean_streak >= CLEAN_PAGES_TO_STOP {
                break StopReason::CleanPages;
            }
        } else {
            clean_streak = 0;
        }

        page += 1;
        sleep(settings.page_delay).await;
    };

    info!(
        "Crawl finished at page {} ({} ok, {} skipped, {} failed)",
        last_processed_page, processed, skipped, failed
    );

    Ok(CrawlSummary {
        success: true,
        failed_article_count: failed,
        last_processed_page,
        articles_processed: processed,
        articles_skipped: skipped,
        stop_reason,
    })
}

/// Ingest every article on one listing page. Never fails: problems are counted.
async fn process_page<S: Store>(
    store: &S,
    writers: &mut WriterCache,
    url: &str,
    html: &str,
    kind: PageKind,
    settings: &CrawlSettings,
) -> PageOutcome {
    let page = parse_page(html, kind, &settings.base_url);
    info!("Processing {}: {} articles", url, page.len());
    let mut outcome = PageOutcome {
        skipped: page.skipped.len(),
        ..Default::default()
    };

    for article in &page.articles {
        let mut succeeded = false;

        for attempt in 1..=settings.max_attempts {
            match save_article(store, writers, article) {
                Ok(()) => {
                    succeeded = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        "Processing failed for {} (attempt {}/{}): {}",
                        article.url, attempt, settings.max_attempts, e
                    );
                    if attempt < settings.max_attempts {
                        sleep(settings.retry_delay).await;
                    }
                }
            }
        }

        if succeeded {
            outcome.processed += 1;
        } else {
            error!("Failed to process article after all attempts: {}", article.url);
            outcome.failed += 1;
        }
    }

    outcome
}

/// Resolve the byline, then upsert category and article in one transaction.
fn save_article<S: Store>(store: &S, writers: &mut WriterCache, article: &RawArticle) -> Result<()> {
    let writer_ids = resolve_writers(store, writers, &article.bylines);

    store.transaction(|tx| {
        let category = tx.upsert_category(&article.category)?;
        tx.upsert_article(&ArticleUpsert {
            url: article.url.clone(),
            title: article.title.clone(),
            thumbnail: article.thumbnail.clone(),
            published_at: article.published_at,
            category_id: category.id,
            writer_ids,
        })?;
        Ok(())
    })
}

/// Map byline names to writer ids, creating writers the store has never seen.
/// A writer that cannot be created is left out of the set.
fn resolve_writers<S: Store>(store: &S, writers: &mut WriterCache, bylines: &[Byline]) -> Vec<i64> {
    let mut ids = Vec::with_capacity(bylines.len());

    for byline in bylines {
        let id = match writers.get(&byline.name) {
            Some(id) => id,
            None => {
                let new = NewWriter {
                    name: byline.name.clone(),
                    avatar_url: byline.avatar_url.clone(),
                    profile_url: byline.profile_url.clone(),
                };
                match store.create_writer(&new) {
                    Ok(writer) => {
                        info!("Created writer {}", writer.name);
                        writers.insert(&writer);
                        writer.id
                    }
                    Err(e) => {
                        warn!("Failed to create writer {}: {}", byline.name, e);
                        continue;
                    }
                }
            }
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    ids
}
