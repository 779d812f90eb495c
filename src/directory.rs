use serde::Serialize;
use tracing::info;

use crate::config::CrawlSettings;
use crate::db::Store;
use crate::error::Result;
use crate::fetch::PageSource;
use crate::parser::writers::parse_directory;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub success: bool,
    pub writer_count: usize,
}

/// Refresh writer profiles from the directory page.
///
/// A single fetch, no retries. The page is validated in full before the first
/// upsert, so a malformed listing writes nothing.
pub async fn sync_writers<S, P>(store: &S, source: &P, settings: &CrawlSettings) -> Result<SyncSummary>
where
    S: Store,
    P: PageSource + ?Sized,
{
    let url = settings.directory_url();
    info!("Fetching writer directory: {}", url);
    let html = source.fetch(&url).await?;

    let writers = parse_directory(&html, &settings.base_url)?;
    info!("Writer directory lists {} writers", writers.len());

    for writer in &writers {
        store.upsert_writer(writer)?;
    }

    Ok(SyncSummary {
        success: true,
        writer_count: writers.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::tests::{settings, StaticSite, BASE};
    use crate::db::{NewWriter, SqliteStore};
    use crate::error::IngestError;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn directory_url() -> String {
        format!("{}/writer", BASE)
    }

    #[tokio::test]
    async fn sync_creates_and_refreshes_writers() {
        let store = SqliteStore::in_memory().unwrap();
        let existing = store
            .create_writer(&NewWriter {
                name: "ARuFa".into(),
                avatar_url: None,
                profile_url: Some("https://old.example/arufa".into()),
            })
            .unwrap();
        let site = StaticSite::new().with(directory_url(), fixture("writers"));

        let summary = sync_writers(&store, &site, &settings()).await.unwrap();

        assert!(summary.success);
        assert_eq!(summary.writer_count, 3);
        let writers = store.find_writers().unwrap();
        assert_eq!(writers.len(), 3);
        let arufa = writers.iter().find(|w| w.name == "ARuFa").unwrap();
        assert_eq!(arufa.id, existing.id);
        assert_eq!(
            arufa.profile_url.as_deref(),
            Some("https://omocoro.jp/writer/arufa/")
        );
        assert_eq!(
            arufa.avatar_url.as_deref(),
            Some("https://omocoro.jp/assets/writer/arufa_l.png")
        );
    }

    #[tokio::test]
    async fn incomplete_directory_writes_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        let site = StaticSite::new().with(directory_url(), fixture("writers_broken"));

        let err = sync_writers(&store, &site, &settings()).await.unwrap_err();

        assert!(matches!(err, IngestError::DirectoryIntegrity { .. }));
        assert!(store.find_writers().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_directory_propagates() {
        let store = SqliteStore::in_memory().unwrap();
        let site = StaticSite::new();

        let err = sync_writers(&store, &site, &settings()).await.unwrap_err();
        assert!(matches!(err, IngestError::Fetch(_)));
    }
}
