use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::dates::parse_published_at;
use super::{collapse, first_attr, first_text, resolve};
use crate::error::ExtractError;

static ROOT_ENTRY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".new-entries .box:not(.ad)").unwrap());
static PAGE_ENTRY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".category-inner .box:not(.ad)").unwrap());

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".title").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".image a").unwrap());
static THUMB_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".image img").unwrap());
static CATEGORY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".category").unwrap());
static DATE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".date").unwrap());
static STAFF_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".staffs a").unwrap());
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

/// The root listing and the numbered `/newpost/page/N` listings wrap entries differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Root,
    Numbered,
}

impl PageKind {
    fn selector(self) -> &'static Selector {
        match self {
            PageKind::Root => &ROOT_ENTRY_SEL,
            PageKind::Numbered => &PAGE_ENTRY_SEL,
        }
    }
}

/// One writer link in an article's byline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Byline {
    pub name: String,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RawArticle {
    pub title: String,
    pub url: String,
    pub thumbnail: String,
    pub category: String,
    pub published_at: Option<DateTime<Utc>>,
    pub bylines: Vec<Byline>,
}

/// Entries of one listing page, split into usable articles and rejected elements.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub articles: Vec<RawArticle>,
    pub skipped: Vec<ExtractError>,
}

impl ParsedPage {
    pub fn len(&self) -> usize {
        self.articles.len() + self.skipped.len()
    }
}

pub fn parse_page(html: &str, kind: PageKind, base_url: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    let mut page = ParsedPage::default();

    for entry in document.select(kind.selector()) {
        match extract_article(&entry, base.as_ref()) {
            Ok(article) => page.articles.push(article),
            Err(e) => {
                warn!("{}", e);
                page.skipped.push(e);
            }
        }
    }

    page
}

fn extract_article(
    entry: &scraper::ElementRef<'_>,
    base: Option<&Url>,
) -> Result<RawArticle, ExtractError> {
    let title = first_text(entry, &TITLE_SEL);
    let url = first_attr(entry, &LINK_SEL, "href");
    let category = first_text(entry, &CATEGORY_SEL);

    let missing = |field: &'static str| ExtractError {
        title: title.clone().unwrap_or_else(|| "No title".to_string()),
        missing: field,
    };
    let url = url.ok_or_else(|| missing("url"))?;
    let category = category.ok_or_else(|| missing("category"))?;
    let title = title.clone().ok_or_else(|| missing("title"))?;

    let thumbnail = first_attr(entry, &THUMB_SEL, "src")
        .map(|src| resolve(base, &src))
        .unwrap_or_default();

    let date_raw = first_text(entry, &DATE_SEL).unwrap_or_default();
    let published_at = parse_published_at(&date_raw);
    if published_at.is_none() && !date_raw.is_empty() {
        debug!("Invalid date for article {}: {:?}", title, date_raw);
    }

    Ok(RawArticle {
        url: resolve(base, &url),
        thumbnail,
        category,
        published_at,
        bylines: extract_bylines(entry, base),
        title,
    })
}

fn extract_bylines(entry: &scraper::ElementRef<'_>, base: Option<&Url>) -> Vec<Byline> {
    entry
        .select(&STAFF_SEL)
        .filter_map(|staff| {
            let name = collapse(&staff.text().collect::<String>());
            if name.is_empty() {
                return None;
            }
            Some(Byline {
                name,
                avatar_url: first_attr(&staff, &IMG_SEL, "src").map(|s| resolve(base, &s)),
                profile_url: staff
                    .value()
                    .attr("href")
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(|h| resolve(base, h)),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://omocoro.jp";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn root_page_uses_new_entries_container() {
        let page = parse_page(&fixture("newpost_root"), PageKind::Root, BASE);
        assert_eq!(page.articles.len(), 3);
        assert!(page.skipped.is_empty());

        let first = &page.articles[0];
        assert_eq!(first.title, "ちょっとだけ怖い話をします");
        assert_eq!(first.url, "https://omocoro.jp/kiji/400001/");
        assert_eq!(first.category, "記事");
        assert_eq!(first.thumbnail, "https://omocoro.jp/assets/thumb/400001.jpg");
        assert!(first.published_at.is_some());
        let names: Vec<&str> = first.bylines.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["ARuFa", "ダ・ヴィンチ・恐山"]);
        assert_eq!(
            first.bylines[0].profile_url.as_deref(),
            Some("https://omocoro.jp/writer/arufa/")
        );
        assert_eq!(
            first.bylines[0].avatar_url.as_deref(),
            Some("https://omocoro.jp/assets/writer/arufa.png")
        );
    }

    #[test]
    fn ads_and_sidebar_boxes_are_ignored() {
        let page = parse_page(&fixture("newpost_root"), PageKind::Root, BASE);
        assert!(page.articles.iter().all(|a| !a.url.contains("sponsor")));
        assert!(page.articles.iter().all(|a| !a.url.contains("ranking")));
    }

    #[test]
    fn wrong_kind_finds_nothing() {
        let page = parse_page(&fixture("newpost_root"), PageKind::Numbered, BASE);
        assert_eq!(page.len(), 0);
    }

    #[test]
    fn numbered_page_skips_incomplete_entries() {
        let page = parse_page(&fixture("newpost_page"), PageKind::Numbered, BASE);
        assert_eq!(page.len(), 4);
        assert_eq!(page.articles.len(), 3);
        assert_eq!(page.skipped.len(), 1);
        assert_eq!(page.skipped[0].missing, "title");
    }

    #[test]
    fn empty_thumbnail_and_bad_date_are_kept() {
        let page = parse_page(&fixture("newpost_page"), PageKind::Numbered, BASE);
        let quiet = page
            .articles
            .iter()
            .find(|a| a.url.ends_with("/kiji/300003/"))
            .unwrap();
        assert_eq!(quiet.thumbnail, "");
        assert_eq!(quiet.published_at, None);
        assert!(quiet.bylines.is_empty());
    }

    #[test]
    fn missing_category_is_reported_with_title() {
        let html = r#"<div class="category-inner"><div class="box">
            <div class="image"><a href="/kiji/1/"><img src="/t.jpg"></a></div>
            <div class="title">カテゴリなし</div>
        </div></div>"#;
        let page = parse_page(html, PageKind::Numbered, BASE);
        assert!(page.articles.is_empty());
        assert_eq!(page.skipped[0].title, "カテゴリなし");
        assert_eq!(page.skipped[0].missing, "category");
    }
}
