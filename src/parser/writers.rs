use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use super::{first_attr, first_text, resolve};
use crate::db::NewWriter;
use crate::error::IngestError;

static WRITER_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".writers .box").unwrap());
static NAME_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".waku-text").unwrap());
static AVATAR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static PROFILE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// Extract every writer on the directory page.
///
/// The page is all-or-nothing: if any entry lacks a name, avatar, or profile
/// link, the whole listing is rejected before anything reaches the store.
pub fn parse_directory(html: &str, base_url: &str) -> Result<Vec<NewWriter>, IngestError> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let mut writers = Vec::new();
    for entry in document.select(&WRITER_SEL) {
        let name = first_text(&entry, &NAME_SEL);
        let avatar_url = first_attr(&entry, &AVATAR_SEL, "src");
        let profile_url = first_attr(&entry, &PROFILE_SEL, "href");

        let integrity = |missing| IngestError::DirectoryIntegrity {
            name: name.clone().unwrap_or_default(),
            missing,
        };
        let avatar_url = avatar_url.ok_or_else(|| integrity("avatar_url"))?;
        let profile_url = profile_url.ok_or_else(|| integrity("profile_url"))?;
        let name = name.clone().ok_or_else(|| integrity("name"))?;

        writers.push(NewWriter {
            name,
            avatar_url: Some(resolve(base.as_ref(), &avatar_url)),
            profile_url: Some(resolve(base.as_ref(), &profile_url)),
        });
    }

    Ok(writers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn directory_lists_all_writers() {
        let writers = parse_directory(&fixture("writers"), "https://omocoro.jp").unwrap();
        let names: Vec<&str> = writers.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["ARuFa", "ダ・ヴィンチ・恐山", "永田"]);
        assert_eq!(
            writers[1].profile_url.as_deref(),
            Some("https://omocoro.jp/writer/kyouzan/")
        );
        assert_eq!(
            writers[1].avatar_url.as_deref(),
            Some("https://omocoro.jp/assets/writer/kyouzan_l.png")
        );
    }

    #[test]
    fn missing_profile_link_rejects_whole_page() {
        let err = parse_directory(&fixture("writers_broken"), "https://omocoro.jp").unwrap_err();
        match err {
            IngestError::DirectoryIntegrity { name, missing } => {
                assert_eq!(name, "ゲスト");
                assert_eq!(missing, "profile_url");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_directory_is_not_an_error() {
        let writers = parse_directory("<html><body></body></html>", "https://omocoro.jp").unwrap();
        assert!(writers.is_empty());
    }
}
