pub mod articles;
pub mod dates;
pub mod writers;

use scraper::{ElementRef, Selector};
use url::Url;

/// Trimmed text of the first descendant matching `sel`, if any and non-empty.
fn first_text(el: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel)
        .next()
        .map(|e| collapse(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Attribute of the first descendant matching `sel`, if any and non-empty.
fn first_attr(el: &ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    el.select(sel)
        .next()
        .and_then(|e| e.value().attr(attr))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Squash runs of whitespace; the site wraps names and titles across lines.
fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve `href` against `base`. Absolute links and unparsable bases pass through.
pub fn resolve(base: Option<&Url>, href: &str) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(u) => u.to_string(),
        None => href.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_relative_and_absolute() {
        let base = Url::parse("https://omocoro.jp").unwrap();
        assert_eq!(resolve(Some(&base), "/kiji/123/"), "https://omocoro.jp/kiji/123/");
        assert_eq!(
            resolve(Some(&base), "https://cdn.example/a.jpg"),
            "https://cdn.example/a.jpg"
        );
        assert_eq!(resolve(None, "/kiji/1/"), "/kiji/1/");
    }

    #[test]
    fn collapse_whitespace() {
        assert_eq!(collapse("  雑談\n   記事 "), "雑談 記事");
    }
}
