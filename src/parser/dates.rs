use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use regex::Regex;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[./\-年](\d{1,2})[./\-月](\d{1,2})日?(?:\s+(\d{1,2}):(\d{2}))?").unwrap()
});

/// The site prints local (JST) dates.
const SITE_OFFSET_SECS: i32 = 9 * 3600;

/// Parse a listing date like `2024.05.01` into UTC. Unparsable input gives `None`.
pub fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let caps = DATE_RE.captures(raw)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let date = NaiveDate::from_ymd_opt(num(1)? as i32, num(2)?, num(3)?)?;
    let time = date.and_hms_opt(num(4).unwrap_or(0), num(5).unwrap_or(0), 0)?;

    let jst = FixedOffset::east_opt(SITE_OFFSET_SECS)?;
    jst.from_local_datetime(&time)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
