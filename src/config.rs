use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_BASE_URL: &str = "https://omocoro.jp";
pub const DEFAULT_DB_PATH: &str = "data/omocoro.sqlite";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

pub const MAX_ATTEMPTS: u32 = 5;
pub const RETRY_DELAY_MS: u64 = 2000;
pub const PAGE_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Production,
    Development,
}

impl AppEnv {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => AppEnv::Development,
            _ => AppEnv::Production,
        }
    }
}

/// Process-wide settings, read once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub cron_secret: Option<String>,
    pub app_env: AppEnv,
    pub listen_addr: String,
    pub crawl: CrawlSettings,
}

/// Knobs for a single ingestion run.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub base_url: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub page_delay: Duration,
}

impl CrawlSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_attempts: MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            page_delay: Duration::from_millis(PAGE_DELAY_MS),
        }
    }

    pub fn page_url(&self, page: u32) -> String {
        format!("{}/newpost/page/{}", self.base_url, page)
    }

    pub fn directory_url(&self) -> String {
        format!("{}/writer", self.base_url)
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let base_url = env_or("OMOCORO_BASE_URL", DEFAULT_BASE_URL);
        let mut crawl = CrawlSettings::new(&base_url);
        crawl.max_attempts = env_parse("MAX_ATTEMPTS", MAX_ATTEMPTS)?.max(1);
        crawl.retry_delay = Duration::from_millis(env_parse("RETRY_DELAY_MS", RETRY_DELAY_MS)?);
        crawl.page_delay = Duration::from_millis(env_parse("PAGE_DELAY_MS", PAGE_DELAY_MS)?);

        Ok(Self {
            db_path: env_or("DATABASE_PATH", DEFAULT_DB_PATH),
            cron_secret: std::env::var("CRON_SECRET").ok().filter(|s| !s.is_empty()),
            app_env: AppEnv::parse(&env_or("APP_ENV", "production")),
            listen_addr: env_or("LISTEN_ADDR", DEFAULT_LISTEN_ADDR),
            crawl,
        })
    }

    /// Apply command-line overrides on top of the environment.
    pub fn with_overrides(mut self, db: Option<String>, base_url: Option<String>) -> Self {
        if let Some(db) = db {
            self.db_path = db;
        }
        if let Some(base) = base_url {
            self.crawl.base_url = base.trim_end_matches('/').to_string();
        }
        self
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, v)),
        _ => Ok(default),
    }
}
