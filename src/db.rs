use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::Result;

// ── Rows ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Writer {
    pub id: i64,
    pub name: String,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWriter {
    pub name: String,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub thumbnail: String,
    pub published_at: Option<DateTime<Utc>>,
    pub category_id: i64,
}

/// Everything needed to create or refresh one article row.
#[derive(Debug, Clone)]
pub struct ArticleUpsert {
    pub url: String,
    pub title: String,
    pub thumbnail: String,
    pub published_at: Option<DateTime<Utc>>,
    pub category_id: i64,
    pub writer_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub articles: usize,
    pub writers: usize,
    pub categories: usize,
}

// ── Gateway ──

/// Persistence operations the ingestion jobs rely on.
pub trait Store {
    fn find_writers(&self) -> Result<Vec<Writer>>;

    /// Insert a writer; fails if the name is already taken.
    fn create_writer(&self, writer: &NewWriter) -> Result<Writer>;

    /// Create by name, or overwrite avatar/profile of the existing row.
    fn upsert_writer(&self, writer: &NewWriter) -> Result<Writer>;

    /// Run `f` atomically: every write issued through the handle commits, or none does.
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn StoreTx) -> Result<T>;
}

/// Writes available inside [`Store::transaction`].
pub trait StoreTx {
    fn upsert_category(&self, name: &str) -> Result<Category>;

    /// Create or update by URL. The writer set is replaced, never merged.
    fn upsert_article(&self, article: &ArticleUpsert) -> Result<Article>;
}

// ── SQLite ──

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

pub fn connect(path: &str) -> anyhow::Result<Connection> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS categories (
            id         INTEGER PRIMARY KEY,
            name       TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS writers (
            id          INTEGER PRIMARY KEY,
            name        TEXT UNIQUE NOT NULL,
            avatar_url  TEXT,
            profile_url TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS articles (
            id           INTEGER PRIMARY KEY,
            url          TEXT UNIQUE NOT NULL,
            title        TEXT NOT NULL,
            thumbnail    TEXT NOT NULL DEFAULT '',
            published_at TEXT,
            category_id  INTEGER NOT NULL REFERENCES categories(id),
            created_at   TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category_id);
        CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published_at);

        CREATE TABLE IF NOT EXISTS article_writers (
            article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
            writer_id  INTEGER NOT NULL REFERENCES writers(id) ON DELETE CASCADE,
            PRIMARY KEY (article_id, writer_id)
        );
        CREATE INDEX IF NOT EXISTS idx_article_writers_writer ON article_writers(writer_id);
        ",
    )
}

impl SqliteStore {
    /// Open (and migrate) the database file at `path`.
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = connect(path)?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.lock();
        let count = |table: &str| -> rusqlite::Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        };
        Ok(StoreCounts {
            articles: count("articles")?,
            writers: count("writers")?,
            categories: count("categories")?,
        })
    }
}

impl Store for SqliteStore {
    fn find_writers(&self) -> Result<Vec<Writer>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT id, name, avatar_url, profile_url FROM writers ORDER BY id")?;
        let rows = stmt
            .query_map([], writer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn create_writer(&self, writer: &NewWriter) -> Result<Writer> {
        let conn = self.lock();
        let row = conn.query_row(
            "INSERT INTO writers (name, avatar_url, profile_url)
             VALUES (?1, ?2, ?3)
             RETURNING id, name, avatar_url, profile_url",
            params![writer.name, writer.avatar_url, writer.profile_url],
            writer_from_row,
        )?;
        Ok(row)
    }

    fn upsert_writer(&self, writer: &NewWriter) -> Result<Writer> {
        let conn = self.lock();
        let row = conn.query_row(
            "INSERT INTO writers (name, avatar_url, profile_url)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                avatar_url  = excluded.avatar_url,
                profile_url = excluded.profile_url,
                updated_at  = datetime('now')
             RETURNING id, name, avatar_url, profile_url",
            params![writer.name, writer.avatar_url, writer.profile_url],
            writer_from_row,
        )?;
        Ok(row)
    }

    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn StoreTx) -> Result<T>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        // Dropping `tx` on the error path rolls everything back.
        let out = f(&SqliteTx { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl StoreTx for SqliteTx<'_> {
    fn upsert_category(&self, name: &str) -> Result<Category> {
        self.conn.execute(
            "INSERT INTO categories (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![name],
        )?;
        let category = self.conn.query_row(
            "SELECT id, name FROM categories WHERE name = ?1",
            params![name],
            |row| Ok(Category { id: row.get(0)?, name: row.get(1)? }),
        )?;
        Ok(category)
    }

    fn upsert_article(&self, a: &ArticleUpsert) -> Result<Article> {
        let article = self.conn.query_row(
            "INSERT INTO articles (url, title, thumbnail, published_at, category_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(url) DO UPDATE SET
                title        = excluded.title,
                thumbnail    = excluded.thumbnail,
                published_at = excluded.published_at,
                category_id  = excluded.category_id,
                updated_at   = datetime('now')
             RETURNING id, url, title, thumbnail, published_at, category_id",
            params![a.url, a.title, a.thumbnail, a.published_at, a.category_id],
            article_from_row,
        )?;

        self.conn.execute(
            "DELETE FROM article_writers WHERE article_id = ?1",
            params![article.id],
        )?;
        let mut link = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO article_writers (article_id, writer_id) VALUES (?1, ?2)",
        )?;
        for writer_id in &a.writer_ids {
            link.execute(params![article.id, writer_id])?;
        }

        Ok(article)
    }
}

fn writer_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Writer> {
    Ok(Writer {
        id: row.get(0)?,
        name: row.get(1)?,
        avatar_url: row.get(2)?,
        profile_url: row.get(3)?,
    })
}

fn article_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        thumbnail: row.get(3)?,
        published_at: row.get(4)?,
        category_id: row.get(5)?,
    })
}

// Read helpers for assertions.
#[cfg(test)]
impl SqliteStore {
    pub fn in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn find_article(&self, url: &str) -> Result<Option<Article>> {
        use rusqlite::OptionalExtension;
        let conn = self.lock();
        let article = conn
            .query_row(
                "SELECT id, url, title, thumbnail, published_at, category_id
                 FROM articles WHERE url = ?1",
                params![url],
                article_from_row,
            )
            .optional()?;
        Ok(article)
    }

    pub fn find_category(&self, name: &str) -> Result<Option<Category>> {
        use rusqlite::OptionalExtension;
        let conn = self.lock();
        let category = conn
            .query_row(
                "SELECT id, name FROM categories WHERE name = ?1",
                params![name],
                |row| Ok(Category { id: row.get(0)?, name: row.get(1)? }),
            )
            .optional()?;
        Ok(category)
    }

    /// Names of the writers linked to the article at `url`, sorted.
    pub fn article_writer_names(&self, url: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT w.name
             FROM article_writers aw
             JOIN articles a ON a.id = aw.article_id
             JOIN writers w ON w.id = aw.writer_id
             WHERE a.url = ?1
             ORDER BY w.name",
        )?;
        let names = stmt
            .query_map(params![url], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// All article URLs, sorted.
    pub fn article_urls(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT url FROM articles ORDER BY url")?;
        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }
}
