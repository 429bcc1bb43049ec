//! SQLite-backed page and event store with FTS5 search.
//!
//! One connection per store, guarded by a mutex. Several stores (or processes)
//! may open the same file: WAL mode plus `busy_timeout` lets readers proceed,
//! and every write runs in a `BEGIN IMMEDIATE` transaction that is retried
//! with exponential backoff while another writer holds the lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::migrate::Migrator;
use crate::text::plain_text;
use crate::types::*;
use infracal_core::{Error, Result};

const MAX_BUSY_RETRIES: u32 = 5;
const BASE_BACKOFF_MS: u64 = 25;
const DEFAULT_LIST_LIMIT: usize = 500;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://\S+$").unwrap());

/// Terms too common to narrow a search. Dropped from queries unless nothing else remains.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
    "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will", "with",
];

/// Map a driver error onto the store's taxonomy.
pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = e {
        match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                return Error::Busy(e.to_string())
            }
            ErrorCode::ConstraintViolation
                if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                return Error::Integrity(e.to_string())
            }
            _ => {}
        }
    }
    Error::Database(e.to_string())
}

/// SQLite store for pages and their extracted events.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the database at `db_path` and bring its schema up to date.
    ///
    /// A failing migration unit aborts the open with `Error::Migration`.
    pub fn open(db_path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Self::create_connection(&db_path, busy_timeout_ms)?;
        let report = Migrator::embedded().run(&mut conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        info!(
            "SqliteStore initialized: {} pages, {} events, {} migrations applied now, path={}",
            store.count_pages()?,
            store.count_events(None)?,
            report.applied.len(),
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path, busy_timeout_ms: u64) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
            .map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction, retrying on `Busy`.
    ///
    /// `f` may be called more than once; it must not have side effects
    /// outside the transaction.
    pub(crate) fn with_write_tx<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&Transaction<'_>) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let result = {
                let mut conn = self.conn.lock();
                conn.transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(db_err)
                    .and_then(|tx| {
                        let value = f(&tx)?;
                        tx.commit().map_err(db_err)?;
                        Ok(value)
                    })
            };

            match result {
                Err(Error::Busy(reason)) if attempt < MAX_BUSY_RETRIES => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    attempt += 1;
                    warn!(
                        "Database busy (attempt {}/{}), backing off {}ms: {}",
                        attempt,
                        MAX_BUSY_RETRIES,
                        backoff.as_millis(),
                        reason
                    );
                    std::thread::sleep(backoff);
                }
                other => return other,
            }
        }
    }

    // ---------------------------------------------------------------
    // Page CRUD
    // ---------------------------------------------------------------

    /// Insert or overwrite the page for `fetch.url`. Returns its id.
    pub fn upsert_page(&self, fetch: &PageFetch) -> Result<i64> {
        let url = validate_url(&fetch.url)?;
        let plain = fetch.content.as_deref().map(plain_text);
        let fetched_at = fetch
            .fetched_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));

        let page_id = self.with_write_tx(|tx| {
            upsert_page_tx(tx, url, fetch, plain.as_deref(), fetched_at.as_deref())
        })?;
        debug!("Upserted page {} -> {}", url, page_id);
        Ok(page_id)
    }

    /// Upsert a batch of fetches in one transaction.
    pub fn upsert_pages(&self, fetches: &[PageFetch]) -> Result<Vec<i64>> {
        let prepared = fetches
            .iter()
            .map(|f| {
                Ok((
                    validate_url(&f.url)?,
                    f,
                    f.content.as_deref().map(plain_text),
                    f.fetched_at
                        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let ids = self.with_write_tx(|tx| {
            prepared
                .iter()
                .map(|(url, fetch, plain, fetched_at)| {
                    upsert_page_tx(tx, url, fetch, plain.as_deref(), fetched_at.as_deref())
                })
                .collect::<Result<Vec<_>>>()
        })?;
        info!("Upserted {} pages", ids.len());
        Ok(ids)
    }

    pub fn get_page(&self, page_id: i64) -> Result<Option<Page>> {
        let conn = self.conn.lock();
        let page = conn
            .prepare_cached("SELECT * FROM pages WHERE page_id = ?1")
            .map_err(db_err)?
            .query_row(params![page_id], |row| Ok(Self::row_to_page(row)))
            .optional()
            .map_err(db_err)?;
        Ok(page)
    }

    pub fn get_page_by_url(&self, url: &str) -> Result<Option<Page>> {
        let conn = self.conn.lock();
        let page = conn
            .prepare_cached("SELECT * FROM pages WHERE page_url = ?1")
            .map_err(db_err)?
            .query_row(params![url.trim()], |row| Ok(Self::row_to_page(row)))
            .optional()
            .map_err(db_err)?;
        Ok(page)
    }

    /// Pages in id order, optionally restricted to one crawler config.
    pub fn list_pages(&self, filter: &PageFilter) -> Result<Vec<Page>> {
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT) as i64;
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM pages
                 WHERE (?1 IS NULL OR config_id = ?1)
                 ORDER BY page_id
                 LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![filter.config_id, limit], |row| {
                Ok(Self::row_to_page(row))
            })
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Delete a page and, by cascade, its events. Returns `false` if absent.
    pub fn delete_page(&self, page_id: i64) -> Result<bool> {
        let deleted = self.with_write_tx(|tx| {
            tx.execute("DELETE FROM pages WHERE page_id = ?1", params![page_id])
                .map_err(db_err)
        })?;
        Ok(deleted > 0)
    }

    /// Delete every page fetched under `config_id`. Returns the number removed.
    pub fn delete_pages_by_config(&self, config_id: &str) -> Result<usize> {
        let deleted = self.with_write_tx(|tx| {
            tx.execute("DELETE FROM pages WHERE config_id = ?1", params![config_id])
                .map_err(db_err)
        })?;
        info!("Deleted {} pages for config {}", deleted, config_id);
        Ok(deleted)
    }

    pub fn count_pages(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))
            .map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Event queries
    // ---------------------------------------------------------------

    pub fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        let conn = self.conn.lock();
        let event = conn
            .prepare_cached("SELECT * FROM events WHERE event_id = ?1")
            .map_err(db_err)?
            .query_row(params![event_id], |row| Ok(row_to_event(row)))
            .optional()
            .map_err(db_err)?;
        Ok(event)
    }

    /// Events matching every set field of `filter`.
    ///
    /// `filter.query` restricts to events whose owning page matches the
    /// full-text query; a query with no searchable terms matches nothing.
    pub fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(page_id) = filter.page_id {
            conditions.push(format!("e.page_id = ?{}", params.len() + 1));
            params.push(Box::new(page_id));
        }
        if let Some(valid) = filter.valid {
            conditions.push(format!("e.is_valid = ?{}", params.len() + 1));
            params.push(Box::new(valid));
        }
        if let Some(version) = &filter.extraction_version {
            conditions.push(format!("e.extraction_version = ?{}", params.len() + 1));
            params.push(Box::new(version.clone()));
        }
        if let Some(config_id) = &filter.config_id {
            conditions.push(format!("p.config_id = ?{}", params.len() + 1));
            params.push(Box::new(config_id.clone()));
        }
        if let Some(query) = &filter.query {
            let fts_query = sanitize_fts_query(query);
            if fts_query.is_empty() {
                return Ok(Vec::new());
            }
            conditions.push(format!(
                "e.page_id IN (SELECT rowid FROM pages_fts WHERE pages_fts MATCH ?{})",
                params.len() + 1
            ));
            params.push(Box::new(fts_query));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT e.* FROM events e JOIN pages p ON p.page_id = e.page_id{}
             ORDER BY e.page_id, COALESCE(NULLIF(e.dtstart, ''), e.start), e.event_id
             LIMIT {}",
            where_clause,
            filter.limit.unwrap_or(DEFAULT_LIST_LIMIT)
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| Ok(row_to_event(row)))
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Events whose owning page matches `query`, further narrowed by `filter`.
    pub fn search_events(&self, query: &str, filter: &EventFilter) -> Result<Vec<Event>> {
        let filter = EventFilter {
            query: Some(query.to_string()),
            ..filter.clone()
        };
        self.list_events(&filter)
    }

    pub fn count_events(&self, valid: Option<bool>) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM events WHERE (?1 IS NULL OR is_valid = ?1)",
            params![valid],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Full-text search
    // ---------------------------------------------------------------

    /// Pages whose plain text contains every searchable term, best match first.
    pub fn search_pages(&self, query: &str, limit: usize) -> Result<Vec<PageHit>> {
        let fts_query = sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let sql = "SELECT p.page_id, p.page_url, p.config_id, pages_fts.rank AS bm25_score, \
                          snippet(pages_fts, 0, '[', ']', '...', 16) AS snippet \
                   FROM pages_fts \
                   JOIN pages p ON p.page_id = pages_fts.rowid \
                   WHERE pages_fts MATCH ?1 \
                   ORDER BY pages_fts.rank \
                   LIMIT ?2";

        let mut stmt = conn.prepare_cached(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                let bm25_score: f64 = row.get("bm25_score").unwrap_or(0.0);
                Ok(PageHit {
                    page_id: row.get("page_id")?,
                    page_url: row.get("page_url")?,
                    config_id: row.get("config_id")?,
                    score: -bm25_score, // FTS5 rank is negative; negate for positive
                    snippet: row.get::<_, Option<String>>("snippet")?.unwrap_or_default(),
                })
            })
            .map_err(db_err)?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    pub fn get_stats(&self) -> Result<StoreStats> {
        let pages = self.count_pages()?;
        let events = self.count_events(None)?;
        let valid_events = self.count_events(Some(true))?;

        let conn = self.conn.lock();
        let migrations_applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .map_err(db_err)?;

        let mut events_by_version = BTreeMap::new();
        let mut stmt = conn
            .prepare_cached(
                "SELECT COALESCE(extraction_version, 'unknown'), COUNT(*)
                 FROM events GROUP BY 1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(db_err)?;
        for (version, count) in rows.flatten() {
            events_by_version.insert(version, count);
        }
        drop(stmt);
        drop(conn);

        let db_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            pages,
            events,
            valid_events,
            migrations_applied,
            events_by_version,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
        })
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    fn row_to_page(row: &rusqlite::Row<'_>) -> Page {
        Page {
            page_id: row.get("page_id").unwrap_or(0),
            page_url: row.get("page_url").unwrap_or_default(),
            page_content: row.get("page_content").ok().flatten(),
            plain_text: row.get("plain_text").ok().flatten(),
            http_status: row.get("http_status").ok().flatten(),
            fetched_at: parse_timestamp(row.get("fetched_at").ok().flatten()),
            config_id: row.get("config_id").ok().flatten(),
        }
    }
}

fn upsert_page_tx(
    tx: &Transaction<'_>,
    url: &str,
    fetch: &PageFetch,
    plain: Option<&str>,
    fetched_at: Option<&str>,
) -> Result<i64> {
    tx.prepare_cached(
        "INSERT INTO pages (page_url, page_content, plain_text, http_status, fetched_at, config_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(page_url) DO UPDATE SET
             page_content = excluded.page_content,
             plain_text   = excluded.plain_text,
             http_status  = excluded.http_status,
             fetched_at   = excluded.fetched_at,
             config_id    = excluded.config_id
         RETURNING page_id",
    )
    .map_err(db_err)?
    .query_row(
        params![
            url,
            fetch.content,
            plain,
            fetch.http_status,
            fetched_at,
            fetch.config_id
        ],
        |row| row.get(0),
    )
    .map_err(db_err)
}

fn validate_url(url: &str) -> Result<&str> {
    let url = url.trim();
    if URL_RE.is_match(url) {
        Ok(url)
    } else {
        Err(Error::InvalidInput(format!(
            "page url must be an absolute scheme://… identifier, got {:?}",
            url
        )))
    }
}

/// Sanitize a user query for FTS5 MATCH syntax.
///
/// Each term is quoted and terms are joined with spaces, which FTS5 reads as
/// AND. English stopwords are dropped unless the query consists only of them.
pub(crate) fn sanitize_fts_query(query: &str) -> String {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let meaningful: Vec<&String> = terms
        .iter()
        .filter(|t| !STOPWORDS.contains(&t.to_lowercase().as_str()))
        .collect();
    let chosen: Vec<&String> = if meaningful.is_empty() {
        terms.iter().collect()
    } else {
        meaningful
    };

    chosen
        .iter()
        .map(|t| format!("\"{}\"", t))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn json_list<T: DeserializeOwned>(value: Option<String>) -> Vec<T> {
    value
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub(crate) fn row_to_event(row: &rusqlite::Row<'_>) -> Event {
    let text = |col: &str| row.get::<_, Option<String>>(col).ok().flatten();
    let int = |col: &str| row.get::<_, Option<i64>>(col).ok().flatten();

    Event {
        event_id: row.get("event_id").unwrap_or(0),
        page_id: row.get("page_id").unwrap_or(0),
        fields: EventCandidate {
            uid: text("uid"),
            dtstamp: text("dtstamp"),
            dtstart: text("dtstart"),
            dtend: text("dtend"),
            duration: text("duration"),
            summary: text("summary"),
            description: text("description"),
            location: text("location"),
            url: text("url"),
            geo: text("geo"),
            categories: json_list(text("categories")),
            status: text("status"),
            transp: text("transp"),
            sequence: int("sequence"),
            created: text("created"),
            last_modified: text("last_modified"),
            organizer: text("organizer"),
            attendees: json_list(text("attendees")),
            attach: json_list(text("attach")),
            classification: text("classification"),
            priority: int("priority"),
            rrule: text("rrule"),
            rdate: json_list(text("rdate")),
            exdate: json_list(text("exdate")),
            recurrence_id: text("recurrence_id"),
            tzid: text("tzid"),
            alarms: json_list(text("alarms")),
            raw: text("raw"),
            title: text("title"),
            start: text("start"),
            extraction_version: text("extraction_version").unwrap_or_default(),
        },
        extracted_at: parse_timestamp(text("extracted_at")).unwrap_or_default(),
        created_at: parse_timestamp(text("created_at")).unwrap_or_default(),
        updated_at: parse_timestamp(text("updated_at")).unwrap_or_default(),
        is_valid: row.get::<_, bool>("is_valid").unwrap_or(false),
        content_hash: text("content_hash"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("infracal.db"), 5000).unwrap();
        (store, dir)
    }

    fn fetch(url: &str, content: &str, config: &str) -> PageFetch {
        PageFetch {
            url: url.into(),
            content: Some(content.into()),
            http_status: Some(200),
            fetched_at: Some(Utc::now()),
            config_id: Some(config.into()),
        }
    }

    fn kickoff() -> EventCandidate {
        EventCandidate {
            uid: Some("kickoff@example.org".into()),
            summary: Some("Kickoff".into()),
            dtstart: Some("2025-03-01T10:00:00".into()),
            extraction_version: "vevent-1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_page_overwrites_by_url() {
        let (store, _dir) = test_store();

        let first = store
            .upsert_page(&fetch("https://example.org/a", "<p>first body</p>", "c1"))
            .unwrap();
        let mut refetch = fetch("https://example.org/a", "<p>second body</p>", "c2");
        refetch.http_status = Some(304);
        let second = store.upsert_page(&refetch).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count_pages().unwrap(), 1);

        let page = store.get_page(first).unwrap().unwrap();
        assert_eq!(page.page_content.as_deref(), Some("<p>second body</p>"));
        assert_eq!(page.plain_text.as_deref(), Some("second body"));
        assert_eq!(page.http_status, Some(304));
        assert_eq!(page.config_id.as_deref(), Some("c2"));
        assert!(page.fetched_at.is_some());

        let by_url = store.get_page_by_url("https://example.org/a").unwrap().unwrap();
        assert_eq!(by_url.page_id, first);
    }

    #[test]
    fn test_upsert_page_rejects_relative_url() {
        let (store, _dir) = test_store();
        for bad in ["", "   ", "/relative/path", "example.org/page"] {
            let err = store.upsert_page(&fetch(bad, "x", "c1")).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{bad:?}");
        }
        assert_eq!(store.count_pages().unwrap(), 0);
    }

    #[test]
    fn test_upsert_pages_batch() {
        let (store, _dir) = test_store();
        let ids = store
            .upsert_pages(&[
                fetch("https://example.org/1", "one", "c1"),
                fetch("https://example.org/2", "two", "c1"),
                fetch("https://example.org/1", "one again", "c1"),
            ])
            .unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], ids[2]);
        assert_eq!(store.count_pages().unwrap(), 2);
    }

    #[test]
    fn test_delete_page_cascades_to_events() {
        let (store, _dir) = test_store();
        let page_id = store
            .upsert_page(&fetch("https://example.org/cal", "calendar", "c1"))
            .unwrap();
        store.reconcile(page_id, &kickoff()).unwrap();
        assert_eq!(store.count_events(None).unwrap(), 1);

        assert!(store.delete_page(page_id).unwrap());
        assert_eq!(store.count_events(None).unwrap(), 0);
        assert!(store.get_page(page_id).unwrap().is_none());
        assert!(!store.delete_page(page_id).unwrap());
    }

    #[test]
    fn test_delete_pages_by_config() {
        let (store, _dir) = test_store();
        store.upsert_page(&fetch("https://a.example/1", "x", "keep")).unwrap();
        let gone = store.upsert_page(&fetch("https://a.example/2", "y", "drop")).unwrap();
        store.upsert_page(&fetch("https://a.example/3", "z", "drop")).unwrap();
        store.reconcile(gone, &kickoff()).unwrap();

        assert_eq!(store.delete_pages_by_config("drop").unwrap(), 2);
        assert_eq!(store.count_pages().unwrap(), 1);
        assert_eq!(store.count_events(None).unwrap(), 0);

        let left = store
            .list_pages(&PageFilter {
                config_id: Some("keep".into()),
                limit: None,
            })
            .unwrap();
        assert_eq!(left.len(), 1);
    }

    #[test]
    fn test_search_tracks_page_updates() {
        let (store, _dir) = test_store();
        let id = store
            .upsert_page(&fetch(
                "https://example.org/news",
                "<h1>Reservoir cleanup</h1><p>Volunteers meeting at the lake</p>",
                "c1",
            ))
            .unwrap();

        let hits = store.search_pages("reservoir", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page_id, id);
        assert!(hits[0].score > 0.0);
        assert!(hits[0].snippet.contains("[Reservoir]"));

        // Stemming: "meetings" matches "meeting".
        assert_eq!(store.search_pages("meetings", 10).unwrap().len(), 1);

        store
            .upsert_page(&fetch("https://example.org/news", "<p>Trail maintenance day</p>", "c1"))
            .unwrap();
        assert!(store.search_pages("reservoir", 10).unwrap().is_empty());
        assert_eq!(store.search_pages("trail", 10).unwrap().len(), 1);

        store.delete_page(id).unwrap();
        assert!(store.search_pages("trail", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_requires_all_terms() {
        let (store, _dir) = test_store();
        store
            .upsert_page(&fetch("https://example.org/1", "quarterly infrastructure review", "c"))
            .unwrap();
        store
            .upsert_page(&fetch("https://example.org/2", "quarterly budget", "c"))
            .unwrap();

        assert_eq!(store.search_pages("quarterly", 10).unwrap().len(), 2);
        assert_eq!(store.search_pages("quarterly review", 10).unwrap().len(), 1);
        assert_eq!(store.search_pages("the quarterly review", 10).unwrap().len(), 1);
        assert!(store.search_pages("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_fts_query() {
        assert_eq!(sanitize_fts_query("the Kickoff \"meeting\""), "\"Kickoff\" \"meeting\"");
        assert_eq!(sanitize_fts_query("the"), "\"the\"");
        assert_eq!(sanitize_fts_query("OR AND NEAR("), "\"NEAR\"");
        assert_eq!(sanitize_fts_query(""), "");
    }

    #[test]
    fn test_list_events_filters() {
        let (store, _dir) = test_store();
        let a = store
            .upsert_page(&fetch("https://example.org/a", "hiking club schedule", "trails"))
            .unwrap();
        let b = store
            .upsert_page(&fetch("https://example.org/b", "board minutes", "civic"))
            .unwrap();

        store.reconcile(a, &kickoff()).unwrap();
        let nameless = EventCandidate {
            dtstart: Some("2025-04-01".into()),
            extraction_version: "text-1".into(),
            ..Default::default()
        };
        store.reconcile(b, &nameless).unwrap();

        let all = store.list_events(&EventFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let valid = store
            .list_events(&EventFilter {
                valid: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].fields.summary.as_deref(), Some("Kickoff"));

        let by_version = store
            .list_events(&EventFilter {
                extraction_version: Some("text-1".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_version.len(), 1);
        assert_eq!(by_version[0].page_id, b);

        let by_config = store
            .list_events(&EventFilter {
                config_id: Some("trails".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_config.len(), 1);

        let by_text = store.search_events("hiking", &EventFilter::default()).unwrap();
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].page_id, a);
    }

    #[test]
    fn test_event_round_trips_structured_fields() {
        let (store, _dir) = test_store();
        let page = store
            .upsert_page(&fetch("https://example.org/ics", "x", "c"))
            .unwrap();
        let mut c = kickoff();
        c.categories = vec!["infra".into(), "planning".into()];
        c.attendees = vec![Attendee {
            address: "mailto:ops@example.org".into(),
            common_name: Some("Ops".into()),
            rsvp: Some(true),
            ..Default::default()
        }];
        c.alarms = vec![Alarm {
            action: Some("DISPLAY".into()),
            trigger: Some("-PT15M".into()),
            ..Default::default()
        }];
        c.sequence = Some(2);

        let id = store.reconcile(page, &c).unwrap().event_id().unwrap();
        let event = store.get_event(id).unwrap().unwrap();
        assert_eq!(event.fields, c);
        assert!(event.is_valid);
        assert_eq!(event.content_hash, crate::hash::content_hash(&c));
    }

    #[test]
    fn test_stats() {
        let (store, _dir) = test_store();
        let page = store
            .upsert_page(&fetch("https://example.org/s", "x", "c"))
            .unwrap();
        store.reconcile(page, &kickoff()).unwrap();

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.events, 1);
        assert_eq!(stats.valid_events, 1);
        assert_eq!(
            stats.migrations_applied as usize,
            crate::schema::EMBEDDED_MIGRATIONS.len()
        );
        assert_eq!(stats.events_by_version.get("vevent-1"), Some(&1));
    }
}
