//! Dedup and versioning: decides whether a candidate is new, unchanged, or a
//! newer version of an event already stored for the page.

use std::collections::HashSet;

use rusqlite::types::ToSql;
use rusqlite::{params, OptionalExtension, Transaction};
use serde::Serialize;
use tracing::{debug, warn};

use crate::hash::{content_hash, normalize_field};
use crate::sqlite::{db_err, SqliteStore};
use crate::types::{EventCandidate, ReconcileOutcome};
use crate::validity::classify;
use infracal_core::Result;

/// JSON encodings of the list-valued columns. Empty lists are stored as NULL.
struct EncodedLists {
    categories: Option<String>,
    attendees: Option<String>,
    attach: Option<String>,
    rdate: Option<String>,
    exdate: Option<String>,
    alarms: Option<String>,
}

impl EncodedLists {
    fn new(c: &EventCandidate) -> Result<Self> {
        Ok(Self {
            categories: encode_list(&c.categories)?,
            attendees: encode_list(&c.attendees)?,
            attach: encode_list(&c.attach)?,
            rdate: encode_list(&c.rdate)?,
            exdate: encode_list(&c.exdate)?,
            alarms: encode_list(&c.alarms)?,
        })
    }
}

fn encode_list<T: Serialize>(items: &[T]) -> Result<Option<String>> {
    if items.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(items)?))
    }
}

/// Named parameters for every content column. Both write statements are
/// derived from this list.
fn content_params<'a>(
    c: &'a EventCandidate,
    lists: &'a EncodedLists,
    is_valid: &'a bool,
    hash: &'a String,
) -> Vec<(&'static str, &'a dyn ToSql)> {
    let columns: [(&'static str, &'a dyn ToSql); 33] = [
        (":uid", &c.uid),
        (":dtstamp", &c.dtstamp),
        (":dtstart", &c.dtstart),
        (":dtend", &c.dtend),
        (":duration", &c.duration),
        (":summary", &c.summary),
        (":description", &c.description),
        (":location", &c.location),
        (":url", &c.url),
        (":geo", &c.geo),
        (":categories", &lists.categories),
        (":status", &c.status),
        (":transp", &c.transp),
        (":sequence", &c.sequence),
        (":created", &c.created),
        (":last_modified", &c.last_modified),
        (":organizer", &c.organizer),
        (":attendees", &lists.attendees),
        (":attach", &lists.attach),
        (":classification", &c.classification),
        (":priority", &c.priority),
        (":rrule", &c.rrule),
        (":rdate", &lists.rdate),
        (":exdate", &lists.exdate),
        (":recurrence_id", &c.recurrence_id),
        (":tzid", &c.tzid),
        (":alarms", &lists.alarms),
        (":raw", &c.raw),
        (":title", &c.title),
        (":start", &c.start),
        (":extraction_version", &c.extraction_version),
        (":is_valid", is_valid),
        (":content_hash", hash),
    ];
    columns.to_vec()
}

fn column(param: &str) -> &str {
    param.trim_start_matches(':')
}

fn insert_sql(params: &[(&str, &dyn ToSql)]) -> String {
    let columns: Vec<&str> = params.iter().map(|(p, _)| column(p)).collect();
    let values: Vec<&str> = params.iter().map(|(p, _)| *p).collect();
    format!(
        "INSERT INTO events (page_id, {}) VALUES (:page_id, {})",
        columns.join(", "),
        values.join(", ")
    )
}

fn update_sql(params: &[(&str, &dyn ToSql)]) -> String {
    let sets: Vec<String> = params
        .iter()
        .map(|(p, _)| format!("{} = {}", column(p), p))
        .collect();
    format!(
        "UPDATE events SET {}, extracted_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
         WHERE event_id = :event_id",
        sets.join(", ")
    )
}

/// Find the stored event this candidate is a version of.
///
/// With a `uid` the key is `(uid, recurrence_id)`. Without one it is
/// `(dtstart or start, summary or title)`, matched only against events that
/// also lack a `uid`. Rows in `claimed` already belong to another candidate
/// of the same batch and are skipped. The most recently updated row wins.
fn find_by_identity(
    tx: &Transaction<'_>,
    page_id: i64,
    c: &EventCandidate,
    claimed: &HashSet<i64>,
) -> Result<Option<i64>> {
    let ids: Vec<i64> = if let Some(uid) = normalize_field(c.uid.as_deref()) {
        let recurrence = normalize_field(c.recurrence_id.as_deref()).unwrap_or_default();
        let mut stmt = tx
            .prepare_cached(
                "SELECT event_id FROM events
                 WHERE page_id = ?1
                   AND TRIM(uid) = ?2
                   AND COALESCE(TRIM(recurrence_id), '') = ?3
                 ORDER BY updated_at DESC, event_id DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![page_id, uid, recurrence], |row| row.get(0))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<_>>().map_err(db_err)?
    } else {
        let start =
            normalize_field(c.dtstart.as_deref()).or_else(|| normalize_field(c.start.as_deref()));
        let name =
            normalize_field(c.summary.as_deref()).or_else(|| normalize_field(c.title.as_deref()));
        let (Some(start), Some(name)) = (start, name) else {
            return Ok(None);
        };
        let mut stmt = tx
            .prepare_cached(
                "SELECT event_id FROM events
                 WHERE page_id = ?1
                   AND COALESCE(TRIM(uid), '') = ''
                   AND COALESCE(NULLIF(TRIM(dtstart), ''), TRIM(start)) = ?2
                   AND COALESCE(NULLIF(TRIM(summary), ''), TRIM(title)) = ?3
                 ORDER BY updated_at DESC, event_id DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![page_id, start, name], |row| row.get(0))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<_>>().map_err(db_err)?
    };

    Ok(ids.into_iter().find(|id| !claimed.contains(id)))
}

fn find_by_hash(tx: &Transaction<'_>, page_id: i64, hash: &str) -> Result<Option<i64>> {
    tx.prepare_cached("SELECT event_id FROM events WHERE page_id = ?1 AND content_hash = ?2")
        .map_err(db_err)?
        .query_row(params![page_id, hash], |row| row.get(0))
        .optional()
        .map_err(db_err)
}

/// Reconcile one candidate inside an open write transaction.
///
/// The event id of every non-discarded outcome is added to `claimed`.
pub(crate) fn reconcile_in_tx(
    tx: &Transaction<'_>,
    page_id: i64,
    candidate: &EventCandidate,
    claimed: &mut HashSet<i64>,
) -> Result<ReconcileOutcome> {
    let Some(hash) = content_hash(candidate) else {
        warn!(
            "Discarding candidate with no content on page {} ({})",
            page_id, candidate.extraction_version
        );
        return Ok(ReconcileOutcome::Discarded);
    };

    if let Some(event_id) = find_by_hash(tx, page_id, &hash)? {
        debug!("Event {} unchanged on page {}", event_id, page_id);
        claimed.insert(event_id);
        return Ok(ReconcileOutcome::Unchanged(event_id));
    }

    let existing = find_by_identity(tx, page_id, candidate, claimed)?;
    let is_valid = classify(candidate);
    let lists = EncodedLists::new(candidate)?;
    let mut params = content_params(candidate, &lists, &is_valid, &hash);

    if let Some(event_id) = existing.as_ref() {
        let sql = update_sql(&params);
        params.push((":event_id", event_id as &dyn ToSql));
        tx.prepare_cached(&sql)
            .map_err(db_err)?
            .execute(params.as_slice())
            .map_err(db_err)?;
        debug!("Event {} superseded on page {}", event_id, page_id);
        claimed.insert(*event_id);
        return Ok(ReconcileOutcome::Superseded(*event_id));
    }

    let sql = insert_sql(&params);
    params.push((":page_id", &page_id as &dyn ToSql));
    tx.prepare_cached(&sql)
        .map_err(db_err)?
        .execute(params.as_slice())
        .map_err(db_err)?;
    let event_id = tx.last_insert_rowid();
    debug!("Event {} inserted on page {}", event_id, page_id);
    claimed.insert(event_id);
    Ok(ReconcileOutcome::Inserted(event_id))
}

impl SqliteStore {
    /// Reconcile one candidate against the events already stored for `page_id`.
    pub fn reconcile(&self, page_id: i64, candidate: &EventCandidate) -> Result<ReconcileOutcome> {
        self.with_write_tx(|tx| reconcile_in_tx(tx, page_id, candidate, &mut HashSet::new()))
    }

    /// Reconcile a page's whole candidate batch in one transaction.
    ///
    /// Candidates whose content is already stored are resolved first, so a
    /// changed candidate can only take over a row no unchanged candidate
    /// owns. Outcomes keep the order of `candidates`. Either every outcome
    /// is committed or none is.
    pub fn reconcile_all(
        &self,
        page_id: i64,
        candidates: &[EventCandidate],
    ) -> Result<Vec<ReconcileOutcome>> {
        self.with_write_tx(|tx| {
            let mut claimed = HashSet::new();
            let mut outcomes: Vec<Option<ReconcileOutcome>> = Vec::with_capacity(candidates.len());
            for c in candidates {
                let hit = match content_hash(c) {
                    Some(hash) => find_by_hash(tx, page_id, &hash)?,
                    None => None,
                };
                outcomes.push(hit.map(|event_id| {
                    claimed.insert(event_id);
                    ReconcileOutcome::Unchanged(event_id)
                }));
            }

            candidates
                .iter()
                .zip(outcomes)
                .map(|(c, resolved)| match resolved {
                    Some(outcome) => Ok(outcome),
                    None => reconcile_in_tx(tx, page_id, c, &mut claimed),
                })
                .collect()
        })
    }
}
