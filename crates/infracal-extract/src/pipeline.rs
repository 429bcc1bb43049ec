//! Extraction pipeline: stored page → candidates → reconciled events.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::extractor::{extractor_for, Extractor};
use infracal_core::Result;
use infracal_store::{Page, PageFilter, ReconcileOutcome, SqliteStore};

/// What happened to one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    pub page_id: i64,
    pub candidates: usize,
    pub outcomes: Vec<ReconcileOutcome>,
}

/// Totals over an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub extraction_version: String,
    pub pages: usize,
    pub candidates: usize,
    pub inserted: usize,
    pub unchanged: usize,
    pub superseded: usize,
    pub discarded: usize,
    pub pages_without_events: usize,
    /// Pages skipped after a non-fatal store error.
    pub failed_pages: usize,
}

impl ExtractionReport {
    fn absorb(&mut self, page: &PageReport) {
        self.pages += 1;
        self.candidates += page.candidates;
        if page.candidates == 0 {
            self.pages_without_events += 1;
        }
        for outcome in &page.outcomes {
            match outcome {
                ReconcileOutcome::Inserted(_) => self.inserted += 1,
                ReconcileOutcome::Unchanged(_) => self.unchanged += 1,
                ReconcileOutcome::Superseded(_) => self.superseded += 1,
                ReconcileOutcome::Discarded => self.discarded += 1,
            }
        }
    }
}

/// Runs extractors over stored pages and reconciles the results.
pub struct Pipeline<'a> {
    store: &'a SqliteStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Extract one page, then reconcile all of its candidates in a single
    /// transaction.
    pub fn extract_page(&self, page: &Page, extractor: &dyn Extractor) -> Result<PageReport> {
        let content = page.page_content.as_deref().unwrap_or("");
        let candidates = extractor.extract(content);
        debug!(
            "Page {} ({}): {} candidate(s) from {}",
            page.page_id,
            page.page_url,
            candidates.len(),
            extractor.version()
        );

        let outcomes = if candidates.is_empty() {
            Vec::new()
        } else {
            self.store.reconcile_all(page.page_id, &candidates)?
        };
        Ok(PageReport {
            page_id: page.page_id,
            candidates: candidates.len(),
            outcomes,
        })
    }

    /// Extract every page matching `filter` with the named extractor version.
    pub fn run(&self, filter: &PageFilter, version: &str) -> Result<ExtractionReport> {
        self.run_with_progress(filter, version, |_, _| {})
    }

    /// As [`Pipeline::run`], calling `progress(done, total)` after each page.
    ///
    /// Fatal errors abort the run; any other per-page failure is logged and
    /// counted in `failed_pages`.
    pub fn run_with_progress<F>(
        &self,
        filter: &PageFilter,
        version: &str,
        mut progress: F,
    ) -> Result<ExtractionReport>
    where
        F: FnMut(usize, usize),
    {
        let extractor = extractor_for(version)?;
        let pages = self.store.list_pages(filter)?;
        let total = pages.len();
        info!("Extracting {} page(s) with {}", total, extractor.version());

        let mut report = ExtractionReport {
            extraction_version: extractor.version().to_string(),
            ..Default::default()
        };
        for (i, page) in pages.iter().enumerate() {
            match self.extract_page(page, extractor.as_ref()) {
                Ok(page_report) => report.absorb(&page_report),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Extraction failed for page {}: {}", page.page_id, e);
                    report.failed_pages += 1;
                }
            }
            progress(i + 1, total);
        }

        info!(
            "Extraction done: {} inserted, {} unchanged, {} superseded, {} discarded",
            report.inserted, report.unchanged, report.superseded, report.discarded
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infracal_core::Error;
    use infracal_store::{EventFilter, PageFetch};
    use tempfile::TempDir;

    const CALENDAR: &str = "<pre>BEGIN:VEVENT\nUID:kickoff@city.example\nSUMMARY:Kickoff\n\
                            DTSTART:20250301T100000\nEND:VEVENT</pre>";
    const RENAMED: &str = "<pre>BEGIN:VEVENT\nUID:kickoff@city.example\nSUMMARY:Kickoff Meeting\n\
                           DTSTART:20250301T100000\nEND:VEVENT</pre>";

    fn setup() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("infracal.db"), 5000).unwrap();
        (store, dir)
    }

    fn fetch(url: &str, content: &str) -> PageFetch {
        PageFetch {
            url: url.into(),
            content: Some(content.into()),
            config_id: Some("city".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_run_inserts_then_unchanged() {
        let (store, _dir) = setup();
        store.upsert_page(&fetch("https://city.example/ics", CALENDAR)).unwrap();
        store
            .upsert_page(&fetch(
                "https://city.example/hike",
                "<h2>Fun Hike</h2><p>January 10, 2026 10:00 AM</p><p>Join us for a hike</p>",
            ))
            .unwrap();
        store
            .upsert_page(&fetch("https://city.example/about", "<p>About the department</p>"))
            .unwrap();

        let pipeline = Pipeline::new(&store);
        let first = pipeline.run(&PageFilter::default(), "layered-1").unwrap();
        assert_eq!(first.pages, 3);
        assert_eq!(first.candidates, 2);
        assert_eq!(first.inserted, 2);
        assert_eq!(first.pages_without_events, 1);

        let second = pipeline.run(&PageFilter::default(), "layered-1").unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(store.count_events(Some(true)).unwrap(), 2);
    }

    #[test]
    fn test_recrawl_supersedes() {
        let (store, _dir) = setup();
        let page_id = store.upsert_page(&fetch("https://city.example/ics", CALENDAR)).unwrap();
        let pipeline = Pipeline::new(&store);
        pipeline.run(&PageFilter::default(), "vevent-1").unwrap();

        store.upsert_page(&fetch("https://city.example/ics", RENAMED)).unwrap();
        let report = pipeline.run(&PageFilter::default(), "vevent-1").unwrap();
        assert_eq!(report.superseded, 1);

        let events = store
            .list_events(&EventFilter {
                page_id: Some(page_id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fields.summary.as_deref(), Some("Kickoff Meeting"));
        assert_eq!(events[0].fields.extraction_version, "vevent-1");
    }

    #[test]
    fn test_unknown_version_rejected() {
        let (store, _dir) = setup();
        match Pipeline::new(&store).run(&PageFilter::default(), "nlp-2") {
            Err(Error::UnknownExtractor(v)) => assert_eq!(v, "nlp-2"),
            other => panic!("expected UnknownExtractor, got {other:?}"),
        }
    }

    #[test]
    fn test_progress_and_config_filter() {
        let (store, _dir) = setup();
        store.upsert_page(&fetch("https://city.example/ics", CALENDAR)).unwrap();
        store
            .upsert_page(&PageFetch {
                url: "https://county.example/ics".into(),
                content: Some(CALENDAR.into()),
                config_id: Some("county".into()),
                ..Default::default()
            })
            .unwrap();

        let mut seen = Vec::new();
        let report = Pipeline::new(&store)
            .run_with_progress(
                &PageFilter {
                    config_id: Some("county".into()),
                    ..Default::default()
                },
                "layered-1",
                |done, total| seen.push((done, total)),
            )
            .unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(seen, vec![(1, 1)]);
    }
}
