use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use infracal_store::{
    EventCandidate, EventFilter, Migrator, PageFetch, ReconcileOutcome, SqliteStore,
};
use tempfile::TempDir;

fn page(url: &str, content: &str) -> PageFetch {
    PageFetch {
        url: url.into(),
        content: Some(content.into()),
        http_status: Some(200),
        fetched_at: Some(Utc::now()),
        config_id: Some("city-calendar".into()),
    }
}

fn kickoff(summary: &str) -> EventCandidate {
    EventCandidate {
        uid: Some("kickoff@infra.example".into()),
        summary: Some(summary.into()),
        dtstart: Some("2025-03-01T10:00:00".into()),
        extraction_version: "vevent-1".into(),
        ..Default::default()
    }
}

#[test]
fn reopening_applies_no_migrations() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("infracal.db");
    drop(SqliteStore::open(&path, 5000).unwrap());

    let mut conn = rusqlite::Connection::open(&path).unwrap();
    let report = Migrator::embedded().run(&mut conn).unwrap();
    assert!(report.applied.is_empty());

    let store = SqliteStore::open(&path, 5000).unwrap();
    let stats = store.get_stats().unwrap();
    assert_eq!(stats.migrations_applied as usize, Migrator::embedded().units().len());
}

#[test]
fn kickoff_rename_supersedes_in_place() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("infracal.db"), 5000).unwrap();
    let page_id = store
        .upsert_page(&page("https://infra.example/calendar", "Kickoff on March 1"))
        .unwrap();

    let first = store.reconcile(page_id, &kickoff("Kickoff")).unwrap();
    let id = match first {
        ReconcileOutcome::Inserted(id) => id,
        other => panic!("expected insert, got {other:?}"),
    };
    assert_eq!(
        store.reconcile(page_id, &kickoff("Kickoff")).unwrap(),
        ReconcileOutcome::Unchanged(id)
    );

    let before = store.get_event(id).unwrap().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(
        store.reconcile(page_id, &kickoff("Kickoff Meeting")).unwrap(),
        ReconcileOutcome::Superseded(id)
    );

    let events = store
        .list_events(&EventFilter {
            page_id: Some(page_id),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].fields.summary.as_deref(), Some("Kickoff Meeting"));
    assert!(events[0].updated_at > before.updated_at);
}

#[test]
fn concurrent_writers_store_one_event() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("infracal.db");
    let first = Arc::new(SqliteStore::open(&path, 5000).unwrap());
    let second = Arc::new(SqliteStore::open(&path, 5000).unwrap());
    let page_id = first
        .upsert_page(&page("https://infra.example/shared", "shared page"))
        .unwrap();

    let handles: Vec<_> = [first.clone(), second.clone(), first.clone(), second.clone()]
        .into_iter()
        .map(|store| {
            std::thread::spawn(move || {
                for _ in 0..10 {
                    store.reconcile(page_id, &kickoff("Kickoff")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(first.count_events(None).unwrap(), 1);
    assert_eq!(second.count_events(Some(true)).unwrap(), 1);
}

#[test]
fn concurrent_upserts_keep_one_page_per_url() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("infracal.db");
    let stores: Vec<Arc<SqliteStore>> = (0..2)
        .map(|_| Arc::new(SqliteStore::open(&path, 5000).unwrap()))
        .collect();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = stores[i % 2].clone();
            std::thread::spawn(move || {
                store
                    .upsert_page(&page("https://infra.example/race", &format!("body {i}")))
                    .unwrap()
            })
        })
        .collect();
    let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(stores[0].count_pages().unwrap(), 1);
}

#[test]
fn deleting_config_removes_search_hits_and_events() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("infracal.db"), 5000).unwrap();
    let page_id = store
        .upsert_page(&page(
            "https://infra.example/water",
            "<h2>Water main replacement</h2><p>Crews at Lake Street</p>",
        ))
        .unwrap();
    store.reconcile(page_id, &kickoff("Water main briefing")).unwrap();

    assert_eq!(store.search_pages("water main", 5).unwrap().len(), 1);
    assert_eq!(store.delete_pages_by_config("city-calendar").unwrap(), 1);
    assert!(store.search_pages("water main", 5).unwrap().is_empty());
    assert_eq!(store.count_events(None).unwrap(), 0);
}
