//! Embedded schema-change units and the shape `validate` expects.

/// Ordered `(filename, sql)` pairs compiled into the binary.
pub const EMBEDDED_MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_create_pages.sql",
        include_str!("../migrations/0001_create_pages.sql"),
    ),
    (
        "0002_create_events.sql",
        include_str!("../migrations/0002_create_events.sql"),
    ),
    (
        "0003_pages_fts.sql",
        include_str!("../migrations/0003_pages_fts.sql"),
    ),
    (
        "0004_event_dedup_indexes.sql",
        include_str!("../migrations/0004_event_dedup_indexes.sql"),
    ),
    (
        "0005_events_touch_updated_at.sql",
        include_str!("../migrations/0005_events_touch_updated_at.sql"),
    ),
];

/// Tracking table for applied units. Created outside any unit.
pub const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    filename   TEXT NOT NULL UNIQUE,
    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
"#;

/// Tables and the columns each must carry once every unit has applied.
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("migrations", &["id", "filename", "applied_at"]),
    (
        "pages",
        &[
            "page_id",
            "page_url",
            "page_content",
            "plain_text",
            "http_status",
            "fetched_at",
            "config_id",
        ],
    ),
    (
        "events",
        &[
            "event_id",
            "page_id",
            "uid",
            "dtstamp",
            "dtstart",
            "summary",
            "raw",
            "title",
            "start",
            "extracted_at",
            "created_at",
            "updated_at",
            "extraction_version",
            "is_valid",
            "content_hash",
        ],
    ),
    ("pages_fts", &["plain_text"]),
];
