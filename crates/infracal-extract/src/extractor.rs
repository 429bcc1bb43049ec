//! Versioned extraction strategies.

use crate::heuristic::TextExtractor;
use crate::vevent::{self, VeventExtractor};
use infracal_core::{Error, Result};
use infracal_store::EventCandidate;

/// Turns raw page content into event candidates.
///
/// Implementations are pure: same content, same candidates. Each candidate
/// carries the extractor's version string.
pub trait Extractor: Send + Sync {
    fn version(&self) -> &'static str;
    fn extract(&self, content: &str) -> Vec<EventCandidate>;
}

pub const LAYERED_VERSION: &str = "layered-1";

/// Every registered extractor version.
pub const VERSIONS: &[&str] = &[vevent::VERSION, crate::heuristic::VERSION, LAYERED_VERSION];

/// `vevent-1` when the page embeds iCalendar data, `text-1` otherwise or
/// when the embedded blocks yield nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayeredExtractor;

impl Extractor for LayeredExtractor {
    fn version(&self) -> &'static str {
        LAYERED_VERSION
    }

    fn extract(&self, content: &str) -> Vec<EventCandidate> {
        let mut candidates = if vevent::has_vevent(content) {
            VeventExtractor.extract(content)
        } else {
            Vec::new()
        };
        if candidates.is_empty() {
            candidates = TextExtractor.extract(content);
        }
        candidates
            .into_iter()
            .map(|mut c| {
                c.extraction_version = LAYERED_VERSION.to_string();
                c
            })
            .collect()
    }
}

pub fn extractor_for(version: &str) -> Result<Box<dyn Extractor>> {
    match version.trim() {
        v if v == vevent::VERSION => Ok(Box::new(VeventExtractor)),
        v if v == crate::heuristic::VERSION => Ok(Box::new(TextExtractor)),
        LAYERED_VERSION => Ok(Box::new(LayeredExtractor)),
        other => Err(Error::UnknownExtractor(other.to_string())),
    }
}

/// Extract candidates from `content` with the named extractor version.
pub fn extract(content: &str, version: &str) -> Result<Vec<EventCandidate>> {
    Ok(extractor_for(version)?.extract(content))
}
