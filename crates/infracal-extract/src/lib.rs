//! InfraCalendar Extract — versioned event extractors, iCalendar normalization and export.

pub mod extractor;
pub mod heuristic;
pub mod ics;
pub mod normalize;
pub mod pipeline;
pub mod vevent;

pub use extractor::{extract, extractor_for, Extractor, LayeredExtractor, VERSIONS};
pub use heuristic::TextExtractor;
pub use ics::format_ical;
pub use pipeline::{ExtractionReport, PageReport, Pipeline};
pub use vevent::VeventExtractor;
