//! InfraCalendar server — HTTP API, background extraction worker and CLI commands.

pub mod cli;
pub mod routes;
pub mod state;
pub mod worker;

pub use routes::build_router;
pub use state::AppState;
