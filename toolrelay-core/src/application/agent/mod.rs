mod errors;
mod models;
mod runner;
mod state;

pub use errors::{CycleError, ErrorKind};
pub use models::CycleOutcome;
pub use runner::Orchestrator;
pub use state::CycleState;
