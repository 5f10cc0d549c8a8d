//! Rescue execution: the typed error union, the orchestrator state machine and the
//! admission front door that serializes attempts per compromised address.

mod admission;
mod error;
mod orchestrator;

pub use admission::{Numeric, RescueAdmission, RescueRequest, RescueResponse, ValidatedRescue};
pub use error::RescueError;
pub use orchestrator::{
    BudgetMode, DEFAULT_MAX_BLOCK_WINDOW, RescueOrchestrator, RescueOutcome, RescuePlan,
};
