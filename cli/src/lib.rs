// kdrift library exposing the diffing core for the binary and tests
//
// The binary in main.rs stays separate so tests can drive the full diff
// pass against mock resource managers.

pub mod differ;
pub mod inventory;
pub mod manager;
pub mod report;
pub mod resource;
pub mod secrets;

// Re-export key types for caller convenience
pub use differ::{Action, ChangeRecord, DiffOutcome, Differ, DriftError, DriftResult};
pub use inventory::{Inventory, ObjectId};
pub use manager::{ApplyAction, DiffOptions, ManagerDiff, ResourceManager};
pub use resource::DesiredObject;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_VERSION: Option<&str> = option_env!("BUILD_VERSION");

// Test modules
#[cfg(test)]
pub mod tests;
