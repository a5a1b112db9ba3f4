// Public wire contracts for the model lifecycle manager.
// DTOs only — no I/O, no lifecycle logic.

pub mod error;
pub mod model;
pub mod tool;

pub use error::{ErrorKind, ErrorResponse};
pub use model::{EngineKind, ModelSpec, ModelState, RuntimeView, StartupProgress};
pub use tool::{ChatRole, ChatTurn, ToolCall, ToolResult};
