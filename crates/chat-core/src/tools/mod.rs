//! Tool catalogue and execution.

mod executor;
mod registry;

pub use executor::{ToolContext, ToolHandler, execute};
pub use registry::{ToolRegistry, ToolSettings, model_allowed};
