//! Service Module
//!
//! Business logic of the engine. Services orchestrate between repositories,
//! the filesystem catalog and the task queue.

pub mod completion;
pub mod definition;
pub mod dispatch;
pub mod failure;
pub mod run;
pub mod template;

// Re-export for convenience
pub use completion::{Completion, CompletionHandler};
pub use definition::DefinitionStore;
pub use dispatch::{DispatchMetadata, Dispatcher};
pub use run::RunService;
pub use template::{CommandPlan, FileResolver};
