// Actions Module
// Reusable action metadata and resolution

pub mod manifest;
pub mod resolver;

pub use manifest::{ActionError, ActionInput, ActionMetadata, ActionOutput, ActionRuns, ActionRuntime};
pub use resolver::{ActionRef, ActionResolver, LocalActionResolver, ResolvedAction};
