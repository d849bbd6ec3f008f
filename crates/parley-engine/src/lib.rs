pub mod concurrency;
pub mod context;
pub mod contract;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod prompts;
pub mod runner;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use context::PipelineContext;
pub use error::PipelineError;
pub use ledger::PromptTracker;
pub use runner::{EngineConfig, JobRunner};
pub use tracker::JobTracker;
