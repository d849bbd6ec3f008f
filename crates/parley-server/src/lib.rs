pub mod handlers;
pub mod orchestrator;
pub mod server;

pub use orchestrator::{EngineOrchestrator, JobOrchestrator};
pub use server::{build_router, start, ServerConfig, ServerHandle};
