pub mod blocking;
pub mod models;
pub mod provider;
pub mod sse;

pub mod mock;

pub use blocking::BlockingBackend;
pub use mock::{MockBackend, MockResponse};
pub use models::{ModelConfig, ModelRegistry};
pub use provider::OpenAiBackend;
