pub mod errors;
pub mod generate;
pub mod ids;
pub mod job;
pub mod ledger;
pub mod outline;
pub mod provider;
pub mod request;
pub mod schema;
pub mod stream;
pub mod transcript;
