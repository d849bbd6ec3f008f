pub mod database;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod results;
pub mod row_helpers;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use jobs::JobRepo;
pub use ledger::LedgerRepo;
pub use results::ResultRepo;
