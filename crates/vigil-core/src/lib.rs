pub mod config;
pub mod definitions;
pub mod engine;
pub mod errors;
pub mod model;
pub mod runner;
pub mod storage;
pub mod wait;

pub use engine::lifecycle::RunLifecycle;
pub use errors::LedgerError;
pub use storage::store::Store;
