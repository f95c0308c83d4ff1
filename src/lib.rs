pub mod config;
pub mod errors;
pub mod executor;
pub mod notify;
pub mod server;
pub mod store;
pub mod webhook;

pub use config::Config;
pub use store::CheckpointStore;
