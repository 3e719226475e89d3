// Public API for integration tests and potential library usage

pub mod config;
pub mod error;
pub mod loader;
pub mod protocol;
pub mod room;
pub mod store;
pub mod types;
pub mod ws;
