pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
pub mod query;
pub mod report;
pub mod system;
