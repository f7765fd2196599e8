pub mod client;
pub mod config;
pub mod error;
pub mod formatter;
pub mod models;
pub mod notifier;
pub mod org;
pub mod parser;
pub mod poller;
pub mod store;
