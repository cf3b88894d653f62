pub mod catalog;
pub mod client;
pub mod config;
pub mod types;
