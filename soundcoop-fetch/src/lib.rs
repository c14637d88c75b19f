pub mod config;
pub mod fetcher;
pub mod store;
