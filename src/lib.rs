pub mod cli;
pub mod config;
pub mod coordinator;
pub mod data;
pub mod fmt;
pub mod logging;
pub mod scraper;
pub mod sites;
pub mod utils;
