pub mod config;
pub mod error;
pub mod http;
pub mod transport;
pub mod crpt;
pub mod analytics;
