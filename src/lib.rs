pub mod api;
pub mod coach;
pub mod config;
pub mod engine;
pub mod error;
pub mod source;
pub mod store;
