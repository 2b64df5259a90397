pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod facerec;
pub mod import;
pub mod models;
pub mod profiles;
pub mod server;

pub use config::Opts;
