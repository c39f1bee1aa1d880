pub mod authz;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod server;
pub mod service;

pub use error::CredtrackError;
