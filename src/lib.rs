pub mod record;
pub mod person;
pub mod config;
pub mod session;
pub mod enrich;
pub mod sink;
pub mod handler;
pub mod layer;

#[cfg(feature = "http")]
pub mod http;

pub mod backend;
pub mod env;
pub mod init;
pub mod noop_sink;
