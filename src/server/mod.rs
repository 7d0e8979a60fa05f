//! TCP server: one listening endpoint shared by producers and viewers

pub mod config;
pub mod listener;

pub use config::ServerConfig;
pub use listener::FanoutServer;
