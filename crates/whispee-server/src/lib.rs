pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod legacy;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod sessions;
pub mod shutdown;
pub mod socket;

pub use config::ServerConfig;
pub use server::{start, ServerHandle};
