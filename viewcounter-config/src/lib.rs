pub mod setting;
pub mod config;
pub mod dbconfig;

pub use setting::Settings;
pub use config::ServerConfig;
pub use dbconfig::{ConnectionConfig, DbConfig, PoolConfig};
