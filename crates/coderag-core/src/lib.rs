//! Configuration loading, secret resolution and component bootstrap.

pub mod bootstrap;
pub mod config;
pub mod vault;

pub use bootstrap::{AppBuilder, Pipeline, resolve_config_path};
pub use config::{Config, ConfigError};
