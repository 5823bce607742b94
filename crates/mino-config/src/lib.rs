// mino-config: Profile configuration, key material, and credential resolution.

pub mod config;
pub mod credentials;
pub mod error;

pub use config::{Config, Defaults, Paths, Profile, load_config, save_config};
pub use credentials::{clear_password, login_request, resolve_password, store_password};
pub use error::ConfigError;
