//! Subcommand handlers.

pub mod config_cmd;
pub mod device;
pub mod login;
pub mod run;
