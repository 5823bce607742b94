// ── Configuration errors ──

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("No credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error(transparent)]
    Figment(Box<figment::Error>),

    #[error("Cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}
