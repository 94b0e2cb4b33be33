/*!
 * Error types for Rampart
 */

use rampart_core_resilience::ConfigError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RampartError>;

#[derive(Debug, Error)]
pub enum RampartError {
    /// Reading or creating a file failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Profile file is not valid TOML for the expected schema
    #[error("Failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),

    /// Profile could not be rendered as TOML
    #[error("Failed to serialize profile: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A section of the profile holds invalid values
    #[error("Invalid {section} settings: {source}")]
    Config {
        section: &'static str,
        #[source]
        source: ConfigError,
    },

    /// Subscriber could not be built or installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl RampartError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RampartError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(section: &'static str, source: ConfigError) -> Self {
        RampartError::Config { section, source }
    }
}
