//! Error taxonomy for sweeps, calibration and persistence

use std::{ io, path::PathBuf };
use crate::devices::Role;

#[derive(Debug, thiserror::Error)]
pub enum Error
{
    /// The run owner set the cancellation token
    ///
    /// Not a defect. The procedure has already returned the instruments to a safe state when this is
    /// raised.
    #[error("run cancelled")]
    Cancelled,
    /// The bus failed while talking to an instrument
    #[error("{role} I/O failed: {source}")]
    Io
    {
        role: Role,
        #[source]
        source: io::Error,
    },
    /// A numeric query was answered with something that is not a number
    #[error("{role} answered {command:?} with {reply:?}, expected a number")]
    Parse
    {
        role: Role,
        command: String,
        reply: String,
    },
    /// The selected device profile is not one of the known profiles
    #[error("unknown device profile {0:?}")]
    UnknownProfile(String),
    #[error("invalid sweep parameters: {0}")]
    InvalidParams(String),
    /// One or more instruments did not answer discovery
    #[error("instruments not connected: {0:?}")]
    NotConnected(Vec<Role>),
    #[error("{path}: {source}")]
    File
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error
{
    pub fn is_cancelled(&self) -> bool
    {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self
    {
        Self::File { path: path.into(), source: source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
