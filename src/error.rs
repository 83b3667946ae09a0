use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Every condition that stops a run. `main` prints these to stderr and exits 1.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to stat {}: {source}", .path.display())]
    ConfigStat { path: PathBuf, source: io::Error },

    #[error(
        "refusing to read config file '{}' with unsafe permissions.\n\
         Please set mode to 0600 or less (currently: {mode:o}).",
        .path.display()
    )]
    UnsafePermissions { path: PathBuf, mode: u32 },

    #[error("unable to read {}: {source}", .path.display())]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("no HOST set in the config file")]
    MissingHost,

    #[error("unable to determine the user to log in as; set FROM in the config file")]
    MissingUser,

    #[error("unable to read message from stdin: {0}")]
    Input(#[source] io::Error),

    #[error("unable to parse message: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error("unable to read password: {0}")]
    Password(#[source] io::Error),

    #[error("unable to request '{url}'.\n{source}")]
    Request { url: String, source: reqwest::Error },

    #[error("unable to write message: {0}")]
    Output(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
