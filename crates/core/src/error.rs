// Error types for ovpn-connect

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config file '{0}' not found")]
    ConfigNotFound(PathBuf),

    #[error("failed to write secret file '{path}': {source}")]
    SecretWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch VPN daemon: {reason}")]
    Launch { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
