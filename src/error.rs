use std::io;

use crate::protocol::WireError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("wire format error: {0}")]
    Wire(#[from] WireError),
}

pub type Result<T> = std::result::Result<T, Error>;
