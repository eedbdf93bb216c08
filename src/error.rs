use std::io;

use thiserror::Error;

/// Errors returned while reading a password.
#[derive(Debug, Error)]
pub enum Error {
    /// The handle does not support terminal attribute queries.
    #[error("input handle is not a terminal")]
    NotATerminal(#[source] io::Error),

    /// Reading, writing or changing terminal attributes failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::NotATerminal(source) => {
                io::Error::new(io::ErrorKind::Other, Error::NotATerminal(source))
            }
            Error::Io(source) => source,
        }
    }
}
