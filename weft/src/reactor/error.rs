use super::registration::{Direction, Interest, Token};

use std::io;
use std::os::fd::RawFd;

/// Errors reported by the reactor to the future that uses a resource.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// The descriptor is negative, closed, or of a kind epoll does not
    /// support (such as a regular file).
    #[error("fd {fd} cannot be registered with the reactor")]
    InvalidResource {
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    #[error("fd {fd} is already registered with the reactor")]
    AlreadyRegistered { fd: RawFd },

    #[error("fd {fd} is registered for {registered}, cannot register it for {requested}")]
    ConflictingInterest {
        fd: RawFd,
        registered: Interest,
        requested: Interest,
    },

    #[error("registration {token} has no {direction} interest")]
    InterestNotRegistered { token: Token, direction: Direction },

    #[error("unknown registration {0}")]
    UnknownToken(Token),

    #[error("reactor I/O error")]
    Io(#[from] io::Error),

    #[error("the reactor has shut down")]
    Shutdown,
}

impl From<ResourceError> for io::Error {
    fn from(err: ResourceError) -> io::Error {
        match err {
            ResourceError::Io(err) => err,
            ResourceError::InvalidResource { .. } | ResourceError::InterestNotRegistered { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            ResourceError::AlreadyRegistered { .. } | ResourceError::ConflictingInterest { .. } => {
                io::Error::new(io::ErrorKind::AlreadyExists, err)
            }
            ResourceError::UnknownToken(_) => io::Error::new(io::ErrorKind::NotFound, err),
            ResourceError::Shutdown => io::Error::other(err),
        }
    }
}
